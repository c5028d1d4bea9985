use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{
    AlarmEvent, AlarmEventId, AlarmSet, AlarmSetId, AlarmTime, Gong, MAX_NAME_CHARS, ModelError,
    WeekdaySet,
};

const COPY_SUFFIX: &str = " (copy)";

/// Full list of alarm-sets as owned by the persistence layer.
///
/// Mutations keep every set's events sorted by time of day. New identifiers
/// are derived from the current epoch milliseconds and always exceed every
/// identifier already present, so two creations in the same millisecond
/// still get distinct ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    sets: Vec<AlarmSet>,
}

impl Configuration {
    pub fn new(sets: Vec<AlarmSet>) -> Self {
        Self { sets }
    }

    /// Configuration written on first start.
    pub fn demo() -> Self {
        let mut configuration = Self::default();
        let set_id = configuration.allocate_id();
        let event_id = configuration.allocate_id().max(set_id + 1);
        let mut set = AlarmSet::new(AlarmSetId(set_id), "Demo");
        set.weekdays = WeekdaySet::WORKDAYS;
        set.alarm_events.push(AlarmEvent {
            id: AlarmEventId(event_id),
            time: AlarmTime::from_hm(7, 30).expect("07:30 is always in bounds."),
            gong: Gong::Gong,
            time_playback: true,
            message: "Time to put your shoes on.".to_owned(),
        });
        configuration.sets.push(set);
        configuration
    }

    pub fn sets(&self) -> &[AlarmSet] {
        &self.sets
    }

    pub fn into_sets(self) -> Vec<AlarmSet> {
        self.sets
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn alarm_set(&self, id: AlarmSetId) -> Option<&AlarmSet> {
        self.sets.iter().find(|set| set.id == id)
    }

    pub fn find_event(
        &self,
        set_id: AlarmSetId,
        event_id: AlarmEventId,
    ) -> Option<(&AlarmSet, &AlarmEvent)> {
        let set = self.alarm_set(set_id)?;
        set.event(event_id).map(|event| (set, event))
    }

    pub fn event_ids(&self) -> impl Iterator<Item = AlarmEventId> + '_ {
        self.sets
            .iter()
            .flat_map(|set| set.alarm_events.iter().map(|event| event.id))
    }

    pub fn create_alarm_set(&mut self, name: &str) -> Result<AlarmSetId, ModelError> {
        let name: String = name.trim().chars().take(MAX_NAME_CHARS).collect();
        if name.is_empty() {
            return Err(ModelError::NameLength {
                len: 0,
                max: MAX_NAME_CHARS,
            });
        }

        let id = AlarmSetId(self.allocate_id());
        self.sets.push(AlarmSet::new(id, name));
        Ok(id)
    }

    pub fn delete_alarm_set(&mut self, id: AlarmSetId) -> bool {
        let before = self.sets.len();
        self.sets.retain(|set| set.id != id);
        before != self.sets.len()
    }

    /// Copies a set under a fresh id. Its events get fresh ids too, so the
    /// copy can be scheduled independently of the original.
    pub fn duplicate_alarm_set(&mut self, id: AlarmSetId) -> Option<AlarmSetId> {
        let mut copy = self.alarm_set(id)?.clone();
        let mut next_id = self.allocate_id();

        copy.id = AlarmSetId(next_id);
        copy.name = format!("{}{COPY_SUFFIX}", copy.name)
            .chars()
            .take(MAX_NAME_CHARS)
            .collect();
        for event in &mut copy.alarm_events {
            next_id += 1;
            event.id = AlarmEventId(next_id);
        }

        let copy_id = copy.id;
        self.sets.push(copy);
        Some(copy_id)
    }

    pub fn set_enabled(&mut self, id: AlarmSetId, enabled: bool) -> bool {
        match self.alarm_set_mut(id) {
            Some(set) => {
                set.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Replaces the stored set with the same id. Returns `Ok(false)` when no
    /// such set exists.
    pub fn update_alarm_set(&mut self, mut updated: AlarmSet) -> Result<bool, ModelError> {
        updated.validate()?;
        updated.sort_events();
        match self.alarm_set_mut(updated.id) {
            Some(set) => {
                *set = updated;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn create_alarm_event(
        &mut self,
        set_id: AlarmSetId,
        time: AlarmTime,
    ) -> Option<AlarmEventId> {
        let id = AlarmEventId(self.allocate_id());
        let set = self.alarm_set_mut(set_id)?;
        set.alarm_events.push(AlarmEvent::new(id, time));
        set.sort_events();
        Some(id)
    }

    pub fn delete_alarm_event(&mut self, set_id: AlarmSetId, event_id: AlarmEventId) -> bool {
        let Some(set) = self.alarm_set_mut(set_id) else {
            return false;
        };
        let before = set.alarm_events.len();
        set.alarm_events.retain(|event| event.id != event_id);
        before != set.alarm_events.len()
    }

    pub fn duplicate_alarm_event(
        &mut self,
        set_id: AlarmSetId,
        event_id: AlarmEventId,
    ) -> Option<AlarmEventId> {
        let id = AlarmEventId(self.allocate_id());
        let set = self.alarm_set_mut(set_id)?;
        let mut copy = set.event(event_id)?.clone();
        copy.id = id;
        set.alarm_events.push(copy);
        set.sort_events();
        Some(id)
    }

    pub fn update_alarm_event(
        &mut self,
        set_id: AlarmSetId,
        updated: AlarmEvent,
    ) -> Result<bool, ModelError> {
        updated.validate()?;
        let Some(set) = self.alarm_set_mut(set_id) else {
            return Ok(false);
        };
        let Some(event) = set.alarm_events.iter_mut().find(|e| e.id == updated.id) else {
            return Ok(false);
        };
        *event = updated;
        set.sort_events();
        Ok(true)
    }

    fn alarm_set_mut(&mut self, id: AlarmSetId) -> Option<&mut AlarmSet> {
        self.sets.iter_mut().find(|set| set.id == id)
    }

    fn max_id(&self) -> Option<i64> {
        self.sets
            .iter()
            .flat_map(|set| {
                std::iter::once(set.id.0).chain(set.alarm_events.iter().map(|event| event.id.0))
            })
            .max()
    }

    fn allocate_id(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        match self.max_id() {
            Some(max) => now.max(max + 1),
            None => now,
        }
    }
}
