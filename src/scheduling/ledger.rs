use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Local, TimeDelta, TimeZone};

use crate::model::AlarmEventId;

/// Last-fired occurrence minute per alarm-event, used to keep a short poll
/// interval or a repeated wake-up from firing the same occurrence twice.
///
/// An event counts as fired only for the exact minute recorded, so the next
/// day's occurrence is never blocked, however long that calendar day is.
/// Pruning only bounds the size of the map.
#[derive(Debug)]
pub struct TriggerLedger<Tz: TimeZone = Local> {
    fired: HashMap<AlarmEventId, DateTime<Tz>>,
}

impl<Tz: TimeZone> Default for TriggerLedger<Tz> {
    fn default() -> Self {
        Self {
            fired: HashMap::new(),
        }
    }
}

impl<Tz: TimeZone> TriggerLedger<Tz> {
    pub fn retention() -> TimeDelta {
        TimeDelta::hours(24)
    }

    pub fn mark_fired(&mut self, id: AlarmEventId, minute: DateTime<Tz>) {
        self.fired.insert(id, minute);
    }

    /// Whether any firing of `id` is still on record.
    pub fn has_fired_recently(&self, id: AlarmEventId) -> bool {
        self.fired.contains_key(&id)
    }

    pub fn has_fired_at(&self, id: AlarmEventId, minute: &DateTime<Tz>) -> bool {
        self.fired.get(&id).is_some_and(|fired| fired == minute)
    }

    /// Drops entries that are a full retention window old or older.
    pub fn prune(&mut self, now: DateTime<Tz>) -> usize {
        let cutoff = now - Self::retention();
        let before = self.fired.len();
        self.fired.retain(|_, fired_at| *fired_at > cutoff);
        before - self.fired.len()
    }

    /// Keeps only entries of events that still exist.
    pub fn retain_events(&mut self, existing: &HashSet<AlarmEventId>) {
        self.fired.retain(|id, _| existing.contains(id));
    }

    pub fn len(&self) -> usize {
        self.fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono_tz::{Europe::Berlin, Tz};

    use super::*;

    fn local(d: u32, h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, d, h, m, 0).unwrap()
    }

    fn berlin(month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Tz> {
        Berlin
            .with_ymd_and_hms(2025, month, day, hour, minute, 0)
            .earliest()
            .unwrap()
    }

    #[test]
    fn marking_overwrites_previous_minute() {
        let mut ledger = TriggerLedger::default();
        let id = AlarmEventId(7);

        assert!(!ledger.has_fired_recently(id));
        ledger.mark_fired(id, local(2, 7, 30));
        ledger.mark_fired(id, local(3, 7, 30));

        assert!(ledger.has_fired_recently(id));
        assert!(ledger.has_fired_at(id, &local(3, 7, 30)));
        assert!(!ledger.has_fired_at(id, &local(2, 7, 30)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn prune_drops_only_entries_older_than_a_day() {
        let mut ledger = TriggerLedger::default();
        ledger.mark_fired(AlarmEventId(1), local(2, 7, 29));
        ledger.mark_fired(AlarmEventId(2), local(2, 7, 31));
        ledger.mark_fired(AlarmEventId(3), local(3, 7, 0));

        let pruned = ledger.prune(local(3, 7, 30));

        assert_eq!(pruned, 1);
        assert_eq!(ledger.len(), 2);
        assert!(ledger.has_fired_at(AlarmEventId(2), &local(2, 7, 31)));
        assert!(ledger.has_fired_at(AlarmEventId(3), &local(3, 7, 0)));
    }

    #[test]
    fn same_minute_next_day_is_pruned_on_its_first_tick() {
        let mut ledger = TriggerLedger::default();
        ledger.mark_fired(AlarmEventId(1), local(2, 7, 30));

        ledger.prune(local(3, 7, 30));

        assert!(ledger.is_empty());
    }

    #[test]
    fn short_day_entry_does_not_block_the_next_occurrence() {
        let mut ledger = TriggerLedger::default();
        let saturday = berlin(3, 29, 7, 30);
        let sunday = berlin(3, 30, 7, 30);
        assert_eq!(sunday.clone() - saturday.clone(), TimeDelta::hours(23));
        ledger.mark_fired(AlarmEventId(1), saturday);

        ledger.prune(sunday.clone());

        assert!(ledger.has_fired_recently(AlarmEventId(1)));
        assert!(!ledger.has_fired_at(AlarmEventId(1), &sunday));
    }

    #[test]
    fn long_day_entry_is_gone_before_the_next_occurrence() {
        let mut ledger = TriggerLedger::default();
        let saturday = berlin(10, 25, 7, 30);
        let sunday = berlin(10, 26, 7, 30);
        assert_eq!(sunday.clone() - saturday.clone(), TimeDelta::hours(25));
        ledger.mark_fired(AlarmEventId(1), saturday);

        ledger.prune(sunday);

        assert!(ledger.is_empty());
    }

    #[test]
    fn retain_events_forgets_deleted_events() {
        let mut ledger = TriggerLedger::default();
        ledger.mark_fired(AlarmEventId(1), local(2, 7, 0));
        ledger.mark_fired(AlarmEventId(2), local(2, 7, 0));

        ledger.retain_events(&HashSet::from([AlarmEventId(2)]));

        assert!(!ledger.has_fired_at(AlarmEventId(1), &local(2, 7, 0)));
        assert!(ledger.has_fired_at(AlarmEventId(2), &local(2, 7, 0)));
    }
}
