use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Local, TimeDelta, TimeZone, Timelike};
use tokio::{sync::Mutex, task::JoinHandle};

use crate::{
    clock::Clock,
    model::{AlarmEvent, AlarmEventId, AlarmSet, AlarmSetId, Configuration},
    playback::{PlaybackMode, PlaybackReport, PlaybackSequencer},
    recurrence::next_occurrence,
};

use super::{
    common::{Occurrence, OccurrenceKey},
    ledger::TriggerLedger,
    wakeup::WakeupService,
};

pub const DEFAULT_HORIZON: TimeDelta = TimeDelta::hours(24);

/// How registered occurrences are turned into firings.
pub enum SchedulingStrategy {
    /// One exact wake-up per occurrence. The host reports firings through
    /// [`OccurrenceScheduler::on_fire`].
    Callback(Arc<dyn WakeupService>),
    /// The host calls [`OccurrenceScheduler::poll_tick`] periodically.
    Polling,
}

impl SchedulingStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            SchedulingStrategy::Callback(_) => "callback",
            SchedulingStrategy::Polling => "polling",
        }
    }
}

struct ScheduleState {
    configuration: Configuration,
    registrations: HashMap<OccurrenceKey, Occurrence>,
    prescheduled_gongs: HashSet<OccurrenceKey>,
    ledger: TriggerLedger,
}

/// Single owner of the schedule.
///
/// Keeps the next occurrence of every event of every enabled set registered
/// while it lies within the horizon. All mutations go through one lock, so a
/// key is never registered twice. None of the operations fail: a failed
/// registration only means that occurrence will not fire.
pub struct OccurrenceScheduler {
    state: Mutex<ScheduleState>,
    strategy: SchedulingStrategy,
    sequencer: Arc<PlaybackSequencer>,
    clock: Arc<dyn Clock>,
    horizon: TimeDelta,
}

struct DuePlayback {
    key: OccurrenceKey,
    set: AlarmSet,
    event: AlarmEvent,
    fired_at: DateTime<Local>,
    gong_prestarted: bool,
}

impl OccurrenceScheduler {
    pub fn new(
        configuration: Configuration,
        strategy: SchedulingStrategy,
        sequencer: Arc<PlaybackSequencer>,
        clock: Arc<dyn Clock>,
        horizon: TimeDelta,
    ) -> Self {
        Self {
            state: Mutex::new(ScheduleState {
                configuration,
                registrations: HashMap::new(),
                prescheduled_gongs: HashSet::new(),
                ledger: TriggerLedger::default(),
            }),
            strategy,
            sequencer,
            clock,
            horizon,
        }
    }

    pub fn strategy(&self) -> &SchedulingStrategy {
        &self.strategy
    }

    pub async fn configuration(&self) -> Configuration {
        self.state.lock().await.configuration.clone()
    }

    /// Outstanding registrations, earliest first.
    pub async fn registrations(&self) -> Vec<Occurrence> {
        let state = self.state.lock().await;
        let mut registrations: Vec<Occurrence> = state.registrations.values().cloned().collect();
        sort_occurrences(&mut registrations);
        registrations
    }

    /// Registers the next occurrence of every event of the held configuration.
    /// Occurrences that are already registered for the same instant are left
    /// untouched.
    pub async fn schedule_all(&self) {
        let mut state = self.state.lock().await;
        self.schedule_locked(&mut state).await;
    }

    /// Removes every registration of the held configuration. Calling it with
    /// nothing registered is harmless.
    pub async fn cancel_all(&self) {
        let mut state = self.state.lock().await;
        self.cancel_locked(&mut state).await;
    }

    pub async fn cancel_one(&self, set_id: AlarmSetId, event_id: AlarmEventId) {
        let key = OccurrenceKey::new(set_id, event_id);
        let mut state = self.state.lock().await;
        state.registrations.remove(&key);
        self.unregister(&mut state, key).await;
        log::info!("[SCHEDULE] Cancelled occurrence {key}");
    }

    /// Registers the next occurrence of one event, counted from the current
    /// instant.
    pub async fn reschedule_one(&self, set_id: AlarmSetId, event_id: AlarmEventId) {
        let reference = self.clock.now();
        self.reschedule_from(OccurrenceKey::new(set_id, event_id), reference)
            .await;
    }

    /// Swaps in a new configuration and re-derives the whole schedule.
    ///
    /// Ledger entries of events that still exist are kept, so an edit made
    /// inside the firing minute does not fire the event a second time.
    pub async fn on_configuration_changed(&self, configuration: Configuration) {
        let mut state = self.state.lock().await;
        self.cancel_locked(&mut state).await;

        state.configuration = configuration;
        let existing: HashSet<AlarmEventId> = state.configuration.event_ids().collect();
        state.ledger.retain_events(&existing);

        self.schedule_locked(&mut state).await;
    }

    /// Re-derives the schedule against the current instant so occurrences
    /// that moved into the horizon get registered.
    pub async fn refresh(&self) {
        let mut state = self.state.lock().await;
        let pruned = state.ledger.prune(self.clock.now());
        if pruned > 0 {
            log::debug!("[SCHEDULE] Pruned {pruned} ledger entries");
        }
        self.schedule_locked(&mut state).await;
    }

    /// Next occurrence of every enabled event within `within` from now,
    /// ordered by instant and then by event id.
    pub async fn list_upcoming(&self, within: TimeDelta) -> Vec<Occurrence> {
        let now = self.clock.now();
        let state = self.state.lock().await;
        let mut upcoming: Vec<Occurrence> = candidates(&state.configuration, &now)
            .filter(|(occurrence, _, _)| occurrence.fire_at - now <= within)
            .map(|(occurrence, _, _)| occurrence)
            .collect();
        sort_occurrences(&mut upcoming);
        upcoming
    }

    /// Handles a wake-up delivered for `key`.
    ///
    /// Stale keys (deleted set or event, disabled set) are ignored. Otherwise
    /// playback runs as its own task, which registers the next occurrence
    /// once playback is complete.
    pub async fn on_fire(self: &Arc<Self>, key: OccurrenceKey) -> Option<JoinHandle<PlaybackReport>> {
        let now = self.clock.now();
        let due = {
            let mut state = self.state.lock().await;
            let registration = state.registrations.remove(&key);
            let gong_prestarted = state.prescheduled_gongs.remove(&key);

            let Some((set, event)) = state.configuration.find_event(key.set_id, key.event_id)
            else {
                log::warn!("[FIRE] Occurrence {key} no longer exists, ignoring");
                return None;
            };
            if !set.enabled {
                log::info!("[FIRE] Set {:?} is disabled, ignoring occurrence {key}", set.name);
                return None;
            }

            let fired_at = registration.map_or(now, |registration| registration.fire_at);
            let minute = start_of_minute(fired_at);
            if state.ledger.has_fired_at(event.id, &minute) {
                log::info!("[FIRE] Occurrence {key} at {minute} already fired, ignoring");
                return None;
            }

            let due = DuePlayback {
                key,
                set: set.clone(),
                event: event.clone(),
                fired_at,
                gong_prestarted,
            };
            state.ledger.mark_fired(due.event.id, minute);
            due
        };

        log::info!("[FIRE] Occurrence {key} is due");
        Some(self.spawn_playback(due))
    }

    /// One polling-model tick.
    ///
    /// Fires every registration of an enabled set whose instant falls in the
    /// current minute and has not fired yet. The ledger is marked before
    /// playback starts.
    pub async fn poll_tick(self: &Arc<Self>) -> Vec<JoinHandle<PlaybackReport>> {
        let now = self.clock.now();

        let due: Vec<DuePlayback> = {
            let mut state = self.state.lock().await;
            state.ledger.prune(now);

            let ScheduleState {
                configuration,
                registrations,
                prescheduled_gongs,
                ledger,
            } = &mut *state;

            let mut registered: Vec<Occurrence> = registrations.values().cloned().collect();
            sort_occurrences(&mut registered);

            let mut due = Vec::new();
            for occurrence in registered {
                let key = occurrence.key;
                let Some((set, event)) = configuration.find_event(key.set_id, key.event_id) else {
                    continue;
                };
                if !set.enabled {
                    continue;
                }
                let Some(minute) = due_minute(&*ledger, event.id, &occurrence.fire_at, &now) else {
                    continue;
                };

                ledger.mark_fired(event.id, minute);
                registrations.remove(&key);
                due.push(DuePlayback {
                    key,
                    set: set.clone(),
                    event: event.clone(),
                    fired_at: minute,
                    gong_prestarted: prescheduled_gongs.remove(&key),
                });
            }
            due
        };

        if !due.is_empty() {
            log::info!("[POLL] {} occurrence(s) due at {}", due.len(), now.format("%H:%M"));
        }
        due.into_iter()
            .map(|due| self.spawn_playback(due))
            .collect()
    }

    /// Plays a configured event right away, gong included. Unknown ids play
    /// nothing.
    pub async fn preview(&self, set_id: AlarmSetId, event_id: AlarmEventId) -> Option<PlaybackReport> {
        let (set, event) = {
            let state = self.state.lock().await;
            let (set, event) = state.configuration.find_event(set_id, event_id)?;
            (set.clone(), event.clone())
        };
        Some(self.sequencer.play(&set, &event, PlaybackMode::Preview).await)
    }

    fn spawn_playback(self: &Arc<Self>, due: DuePlayback) -> JoinHandle<PlaybackReport> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let report = scheduler
                .sequencer
                .play(
                    &due.set,
                    &due.event,
                    PlaybackMode::Alarm {
                        gong_prestarted: due.gong_prestarted,
                    },
                )
                .await;

            let reference = scheduler.clock.now().max(due.fired_at);
            scheduler.reschedule_from(due.key, reference).await;
            report
        })
    }

    async fn reschedule_from(&self, key: OccurrenceKey, reference: DateTime<Local>) {
        let mut state = self.state.lock().await;
        let ScheduleState {
            configuration,
            registrations,
            prescheduled_gongs,
            ..
        } = &mut *state;

        let Some((set, event)) = configuration.find_event(key.set_id, key.event_id) else {
            log::debug!("[SCHEDULE] Occurrence {key} no longer exists, not rescheduling");
            return;
        };
        if !set.enabled {
            return;
        }
        let Some(fire_at) = next_occurrence(&event.time, &set.weekdays, &reference) else {
            return;
        };
        if fire_at - self.clock.now() > self.horizon {
            log::debug!("[SCHEDULE] Next occurrence {key} at {fire_at} is beyond the horizon");
            return;
        }

        self.register(registrations, prescheduled_gongs, Occurrence::new(key, fire_at), set, event)
            .await;
    }

    async fn schedule_locked(&self, state: &mut ScheduleState) {
        let now = self.clock.now();
        let ScheduleState {
            configuration,
            registrations,
            prescheduled_gongs,
            ..
        } = state;

        let mut registered = 0;
        for (occurrence, set, event) in candidates(configuration, &now) {
            if occurrence.fire_at - now > self.horizon {
                continue;
            }
            if registrations
                .get(&occurrence.key)
                .is_some_and(|existing| existing.fire_at == occurrence.fire_at)
            {
                continue;
            }
            if self
                .register(registrations, prescheduled_gongs, occurrence, set, event)
                .await
            {
                registered += 1;
            }
        }

        log::info!(
            "[SCHEDULE] {registered} new registration(s), {} outstanding ({})",
            registrations.len(),
            self.strategy.name()
        );
    }

    async fn register(
        &self,
        registrations: &mut HashMap<OccurrenceKey, Occurrence>,
        prescheduled_gongs: &mut HashSet<OccurrenceKey>,
        occurrence: Occurrence,
        set: &AlarmSet,
        event: &AlarmEvent,
    ) -> bool {
        let key = occurrence.key;
        match &self.strategy {
            SchedulingStrategy::Callback(wakeup) => {
                if let Err(error) = wakeup.arm(key, occurrence.fire_at).await {
                    log::warn!("[SCHEDULE] Could not arm occurrence {key}, it will not fire: {error}");
                    registrations.remove(&key);
                    return false;
                }
            }
            SchedulingStrategy::Polling => {
                let accepted = self
                    .sequencer
                    .preschedule_gong(key, set, event, occurrence.fire_at)
                    .await;
                if accepted {
                    prescheduled_gongs.insert(key);
                } else if prescheduled_gongs.remove(&key) {
                    self.sequencer.cancel_prescheduled_gong(&key).await;
                }
            }
        }

        log::debug!("[SCHEDULE] Registered occurrence {key} at {}", occurrence.fire_at);
        registrations.insert(key, occurrence);
        true
    }

    async fn cancel_locked(&self, state: &mut ScheduleState) {
        let mut keys: HashSet<OccurrenceKey> = state.registrations.drain().map(|(key, _)| key).collect();
        keys.extend(state.configuration.sets().iter().flat_map(|set| {
            set.alarm_events
                .iter()
                .map(|event| OccurrenceKey::new(set.id, event.id))
        }));

        let cancelled = keys.len();
        for key in keys {
            self.unregister(state, key).await;
        }
        log::info!("[SCHEDULE] Cancelled {cancelled} occurrence key(s)");
    }

    async fn unregister(&self, state: &mut ScheduleState, key: OccurrenceKey) {
        if let SchedulingStrategy::Callback(wakeup) = &self.strategy {
            wakeup.disarm(&key).await;
        }
        if state.prescheduled_gongs.remove(&key) {
            self.sequencer.cancel_prescheduled_gong(&key).await;
        }
    }
}

/// Next occurrence of every event of every enabled set, unfiltered by the
/// horizon.
fn candidates<'a>(
    configuration: &'a Configuration,
    now: &'a DateTime<Local>,
) -> impl Iterator<Item = (Occurrence, &'a AlarmSet, &'a AlarmEvent)> + 'a {
    configuration
        .sets()
        .iter()
        .filter(|set| set.enabled)
        .flat_map(move |set| {
            set.alarm_events.iter().filter_map(move |event| {
                let fire_at = next_occurrence(&event.time, &set.weekdays, now)?;
                let key = OccurrenceKey::new(set.id, event.id);
                Some((Occurrence::new(key, fire_at), set, event))
            })
        })
}

fn sort_occurrences(occurrences: &mut [Occurrence]) {
    occurrences.sort_by_key(|occurrence| (occurrence.fire_at, occurrence.key.event_id));
}

pub(super) fn start_of_minute<Tz: TimeZone>(instant: DateTime<Tz>) -> DateTime<Tz> {
    let second = TimeDelta::seconds(i64::from(instant.second()));
    let nanosecond = TimeDelta::nanoseconds(i64::from(instant.nanosecond()));
    instant - second - nanosecond
}

/// Whether an occurrence registered for `fire_at` is due at `now`: the
/// instant has passed and `now` is still inside its minute.
pub(super) fn is_due<Tz: TimeZone>(fire_at: &DateTime<Tz>, now: &DateTime<Tz>) -> bool {
    fire_at <= now && start_of_minute(fire_at.clone()) == start_of_minute(now.clone())
}

/// Minute to record for `id` when its occurrence at `fire_at` is due at
/// `now` and that minute has not fired yet.
pub(super) fn due_minute<Tz: TimeZone>(
    ledger: &TriggerLedger<Tz>,
    id: AlarmEventId,
    fire_at: &DateTime<Tz>,
    now: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    if !is_due(fire_at, now) {
        return None;
    }
    let minute = start_of_minute(fire_at.clone());
    (!ledger.has_fired_at(id, &minute)).then_some(minute)
}
