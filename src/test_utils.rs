use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, TimeZone};

use crate::{
    clock::Clock,
    model::{AlarmEvent, AlarmEventId, AlarmSet, AlarmSetId, AlarmTime, Gong, WeekdaySet},
    playback::{
        KeepAwake, PlaybackOptions, PlaybackSequencer, SoundPlayer, SoundResource,
        SpeechSynthesizer,
    },
    scheduling::{OccurrenceKey, WakeupService},
};

/// Local instant in June 2025. The 2nd is a Monday.
pub fn local(day: u32, hour: u32, minute: u32, second: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(2025, 6, day, hour, minute, second)
        .earliest()
        .expect("valid June 2025 local time")
}

pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Local>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, delta: TimeDelta) {
        *self.now.lock().unwrap() += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap()
    }
}

pub fn alarm_time(hour: u32, minute: u32) -> AlarmTime {
    AlarmTime::from_hm(hour, minute).unwrap()
}

pub fn event(id: i64, hour: u32, minute: u32) -> AlarmEvent {
    AlarmEvent::new(AlarmEventId(id), alarm_time(hour, minute))
}

pub fn set_with(id: i64, weekdays: WeekdaySet, events: Vec<AlarmEvent>) -> AlarmSet {
    let mut set = AlarmSet::new(AlarmSetId(id), format!("Set {id}"));
    set.weekdays = weekdays;
    set.alarm_events = events;
    set
}

pub fn key(set: i64, event: i64) -> OccurrenceKey {
    OccurrenceKey::new(AlarmSetId(set), AlarmEventId(event))
}

#[derive(Debug, Clone, PartialEq)]
pub enum SoundCall {
    Play { location: String, volume: f32 },
    Preschedule { key: OccurrenceKey, at: DateTime<Local> },
    CancelPrescheduled(OccurrenceKey),
}

#[derive(Default)]
pub struct RecordingSound {
    pub calls: Mutex<Vec<SoundCall>>,
    pub fail: bool,
    pub accept_preschedule: bool,
}

impl RecordingSound {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn prescheduling() -> Self {
        Self {
            accept_preschedule: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<SoundCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn played(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, SoundCall::Play { .. }))
            .count()
    }
}

#[async_trait]
impl SoundPlayer for RecordingSound {
    async fn play_sound(&self, sound: &SoundResource, volume: f32) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(SoundCall::Play {
            location: sound.location.clone(),
            volume,
        });
        if self.fail {
            return Err(anyhow!("no audio device"));
        }
        Ok(())
    }

    async fn preschedule(
        &self,
        key: OccurrenceKey,
        _sound: &SoundResource,
        _volume: f32,
        at: DateTime<Local>,
    ) -> anyhow::Result<bool> {
        if !self.accept_preschedule {
            return Ok(false);
        }
        self.calls
            .lock()
            .unwrap()
            .push(SoundCall::Preschedule { key, at });
        Ok(true)
    }

    async fn cancel_prescheduled(&self, key: &OccurrenceKey) {
        if self.accept_preschedule {
            self.calls
                .lock()
                .unwrap()
                .push(SoundCall::CancelPrescheduled(*key));
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpeechBehaviour {
    #[default]
    Succeed,
    Fail,
    Hang,
}

#[derive(Default)]
pub struct RecordingSpeech {
    pub spoken: Mutex<Vec<String>>,
    pub behaviour: SpeechBehaviour,
}

impl RecordingSpeech {
    pub fn with(behaviour: SpeechBehaviour) -> Self {
        Self {
            behaviour,
            ..Default::default()
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingSpeech {
    async fn speak(&self, text: &str, _volume: f32) -> anyhow::Result<()> {
        self.spoken.lock().unwrap().push(text.to_owned());
        match self.behaviour {
            SpeechBehaviour::Succeed => Ok(()),
            SpeechBehaviour::Fail => Err(anyhow!("synthesizer crashed")),
            SpeechBehaviour::Hang => std::future::pending().await,
        }
    }
}

#[derive(Default)]
pub struct CountingKeepAwake {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub fail: bool,
}

impl CountingKeepAwake {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn held(&self) -> usize {
        self.acquired.load(Ordering::SeqCst) - self.released.load(Ordering::SeqCst)
    }
}

impl KeepAwake for CountingKeepAwake {
    fn acquire(&self) -> anyhow::Result<()> {
        if self.fail {
            return Err(anyhow!("wake lock denied"));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Wake-up service that only records registrations.
#[derive(Default)]
pub struct RecordingWakeup {
    pub armed: Mutex<Vec<(OccurrenceKey, DateTime<Local>)>>,
    pub disarmed: Mutex<Vec<OccurrenceKey>>,
    pub failing: Mutex<HashSet<OccurrenceKey>>,
}

impl RecordingWakeup {
    pub fn fail_for(&self, key: OccurrenceKey) {
        self.failing.lock().unwrap().insert(key);
    }

    pub fn armed(&self) -> Vec<(OccurrenceKey, DateTime<Local>)> {
        self.armed.lock().unwrap().clone()
    }

    pub fn disarmed(&self) -> Vec<OccurrenceKey> {
        self.disarmed.lock().unwrap().clone()
    }
}

#[async_trait]
impl WakeupService for RecordingWakeup {
    async fn arm(&self, key: OccurrenceKey, fire_at: DateTime<Local>) -> anyhow::Result<()> {
        if self.failing.lock().unwrap().contains(&key) {
            return Err(anyhow!("exact alarms not permitted"));
        }
        self.armed.lock().unwrap().push((key, fire_at));
        Ok(())
    }

    async fn disarm(&self, key: &OccurrenceKey) {
        self.disarmed.lock().unwrap().push(*key);
    }
}

/// Playback back-ends shared by a sequencer and the assertions of a test.
pub struct Backends {
    pub sound: Arc<RecordingSound>,
    pub speech: Arc<RecordingSpeech>,
    pub keep_awake: Arc<CountingKeepAwake>,
    pub clock: Arc<ManualClock>,
}

impl Backends {
    pub fn new(now: DateTime<Local>) -> Self {
        Self::with(RecordingSound::default(), RecordingSpeech::default(), now)
    }

    pub fn with(sound: RecordingSound, speech: RecordingSpeech, now: DateTime<Local>) -> Self {
        Self {
            sound: Arc::new(sound),
            speech: Arc::new(speech),
            keep_awake: Arc::new(CountingKeepAwake::default()),
            clock: Arc::new(ManualClock::new(now)),
        }
    }

    pub fn sequencer(&self) -> PlaybackSequencer {
        PlaybackSequencer::new(
            self.sound.clone(),
            self.speech.clone(),
            self.keep_awake.clone(),
            self.clock.clone(),
            PlaybackOptions::default(),
        )
    }
}

pub fn with_gong(mut event: AlarmEvent, gong: Gong) -> AlarmEvent {
    event.gong = gong;
    event
}
