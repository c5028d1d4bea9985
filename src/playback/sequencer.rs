use std::{path::PathBuf, sync::Arc, time::Duration};

use chrono::{DateTime, Local, Timelike};
use tokio::time;

use crate::{
    clock::Clock,
    model::{AlarmEvent, AlarmEventId, AlarmSet, Gong, MAX_VOLUME},
    scheduling::OccurrenceKey,
};

use super::{
    announcement::{Language, time_announcement},
    backend::{KeepAwake, KeepAwakeGuard, SoundPlayer, SoundResource, SpeechSynthesizer},
};

pub const DEFAULT_SPEECH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct PlaybackOptions {
    pub speech_timeout: Duration,
    pub language: Language,
    pub sound_dir: PathBuf,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            speech_timeout: DEFAULT_SPEECH_TIMEOUT,
            language: Language::default(),
            sound_dir: PathBuf::from("sounds"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Played on request from the editor. The gong always plays here.
    Preview,
    /// Played because an occurrence is due. `gong_prestarted` is set when a
    /// pre-scheduled gong already started on its own.
    Alarm { gong_prestarted: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    GongPlaying,
    Announcing,
    MessageSpeaking,
    Complete,
}

impl PlaybackState {
    fn successor(self) -> Self {
        match self {
            PlaybackState::Idle => PlaybackState::GongPlaying,
            PlaybackState::GongPlaying => PlaybackState::Announcing,
            PlaybackState::Announcing => PlaybackState::MessageSpeaking,
            PlaybackState::MessageSpeaking | PlaybackState::Complete => PlaybackState::Complete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStep {
    Gong,
    TimeAnnouncement,
    Message,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    Failed(String),
    TimedOut,
}

/// Steps that actually ran, in order. Skipped steps are not listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackReport {
    pub event_id: AlarmEventId,
    pub steps: Vec<(PlaybackStep, StepOutcome)>,
}

impl PlaybackReport {
    fn new(event_id: AlarmEventId) -> Self {
        Self {
            event_id,
            steps: Vec::new(),
        }
    }

    pub fn executed(&self) -> usize {
        self.steps.len()
    }

    pub fn outcome(&self, step: PlaybackStep) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|(executed, _)| *executed == step)
            .map(|(_, outcome)| outcome)
    }
}

/// Runs gong, time announcement and message for one firing, in that order.
///
/// A failing or hanging step never stops the sequence: errors count as
/// completion, and both speech steps are cut off after the speech timeout.
pub struct PlaybackSequencer {
    sound: Arc<dyn SoundPlayer>,
    speech: Arc<dyn SpeechSynthesizer>,
    keep_awake: Arc<dyn KeepAwake>,
    clock: Arc<dyn Clock>,
    options: PlaybackOptions,
}

struct Firing<'a> {
    event: &'a AlarmEvent,
    volume: f32,
    mode: PlaybackMode,
}

impl PlaybackSequencer {
    pub fn new(
        sound: Arc<dyn SoundPlayer>,
        speech: Arc<dyn SpeechSynthesizer>,
        keep_awake: Arc<dyn KeepAwake>,
        clock: Arc<dyn Clock>,
        options: PlaybackOptions,
    ) -> Self {
        Self {
            sound,
            speech,
            keep_awake,
            clock,
            options,
        }
    }

    pub async fn play(&self, set: &AlarmSet, event: &AlarmEvent, mode: PlaybackMode) -> PlaybackReport {
        let _keep_awake = KeepAwakeGuard::acquire(self.keep_awake.as_ref());
        let firing = Firing {
            event,
            volume: volume_level(set.audio_volume),
            mode,
        };
        let mut report = PlaybackReport::new(event.id);
        let mut state = PlaybackState::Idle;

        log::info!(
            "[PLAYBACK] Starting alarm-event {} of set {:?} ({mode:?})",
            event.id,
            set.name
        );

        while state != PlaybackState::Complete {
            let next = self.advance(state, &firing, &mut report).await;
            log::debug!("[PLAYBACK] {state:?} -> {next:?}. AlarmEventId {}", event.id);
            state = next;
        }

        log::info!(
            "[PLAYBACK] Alarm-event {} complete after {} step(s)",
            event.id,
            report.executed()
        );
        report
    }

    async fn advance(
        &self,
        state: PlaybackState,
        firing: &Firing<'_>,
        report: &mut PlaybackReport,
    ) -> PlaybackState {
        match state {
            PlaybackState::Idle => self.first_runnable(PlaybackState::GongPlaying, firing),
            PlaybackState::GongPlaying => {
                if let Some(sound) = self.gong_to_play(firing) {
                    let outcome = self.play_gong(&sound, firing.volume).await;
                    report.steps.push((PlaybackStep::Gong, outcome));
                }
                self.first_runnable(PlaybackState::Announcing, firing)
            }
            PlaybackState::Announcing => {
                let text = self.announcement(self.clock.now());
                let outcome = self.speak_bounded(&text, firing.volume).await;
                report.steps.push((PlaybackStep::TimeAnnouncement, outcome));
                self.first_runnable(PlaybackState::MessageSpeaking, firing)
            }
            PlaybackState::MessageSpeaking => {
                let outcome = self.speak_bounded(&firing.event.message, firing.volume).await;
                report.steps.push((PlaybackStep::Message, outcome));
                PlaybackState::Complete
            }
            PlaybackState::Complete => PlaybackState::Complete,
        }
    }

    /// First state, starting at `state`, whose step has something to play.
    fn first_runnable(&self, mut state: PlaybackState, firing: &Firing<'_>) -> PlaybackState {
        loop {
            let runnable = match state {
                PlaybackState::GongPlaying => self.gong_to_play(firing).is_some(),
                PlaybackState::Announcing => firing.event.time_playback,
                PlaybackState::MessageSpeaking => firing.event.has_message(),
                PlaybackState::Idle | PlaybackState::Complete => true,
            };
            if runnable {
                return state;
            }
            state = state.successor();
        }
    }

    fn gong_to_play(&self, firing: &Firing<'_>) -> Option<SoundResource> {
        if let PlaybackMode::Alarm {
            gong_prestarted: true,
        } = firing.mode
        {
            return None;
        }
        self.resolve_gong(&firing.event.gong)
    }

    async fn play_gong(&self, sound: &SoundResource, volume: f32) -> StepOutcome {
        match self.sound.play_sound(sound, volume).await {
            Ok(()) => StepOutcome::Completed,
            Err(error) => {
                log::warn!("Gong {:?} failed, continuing: {error}", sound.name);
                StepOutcome::Failed(error.to_string())
            }
        }
    }

    async fn speak_bounded(&self, text: &str, volume: f32) -> StepOutcome {
        match time::timeout(self.options.speech_timeout, self.speech.speak(text, volume)).await {
            Ok(Ok(())) => StepOutcome::Completed,
            Ok(Err(error)) => {
                log::warn!("Speech failed, continuing: {error}");
                StepOutcome::Failed(error.to_string())
            }
            Err(_) => {
                log::warn!(
                    "Speech did not finish within {:?}, continuing",
                    self.options.speech_timeout
                );
                StepOutcome::TimedOut
            }
        }
    }

    fn announcement(&self, now: DateTime<Local>) -> String {
        time_announcement(self.options.language, now.hour(), now.minute())
    }

    /// Maps a gong selector to a playable resource. `Gong::None` has none.
    pub fn resolve_gong(&self, gong: &Gong) -> Option<SoundResource> {
        match gong {
            Gong::None => None,
            Gong::Custom(reference) => Some(SoundResource {
                name: "custom".to_owned(),
                location: reference.clone(),
            }),
            builtin => {
                let name = builtin.builtin_name()?;
                let path = self.options.sound_dir.join(format!("{name}.mp3"));
                Some(SoundResource {
                    name: name.to_owned(),
                    location: path.to_string_lossy().into_owned(),
                })
            }
        }
    }

    /// Hands the gong of a due occurrence to the sound back-end ahead of
    /// time. Returns whether the back-end took it.
    pub async fn preschedule_gong(
        &self,
        key: OccurrenceKey,
        set: &AlarmSet,
        event: &AlarmEvent,
        at: DateTime<Local>,
    ) -> bool {
        let Some(sound) = self.resolve_gong(&event.gong) else {
            return false;
        };
        match self
            .sound
            .preschedule(key, &sound, volume_level(set.audio_volume), at)
            .await
        {
            Ok(accepted) => accepted,
            Err(error) => {
                log::warn!("Could not pre-schedule gong for occurrence {key}: {error}");
                false
            }
        }
    }

    pub async fn cancel_prescheduled_gong(&self, key: &OccurrenceKey) {
        self.sound.cancel_prescheduled(key).await;
    }
}

/// Playback level in `[0, 1]` for a 0–100 volume setting.
pub fn volume_level(audio_volume: u8) -> f32 {
    (f32::from(audio_volume) / f32::from(MAX_VOLUME)).clamp(0.0, 1.0)
}
