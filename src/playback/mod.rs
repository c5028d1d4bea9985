mod announcement;
mod backend;
mod command;
mod sequencer;

pub use announcement::{Language, time_announcement};
pub use backend::{
    KeepAwake, KeepAwakeGuard, NoopKeepAwake, SoundPlayer, SoundResource, SpeechSynthesizer,
};
pub use command::{CommandSoundPlayer, CommandSpeech};
pub use sequencer::{
    DEFAULT_SPEECH_TIMEOUT, PlaybackMode, PlaybackOptions, PlaybackReport, PlaybackSequencer,
    PlaybackState, PlaybackStep, StepOutcome, volume_level,
};
