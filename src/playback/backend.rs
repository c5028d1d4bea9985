use async_trait::async_trait;
use chrono::{DateTime, Local};

use crate::scheduling::OccurrenceKey;

/// A playable sound: a built-in gong file or a custom reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundResource {
    pub name: String,
    pub location: String,
}

/// Sound-rendering back-end.
///
/// `play_sound` resolves when the sound finished or failed. Calling it again
/// while a previous sound is still playing supersedes the previous one.
#[async_trait]
pub trait SoundPlayer: Send + Sync + 'static {
    async fn play_sound(&self, sound: &SoundResource, volume: f32) -> anyhow::Result<()>;

    /// Starts `sound` at `at` without waiting for the poll loop. Returns
    /// `Ok(false)` when the back-end has no such low-latency path.
    /// Pre-scheduling a key again replaces its earlier pre-schedule.
    async fn preschedule(
        &self,
        _key: OccurrenceKey,
        _sound: &SoundResource,
        _volume: f32,
        _at: DateTime<Local>,
    ) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn cancel_prescheduled(&self, _key: &OccurrenceKey) {}
}

/// Speech-rendering back-end with the same completion and superseding
/// contract as [`SoundPlayer::play_sound`].
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync + 'static {
    async fn speak(&self, text: &str, volume: f32) -> anyhow::Result<()>;
}

/// Keeps the device awake while an alarm plays.
pub trait KeepAwake: Send + Sync + 'static {
    fn acquire(&self) -> anyhow::Result<()>;
    fn release(&self);
}

pub struct NoopKeepAwake;

impl KeepAwake for NoopKeepAwake {
    fn acquire(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn release(&self) {}
}

/// Releases the keep-awake resource when dropped.
pub struct KeepAwakeGuard<'a>(&'a dyn KeepAwake);

impl<'a> KeepAwakeGuard<'a> {
    pub fn acquire(keep_awake: &'a dyn KeepAwake) -> Option<Self> {
        match keep_awake.acquire() {
            Ok(()) => Some(Self(keep_awake)),
            Err(error) => {
                log::warn!("Could not keep the device awake, playing anyway: {error}");
                None
            }
        }
    }
}

impl Drop for KeepAwakeGuard<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}
