use std::fmt;

use chrono::{DateTime, Local};
use tokio::sync::mpsc;

use crate::model::{AlarmEventId, AlarmSetId};

/// Opaque payload carried by a wake-up registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OccurrenceKey {
    pub set_id: AlarmSetId,
    pub event_id: AlarmEventId,
}

impl OccurrenceKey {
    pub fn new(set_id: AlarmSetId, event_id: AlarmEventId) -> Self {
        Self { set_id, event_id }
    }
}

impl fmt::Display for OccurrenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.set_id, self.event_id)
    }
}

/// One concrete future firing of an alarm-event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub key: OccurrenceKey,
    pub fire_at: DateTime<Local>,
}

impl Occurrence {
    pub fn new(key: OccurrenceKey, fire_at: DateTime<Local>) -> Self {
        Self { key, fire_at }
    }
}

/// Delivers "fire" notifications from a wake-up service to whoever drives
/// the scheduler.
#[derive(Clone)]
pub struct FireSender(mpsc::Sender<OccurrenceKey>);

impl FireSender {
    pub fn new(inner: mpsc::Sender<OccurrenceKey>) -> Self {
        FireSender(inner)
    }

    pub async fn notify_fired(&self, key: OccurrenceKey) -> anyhow::Result<()> {
        self.0.send(key).await?;
        Ok(())
    }
}
