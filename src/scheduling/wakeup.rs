use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::{
    sync::{Mutex, mpsc},
    task::{self, JoinHandle},
    time,
};
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;

use super::common::{FireSender, OccurrenceKey};

const CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

/// Exact one-shot wake-up facility of the host.
///
/// `arm` registers a single wake-up for `key` at `fire_at`, replacing any
/// registration the key already had. The fire notification is delivered out
/// of band (see [`TokioWakeupService::new`] for the in-process variant).
#[async_trait]
pub trait WakeupService: Send + Sync + 'static {
    async fn arm(&self, key: OccurrenceKey, fire_at: DateTime<Local>) -> anyhow::Result<()>;

    /// Removes the registration of `key`. Unknown keys are ignored.
    async fn disarm(&self, key: &OccurrenceKey);
}

struct ScheduledTask {
    task_handle: JoinHandle<()>,
    cancellation_token: CancellationToken,
}

impl ScheduledTask {
    fn new(task_handle: JoinHandle<()>, cancellation_token: CancellationToken) -> Self {
        Self {
            task_handle,
            cancellation_token,
        }
    }

    async fn cancel(self, timeout: Duration) {
        self.cancellation_token.cancel();
        let cancel_with_timeout = time::timeout(timeout, self.task_handle);
        let _ = cancel_with_timeout.await;
    }
}

type WakeupTaskStore = Mutex<HashMap<OccurrenceKey, ScheduledTask>>;

/// Wake-up service backed by one sleeping tokio task per registration.
pub struct TokioWakeupService {
    tasks: Arc<WakeupTaskStore>,
    sender: FireSender,
    clock: Arc<dyn Clock>,
}

impl TokioWakeupService {
    /// Creates the service together with the receiving end of its fire
    /// notifications.
    pub fn new(clock: Arc<dyn Clock>) -> (Self, mpsc::Receiver<OccurrenceKey>) {
        let (channel_sender, receiver) = mpsc::channel(64);
        let service = Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            sender: FireSender::new(channel_sender),
            clock,
        };
        (service, receiver)
    }

    pub async fn armed_count(&self) -> usize {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|_, task| !task.task_handle.is_finished());
        tasks.len()
    }

    fn spawn_wakeup(&self, key: OccurrenceKey, delay: Duration) -> ScheduledTask {
        let cancellation_token = CancellationToken::new();
        let task_cancellation_token = cancellation_token.child_token();
        let sender = self.sender.clone();

        let task_handle = task::spawn(async move {
            tokio::select! {
                _ = task_cancellation_token.cancelled() => {
                    log::debug!("Wake-up for occurrence {key} was cancelled.");
                },
                _ = time::sleep(delay) => {
                    if let Err(error) = sender.notify_fired(key).await {
                        log::error!("Could not deliver wake-up for occurrence {key}: {error}");
                    }
                }
            }
        });

        ScheduledTask::new(task_handle, cancellation_token)
    }
}

#[async_trait]
impl WakeupService for TokioWakeupService {
    async fn arm(&self, key: OccurrenceKey, fire_at: DateTime<Local>) -> anyhow::Result<()> {
        let delay = (fire_at - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
        let task = self.spawn_wakeup(key, delay);

        let previous = {
            let mut tasks = self.tasks.lock().await;
            tasks.retain(|_, task| !task.task_handle.is_finished());
            tasks.insert(key, task)
        };
        if let Some(previous) = previous {
            previous.cancel(CANCEL_TIMEOUT).await;
        }

        log::debug!("[ARM] Sleeping for {delay:?}. Occurrence {key}");
        Ok(())
    }

    async fn disarm(&self, key: &OccurrenceKey) {
        let task = self.tasks.lock().await.remove(key);
        if let Some(task) = task {
            task.cancel(CANCEL_TIMEOUT).await;
        }
    }
}

impl Drop for TokioWakeupService {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.try_lock() {
            for task in tasks.values() {
                task.cancellation_token.cancel();
            }
        }
    }
}
