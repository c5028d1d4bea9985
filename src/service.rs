use std::{sync::Arc, time::Duration};

use chrono::TimeDelta;
use tokio::{sync::mpsc, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::Clock,
    model::{AlarmEventId, AlarmSetId, Configuration},
    playback::{PlaybackReport, PlaybackSequencer},
    scheduling::{
        DEFAULT_HORIZON, Occurrence, OccurrenceKey, OccurrenceScheduler, Poller,
        SchedulingStrategy, WakeupService,
    },
    storage::{ConfigurationStore, load_configuration},
};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Where firings come from.
pub enum Wakeups {
    /// Tick the scheduler every `interval`.
    Polling { interval: Duration },
    /// Exact wake-ups; `fired` receives the key of every registration that
    /// came due.
    Callback {
        service: Arc<dyn WakeupService>,
        fired: mpsc::Receiver<OccurrenceKey>,
    },
}

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub horizon: TimeDelta,
    pub refresh_interval: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            horizon: DEFAULT_HORIZON,
            refresh_interval: Duration::from_secs(3600),
        }
    }
}

struct FireListener {
    task_handle: JoinHandle<()>,
    cancellation_token: CancellationToken,
}

impl FireListener {
    fn start(scheduler: Arc<OccurrenceScheduler>, mut fired: mpsc::Receiver<OccurrenceKey>) -> Self {
        let cancellation_token = CancellationToken::new();
        let task_cancellation_token = cancellation_token.child_token();

        let task_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancellation_token.cancelled() => break,
                    key = fired.recv() => match key {
                        Some(key) => {
                            scheduler.on_fire(key).await;
                        }
                        None => {
                            log::warn!("[FIRE] Wake-up channel closed, no more alarms will fire");
                            break;
                        }
                    },
                }
            }
        });

        Self {
            task_handle,
            cancellation_token,
        }
    }

    async fn stop(self, timeout: Duration) {
        self.cancellation_token.cancel();
        let _ = time::timeout(timeout, self.task_handle).await;
    }
}

/// The running alarm clock: stored configuration, scheduler and the loops
/// feeding it.
pub struct AlarmClock {
    store: Arc<dyn ConfigurationStore>,
    scheduler: Arc<OccurrenceScheduler>,
    horizon: TimeDelta,
    pollers: Vec<Poller>,
    fire_listener: Option<FireListener>,
}

impl AlarmClock {
    pub async fn start(
        store: Arc<dyn ConfigurationStore>,
        wakeups: Wakeups,
        sequencer: Arc<PlaybackSequencer>,
        clock: Arc<dyn Clock>,
        options: ServiceOptions,
    ) -> Self {
        let configuration = load_configuration(store.as_ref()).await;

        let (strategy, poll_interval, fired) = match wakeups {
            Wakeups::Polling { interval } => (SchedulingStrategy::Polling, Some(interval), None),
            Wakeups::Callback { service, fired } => {
                (SchedulingStrategy::Callback(service), None, Some(fired))
            }
        };
        log::info!("Starting alarm clock with {} scheduling", strategy.name());

        let scheduler = Arc::new(OccurrenceScheduler::new(
            configuration,
            strategy,
            sequencer,
            clock,
            options.horizon,
        ));
        scheduler.schedule_all().await;

        let mut pollers = Vec::new();
        let refreshed = scheduler.clone();
        pollers.push(Poller::start("refresh", options.refresh_interval, move || {
            let scheduler = refreshed.clone();
            async move { scheduler.refresh().await }
        }));
        if let Some(interval) = poll_interval {
            let polled = scheduler.clone();
            pollers.push(Poller::start("alarm", interval, move || {
                let scheduler = polled.clone();
                async move {
                    scheduler.poll_tick().await;
                }
            }));
        }
        let fire_listener = fired.map(|fired| FireListener::start(scheduler.clone(), fired));

        Self {
            store,
            scheduler,
            horizon: options.horizon,
            pollers,
            fire_listener,
        }
    }

    pub fn scheduler(&self) -> &Arc<OccurrenceScheduler> {
        &self.scheduler
    }

    pub async fn configuration(&self) -> Configuration {
        self.scheduler.configuration().await
    }

    /// Stores `configuration` and reschedules everything against it. Nothing
    /// is rescheduled when storing fails.
    pub async fn update_configuration(&self, configuration: Configuration) -> anyhow::Result<()> {
        self.store.save(configuration.sets()).await?;
        self.scheduler.on_configuration_changed(configuration).await;
        Ok(())
    }

    pub async fn upcoming(&self) -> Vec<Occurrence> {
        self.scheduler.list_upcoming(self.horizon).await
    }

    pub async fn preview(&self, set_id: AlarmSetId, event_id: AlarmEventId) -> Option<PlaybackReport> {
        self.scheduler.preview(set_id, event_id).await
    }

    /// Stops all loops and removes every outstanding registration. Playbacks
    /// already running are left to finish.
    pub async fn shutdown(self) {
        for poller in self.pollers {
            poller.stop(STOP_TIMEOUT).await;
        }
        if let Some(listener) = self.fire_listener {
            listener.stop(STOP_TIMEOUT).await;
        }
        self.scheduler.cancel_all().await;
        log::info!("Alarm clock stopped");
    }
}
