use std::time::Duration;

use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

/// Background loop calling `tick` once per period until stopped.
///
/// The first tick runs immediately. Ticks missed while the host was busy or
/// suspended are delayed rather than bunched up.
pub struct Poller {
    name: &'static str,
    task_handle: JoinHandle<()>,
    cancellation_token: CancellationToken,
}

impl Poller {
    pub fn start<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancellation_token = CancellationToken::new();
        let task_cancellation_token = cancellation_token.child_token();

        let task_handle = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_cancellation_token.cancelled() => {
                        log::debug!("[POLL] {name} loop stopped");
                        break;
                    },
                    _ = interval.tick() => tick().await,
                }
            }
        });

        log::info!("[POLL] {name} loop started, period {period:?}");
        Self {
            name,
            task_handle,
            cancellation_token,
        }
    }

    pub async fn stop(self, timeout: Duration) {
        self.cancellation_token.cancel();
        if time::timeout(timeout, self.task_handle).await.is_err() {
            log::warn!("[POLL] {} loop did not stop within {timeout:?}", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    fn counting_poller(period: Duration) -> (Poller, Arc<AtomicUsize>) {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let poller = Poller::start("test", period, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        (poller, ticks)
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_immediately_and_then_every_period() {
        let (poller, ticks) = counting_poller(Duration::from_secs(10));

        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 4);

        poller.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_poller_no_longer_ticks() {
        let (poller, ticks) = counting_poller(Duration::from_secs(10));
        time::sleep(Duration::from_millis(1)).await;

        poller.stop(Duration::from_secs(1)).await;
        time::sleep(Duration::from_secs(60)).await;

        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }
}
