mod common;
mod ledger;
mod poller;
mod scheduler;
mod wakeup;

pub use common::{FireSender, Occurrence, OccurrenceKey};
pub use ledger::TriggerLedger;
pub use poller::Poller;
pub use scheduler::{DEFAULT_HORIZON, OccurrenceScheduler, SchedulingStrategy};
pub use wakeup::{TokioWakeupService, WakeupService};
