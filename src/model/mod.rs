mod alarm;
mod configuration;
mod time;

pub use alarm::{
    AlarmEvent, AlarmEventId, AlarmSet, AlarmSetId, Gong, MAX_MESSAGE_CHARS, MAX_NAME_CHARS,
    MAX_VOLUME,
};
pub use configuration::Configuration;
pub use time::{AlarmTime, WeekdaySet};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid time of day {0:?}, expected HH:MM")]
    InvalidTime(String),

    #[error("Invalid weekday number {0}, expected 1 (Monday) to 7 (Sunday)")]
    InvalidWeekday(u8),

    #[error("Alarm-set must be active on at least one weekday")]
    NoWeekdays,

    #[error("Alarm-set name must be 1 to {max} characters, got {len}")]
    NameLength { len: usize, max: usize },

    #[error("Message must be at most {max} characters, got {len}")]
    MessageLength { len: usize, max: usize },

    #[error("Volume must be between 0 and 100, got {0}")]
    Volume(u8),
}
