pub mod appsettings;
pub mod clock;
pub mod model;
pub mod playback;
pub mod recurrence;
pub mod scheduling;
pub mod service;
pub mod storage;

#[cfg(test)]
mod test_utils;
