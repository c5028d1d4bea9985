use std::{path::PathBuf, time::Duration};

use chrono::TimeDelta;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use serde::Deserialize;

use crate::playback::{Language, PlaybackOptions};

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerMode {
    Polling,
    Callback,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SchedulerSettings {
    pub mode: SchedulerMode,
    pub poll_interval_secs: u64,
    pub horizon_hours: i64,
    pub refresh_interval_secs: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PlaybackSettings {
    pub speech_timeout_secs: u64,
    pub language: Language,
    pub sound_dir: PathBuf,
    pub sound_command: Vec<String>,
    pub speech_command: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StorageSettings {
    pub path: PathBuf,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    pub scheduler: SchedulerSettings,
    pub playback: PlaybackSettings,
    pub storage: StorageSettings,
}

impl AppSettings {
    /// Defaults, then `appsettings.*`, then `appsettings.local.*`, then
    /// `APP__SECTION__KEY` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Self::defaults()?
            .add_source(File::with_name("appsettings").required(false))
            .add_source(File::with_name("appsettings.local").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(" ")
                    .with_list_parse_key("playback.sound_command")
                    .with_list_parse_key("playback.speech_command")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("scheduler.mode", "polling")?
            .set_default("scheduler.poll_interval_secs", 10)?
            .set_default("scheduler.horizon_hours", 24)?
            .set_default("scheduler.refresh_interval_secs", 3600)?
            .set_default("playback.speech_timeout_secs", 5)?
            .set_default("playback.language", "en")?
            .set_default("playback.sound_dir", "sounds")?
            .set_default("playback.sound_command", vec!["paplay"])?
            .set_default("playback.speech_command", vec!["espeak-ng"])?
            .set_default("storage.path", "alarms.json")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.poll_interval_secs.max(1))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.refresh_interval_secs.max(1))
    }

    pub fn horizon(&self) -> TimeDelta {
        TimeDelta::hours(self.scheduler.horizon_hours.max(1))
    }

    pub fn playback_options(&self) -> PlaybackOptions {
        PlaybackOptions {
            speech_timeout: Duration::from_secs(self.playback.speech_timeout_secs),
            language: self.playback.language,
            sound_dir: self.playback.sound_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;

    fn from_toml(toml: &str) -> AppSettings {
        AppSettings::defaults()
            .unwrap()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn every_setting_has_a_default() {
        let settings = from_toml("");

        assert_eq!(settings.scheduler.mode, SchedulerMode::Polling);
        assert_eq!(settings.poll_interval(), Duration::from_secs(10));
        assert_eq!(settings.horizon(), TimeDelta::hours(24));
        assert_eq!(settings.refresh_interval(), Duration::from_secs(3600));
        assert_eq!(settings.playback_options().speech_timeout, Duration::from_secs(5));
        assert_eq!(settings.playback.language, Language::En);
        assert_eq!(settings.playback.sound_command, vec!["paplay"]);
        assert_eq!(settings.storage.path, PathBuf::from("alarms.json"));
    }

    #[test]
    fn file_values_override_defaults() {
        let settings = from_toml(
            r#"
            [scheduler]
            mode = "callback"
            poll_interval_secs = 5

            [playback]
            language = "de"
            speech_command = ["espeak-ng", "-v", "de", "{input}"]
            "#,
        );

        assert_eq!(settings.scheduler.mode, SchedulerMode::Callback);
        assert_eq!(settings.poll_interval(), Duration::from_secs(5));
        assert_eq!(settings.playback.language, Language::De);
        assert_eq!(settings.playback.speech_command.len(), 4);
        assert_eq!(settings.scheduler.horizon_hours, 24);
    }
}
