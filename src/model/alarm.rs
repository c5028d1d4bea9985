use std::fmt;

use serde::{Deserialize, Serialize};

use super::{AlarmTime, ModelError, WeekdaySet};

pub const MAX_NAME_CHARS: usize = 30;
pub const MAX_MESSAGE_CHARS: usize = 300;
pub const MAX_VOLUME: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlarmEventId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlarmSetId(pub i64);

impl fmt::Display for AlarmEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for AlarmSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Sound played at the start of an alarm-event.
///
/// Stored as a plain string: the built-in names, `"none"`, or any other
/// string, which is kept verbatim as a reference to a custom sound.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Gong {
    #[default]
    None,
    BikeBell,
    DoorBell,
    Kettle,
    Gong,
    Custom(String),
}

impl Gong {
    pub fn builtin_name(&self) -> Option<&'static str> {
        match self {
            Gong::BikeBell => Some("bikebell"),
            Gong::DoorBell => Some("doorbell"),
            Gong::Kettle => Some("kettle"),
            Gong::Gong => Some("gong"),
            Gong::None | Gong::Custom(_) => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Gong::None)
    }
}

impl From<String> for Gong {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" | "none" => Gong::None,
            "bikebell" => Gong::BikeBell,
            "doorbell" => Gong::DoorBell,
            "kettle" => Gong::Kettle,
            "gong" => Gong::Gong,
            _ => Gong::Custom(value),
        }
    }
}

impl From<Gong> for String {
    fn from(value: Gong) -> Self {
        match value {
            Gong::None => "none".to_owned(),
            Gong::Custom(reference) => reference,
            builtin => builtin.builtin_name().unwrap_or_default().to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmEvent {
    pub id: AlarmEventId,
    pub time: AlarmTime,
    #[serde(default)]
    pub gong: Gong,
    #[serde(default)]
    pub time_playback: bool,
    #[serde(default)]
    pub message: String,
}

impl AlarmEvent {
    pub fn new(id: AlarmEventId, time: AlarmTime) -> Self {
        Self {
            id,
            time,
            gong: Gong::None,
            time_playback: true,
            message: String::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let len = self.message.chars().count();
        if len > MAX_MESSAGE_CHARS {
            return Err(ModelError::MessageLength {
                len,
                max: MAX_MESSAGE_CHARS,
            });
        }
        Ok(())
    }

    pub fn has_message(&self) -> bool {
        !self.message.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmSet {
    pub id: AlarmSetId,
    pub name: String,
    pub enabled: bool,
    pub weekdays: WeekdaySet,
    pub audio_volume: u8,
    #[serde(default)]
    pub alarm_events: Vec<AlarmEvent>,
}

impl AlarmSet {
    pub fn new(id: AlarmSetId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            enabled: true,
            weekdays: WeekdaySet::ALL,
            audio_volume: 80,
            alarm_events: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let len = self.name.chars().count();
        if len == 0 || len > MAX_NAME_CHARS {
            return Err(ModelError::NameLength {
                len,
                max: MAX_NAME_CHARS,
            });
        }
        if self.weekdays.is_empty() {
            return Err(ModelError::NoWeekdays);
        }
        if self.audio_volume > MAX_VOLUME {
            return Err(ModelError::Volume(self.audio_volume));
        }
        self.alarm_events.iter().try_for_each(AlarmEvent::validate)
    }

    pub fn event(&self, id: AlarmEventId) -> Option<&AlarmEvent> {
        self.alarm_events.iter().find(|event| event.id == id)
    }

    /// Keeps events in display order, earliest time of day first.
    pub fn sort_events(&mut self) {
        self.alarm_events.sort_by_key(|event| event.time);
    }
}
