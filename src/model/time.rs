use std::{fmt, str::FromStr};

use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use super::ModelError;

/// Time of day an alarm-event fires at, always with zero seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AlarmTime(NaiveTime);

impl AlarmTime {
    pub fn new(inner: NaiveTime) -> Self {
        let normalized_time = NaiveTime::from_hms_opt(inner.hour(), inner.minute(), 0)
            .unwrap_or(NaiveTime::MIN);
        Self(normalized_time)
    }

    pub fn from_hm(hour: u32, minute: u32) -> Result<Self, ModelError> {
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(Self)
            .ok_or_else(|| ModelError::InvalidTime(format!("{hour}:{minute:02}")))
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn minutes_since_midnight(&self) -> u32 {
        self.hour() * 60 + self.minute()
    }
}

impl FromStr for AlarmTime {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ModelError::InvalidTime(s.to_owned());
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour = parse_component(hour).ok_or_else(invalid)?;
        let minute = parse_component(minute).ok_or_else(invalid)?;

        Self::from_hm(hour, minute).map_err(|_| invalid())
    }
}

fn parse_component(part: &str) -> Option<u32> {
    if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

impl fmt::Display for AlarmTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl TryFrom<String> for AlarmTime {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AlarmTime> for String {
    fn from(value: AlarmTime) -> Self {
        value.to_string()
    }
}

/// Subset of the week, numbered 1 (Monday) to 7 (Sunday).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const EMPTY: Self = Self(0);
    pub const ALL: Self = Self(0b111_1111);
    pub const WORKDAYS: Self = Self(0b001_1111);

    pub fn from_numbers(numbers: impl IntoIterator<Item = u8>) -> Result<Self, ModelError> {
        let mut set = Self::EMPTY;
        for number in numbers {
            set.insert(weekday_from_number(number)?);
        }
        Ok(set)
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= bit(day);
    }

    pub fn remove(&mut self, day: Weekday) {
        self.0 &= !bit(day);
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & bit(day) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        WEEK.into_iter().filter(|day| self.contains(*day))
    }

    pub fn numbers(&self) -> Vec<u8> {
        self.iter()
            .map(|day| day.number_from_monday() as u8)
            .collect()
    }
}

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn bit(day: Weekday) -> u8 {
    1 << day.num_days_from_monday()
}

fn weekday_from_number(number: u8) -> Result<Weekday, ModelError> {
    match number {
        1..=7 => Ok(WEEK[usize::from(number - 1)]),
        other => Err(ModelError::InvalidWeekday(other)),
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<T: IntoIterator<Item = Weekday>>(iter: T) -> Self {
        let mut set = Self::EMPTY;
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl fmt::Debug for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl TryFrom<Vec<u8>> for WeekdaySet {
    type Error = ModelError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_numbers(value)
    }
}

impl From<WeekdaySet> for Vec<u8> {
    fn from(value: WeekdaySet) -> Self {
        value.numbers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_padded_and_unpadded_times() {
        assert_eq!("07:30".parse::<AlarmTime>().unwrap(), AlarmTime::from_hm(7, 30).unwrap());
        assert_eq!("7:05".parse::<AlarmTime>().unwrap(), AlarmTime::from_hm(7, 5).unwrap());
        assert_eq!(AlarmTime::from_hm(23, 59).unwrap().to_string(), "23:59");
    }

    #[test]
    fn rejects_malformed_times() {
        for input in ["", "24:00", "12:60", "12", "ab:cd", "+1:00", "12:00:00", "123:00"] {
            assert!(input.parse::<AlarmTime>().is_err(), "{input:?} should be rejected");
        }
    }

    #[test]
    fn normalizes_seconds_away() {
        let time = AlarmTime::new(NaiveTime::from_hms_milli_opt(6, 15, 42, 300).unwrap());
        assert_eq!(time.time(), NaiveTime::from_hms_opt(6, 15, 0).unwrap());
    }

    #[test]
    fn weekday_set_uses_monday_based_numbers() {
        let set = WeekdaySet::from_numbers([7, 1, 3, 1]).unwrap();

        assert_eq!(set.len(), 3);
        assert!(set.contains(Weekday::Mon));
        assert!(set.contains(Weekday::Wed));
        assert!(set.contains(Weekday::Sun));
        assert!(!set.contains(Weekday::Tue));
        assert_eq!(set.numbers(), vec![1, 3, 7]);
    }

    #[test]
    fn weekday_set_rejects_out_of_range_numbers() {
        assert_eq!(
            WeekdaySet::from_numbers([0]),
            Err(ModelError::InvalidWeekday(0))
        );
        assert_eq!(
            WeekdaySet::from_numbers([8]),
            Err(ModelError::InvalidWeekday(8))
        );
    }

    #[test]
    fn serializes_as_plain_values() {
        let json = serde_json::to_string(&(AlarmTime::from_hm(9, 0).unwrap(), WeekdaySet::WORKDAYS))
            .unwrap();
        assert_eq!(json, r#"["09:00",[1,2,3,4,5]]"#);
    }
}
