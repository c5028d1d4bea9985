use chrono::{DateTime, Datelike, LocalResult, NaiveDateTime, TimeDelta, TimeZone};

use crate::model::{AlarmTime, WeekdaySet};

const SCAN_DAYS: usize = 7;

/// Returns the first instant strictly after `reference` whose local time of
/// day is `time` and whose local weekday is in `weekdays`.
///
/// A reference equal to today's candidate counts as already passed, so an
/// occurrence is never offered again on its own boundary tick. Local times
/// skipped by a DST gap fire at the first valid instant after the gap;
/// repeated local times fire at their earlier instance.
pub fn next_occurrence<Tz: TimeZone>(
    time: &AlarmTime,
    weekdays: &WeekdaySet,
    reference: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    if weekdays.is_empty() {
        return None;
    }

    let timezone = reference.timezone();
    let mut date = reference.date_naive();
    let passed = match resolve_local(&timezone, date.and_time(time.time())) {
        Some(today) => today <= *reference,
        None => true,
    };
    if passed {
        date = date.succ_opt()?;
    }

    for _ in 0..SCAN_DAYS {
        if weekdays.contains(date.weekday()) {
            if let Some(candidate) = resolve_local(&timezone, date.and_time(time.time())) {
                return Some(candidate);
            }
        }
        date = date.succ_opt()?;
    }

    None
}

/// String entry point for the `"HH:MM"` form. Malformed input yields `None`.
pub fn next_occurrence_str<Tz: TimeZone>(
    time: &str,
    weekdays: &WeekdaySet,
    reference: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let time = time.parse::<AlarmTime>().ok()?;
    next_occurrence(&time, weekdays, reference)
}

fn resolve_local<Tz: TimeZone>(timezone: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    match timezone.from_local_datetime(&local) {
        LocalResult::Single(instant) => Some(instant),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => {
            let shifted = local.checked_add_signed(TimeDelta::hours(1))?;
            timezone.from_local_datetime(&shifted).earliest()
        }
    }
}

/// Remaining time until `target` for listings: `"H:MM h"` from one hour up,
/// `"N min"` below. Past targets read as `"0 min"`.
pub fn remaining_time<Tz: TimeZone>(target: &DateTime<Tz>, now: &DateTime<Tz>) -> String {
    let minutes = (target.clone() - now.clone()).num_minutes().max(0);
    if minutes >= 60 {
        format!("{}:{:02} h", minutes / 60, minutes % 60)
    } else {
        format!("{minutes} min")
    }
}
