// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule grammar: the closed set of time-definition forms.
//!
//! "Next run at or after T" rounds T up to the nearest grid point of the
//! selected domain. The `every_n_minutes` grid is the epoch-minute
//! multiples of `n` and is timezone-independent; the daily/weekly forms are
//! computed in the offset the fleet was configured with at startup.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, FixedOffset, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("interval must be at least one minute")]
    ZeroInterval,

    #[error("minute out of range: {0}")]
    MinuteOutOfRange(u32),

    #[error("weekday out of range: {0} (0=Mon..6=Sun)")]
    WeekdayOutOfRange(u8),

    #[error("invalid time of day (expected HH:MM): {0:?}")]
    InvalidTime(String),
}

/// A time-definition's schedule descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    EveryNMinutes { n: u32 },
    Hourly { minute: u32 },
    Daily { time: String },
    Weekdays { time: String },
    Weekly { weekday: u8, time: String },
}

impl Schedule {
    /// Check the descriptor's fields. Definitions whose stored grammar
    /// fails validation are treated as disabled.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        match self {
            Schedule::EveryNMinutes { n } => {
                if *n < 1 {
                    return Err(ScheduleError::ZeroInterval);
                }
            }
            Schedule::Hourly { minute } => {
                if *minute > 59 {
                    return Err(ScheduleError::MinuteOutOfRange(*minute));
                }
            }
            Schedule::Daily { time } | Schedule::Weekdays { time } => {
                parse_hhmm(time)?;
            }
            Schedule::Weekly { weekday, time } => {
                if *weekday > 6 {
                    return Err(ScheduleError::WeekdayOutOfRange(*weekday));
                }
                parse_hhmm(time)?;
            }
        }
        Ok(())
    }

    /// Next grid point at or after `at`, computed in `tz` for the
    /// day-of-week forms.
    pub fn next_fire(
        &self,
        at: DateTime<Utc>,
        tz: FixedOffset,
    ) -> Result<DateTime<Utc>, ScheduleError> {
        match self {
            Schedule::EveryNMinutes { n } => {
                if *n < 1 {
                    return Err(ScheduleError::ZeroInterval);
                }
                let step = i64::from(*n) * 60;
                let secs = at.timestamp();
                let floor = secs.div_euclid(step) * step;
                let grid = if floor < secs { floor + step } else { floor };
                Ok(DateTime::from_timestamp(grid, 0).unwrap_or(at))
            }
            Schedule::Hourly { minute } => {
                if *minute > 59 {
                    return Err(ScheduleError::MinuteOutOfRange(*minute));
                }
                let local = at.with_timezone(&tz);
                let hour_start = local
                    .with_minute(0)
                    .and_then(|d| d.with_second(0))
                    .and_then(|d| d.with_nanosecond(0))
                    .unwrap_or(local);
                let mut candidate = hour_start + ChronoDuration::minutes(i64::from(*minute));
                if candidate < local {
                    candidate += ChronoDuration::hours(1);
                }
                Ok(candidate.with_timezone(&Utc))
            }
            Schedule::Daily { time } => next_day_fire(at, tz, time, |_| true),
            Schedule::Weekdays { time } => {
                next_day_fire(at, tz, time, |d| d.weekday().num_days_from_monday() < 5)
            }
            Schedule::Weekly { weekday, time } => {
                if *weekday > 6 {
                    return Err(ScheduleError::WeekdayOutOfRange(*weekday));
                }
                let want = u32::from(*weekday);
                next_day_fire(at, tz, time, move |d| d.weekday().num_days_from_monday() == want)
            }
        }
    }
}

// Data-carrying variants, so the kind label gets a hand-written Display
// (text_enum! is reserved for enums whose text form round-trips).
impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Schedule::EveryNMinutes { .. } => "every_n_minutes",
            Schedule::Hourly { .. } => "hourly",
            Schedule::Daily { .. } => "daily",
            Schedule::Weekdays { .. } => "weekdays",
            Schedule::Weekly { .. } => "weekly",
        })
    }
}

/// Walk forward day by day (at most a week and a day) until the domain
/// predicate accepts a date whose hh:mm grid point is at or after `at`.
fn next_day_fire(
    at: DateTime<Utc>,
    tz: FixedOffset,
    time: &str,
    in_domain: impl Fn(&chrono::NaiveDate) -> bool,
) -> Result<DateTime<Utc>, ScheduleError> {
    let (hour, minute) = parse_hhmm(time)?;
    let local = at.with_timezone(&tz);
    let mut day = local.date_naive();
    for _ in 0..=8 {
        if in_domain(&day) {
            let candidate = day
                .and_hms_opt(hour, minute, 0)
                .and_then(|naive| tz.from_local_datetime(&naive).single());
            if let Some(candidate) = candidate {
                if candidate >= local {
                    return Ok(candidate.with_timezone(&Utc));
                }
            }
        }
        day += ChronoDuration::days(1);
    }
    // Unreachable with a valid domain; surface as an invalid descriptor.
    Err(ScheduleError::InvalidTime(time.to_string()))
}

fn parse_hhmm(s: &str) -> Result<(u32, u32), ScheduleError> {
    let invalid = || ScheduleError::InvalidTime(s.to_string());
    let (h, m) = s.split_once(':').ok_or_else(invalid)?;
    if h.len() != 2 || m.len() != 2 {
        return Err(invalid());
    }
    let hour: u32 = h.parse().map_err(|_| invalid())?;
    let minute: u32 = m.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
