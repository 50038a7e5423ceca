//! Calendar-day helpers.
//!
//! A day is the local-time window `[00:00:00.000, 23:59:59.999]`, resolved
//! to UTC instants for provider queries.

use crate::TimeRangeFilter;
use chrono::{
    DateTime, Days, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone,
    Utc,
};

/// Time zone used to cut calendar days
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DayZone {
    /// The host's local time zone
    Local,
    /// A fixed UTC offset (deterministic, used by tests and replays)
    Fixed(FixedOffset),
}

impl DayZone {
    /// UTC, as a fixed zone
    pub fn utc() -> Self {
        DayZone::Fixed(Utc.fix())
    }

    /// Calendar date of `instant` in this zone
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            DayZone::Local => instant.with_timezone(&Local).date_naive(),
            DayZone::Fixed(offset) => instant.with_timezone(offset).date_naive(),
        }
    }

    /// Today's date in this zone
    pub fn today(&self) -> NaiveDate {
        self.date_of(Utc::now())
    }

    /// Query window covering `date`
    pub fn window(&self, date: NaiveDate) -> DayWindow {
        let first = date.and_time(NaiveTime::MIN);
        let last = date.and_time(end_of_day());
        DayWindow {
            date,
            start: self.resolve(first),
            end: self.resolve(last),
        }
    }

    fn resolve(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        match self {
            DayZone::Local => resolve_in(&Local, naive),
            DayZone::Fixed(offset) => resolve_in(offset, naive),
        }
    }
}

/// Earliest valid instant for a local time; a DST gap shifts forward an hour
fn resolve_in<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(naive + chrono::Duration::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN)
}

/// A calendar day's query window
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DayWindow {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn filter(&self) -> TimeRangeFilter {
        TimeRangeFilter::between(self.start, self.end)
    }
}

pub fn previous_day(date: NaiveDate) -> NaiveDate {
    date.checked_sub_days(Days::new(1)).unwrap_or(date)
}

pub fn next_day(date: NaiveDate) -> NaiveDate {
    date.checked_add_days(Days::new(1)).unwrap_or(date)
}

pub fn is_today(date: NaiveDate, today: NaiveDate) -> bool {
    date == today
}

/// Human-readable day, e.g. "Wednesday 8 May"
pub fn format_day(date: NaiveDate) -> String {
    date.format("%A %-d %B").to_string()
}

/// Text shown under the counter for the last successful sync
pub fn last_updated_text(last_updated: Option<DateTime<Utc>>, zone: DayZone) -> String {
    match last_updated {
        None => "Never updated".to_string(),
        Some(at) => {
            let time = match zone {
                DayZone::Local => at.with_timezone(&Local).format("%H:%M:%S").to_string(),
                DayZone::Fixed(offset) => at.with_timezone(&offset).format("%H:%M:%S").to_string(),
            };
            format!("Updated at {}", time)
        }
    }
}
