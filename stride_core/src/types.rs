//! Core domain types for Stride.
//!
//! This module defines:
//! - Step counts and per-day aggregates
//! - The health provider's query and record shapes

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of steps attributed to one calendar day
pub type StepCount = u64;

// ============================================================================
// Health Data Query Contract
// ============================================================================

/// Access requested for a record type
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    Read,
}

/// Record types understood by the provider
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RecordType {
    Steps,
}

/// A single permission scope, e.g. `{ accessType: "read", recordType: "Steps" }`
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionScope {
    pub access_type: AccessType,
    pub record_type: RecordType,
}

impl PermissionScope {
    pub const READ_STEPS: PermissionScope = PermissionScope {
        access_type: AccessType::Read,
        record_type: RecordType::Steps,
    };
}

/// Time-range operator (only `between` is used)
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Between,
}

/// Time-range filter for a record query
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeRangeFilter {
    pub operator: FilterOperator,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl TimeRangeFilter {
    pub fn between(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            operator: FilterOperator::Between,
            start_time,
            end_time,
        }
    }

    /// Whether a record spanning `[start, end)` overlaps this range
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start <= self.end_time && end > self.start_time
    }
}

/// Record metadata
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    #[serde(default)]
    pub data_origin: String,
}

/// One step record as returned by the provider
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    #[serde(default)]
    pub count: StepCount,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub metadata: RecordMetadata,
}

/// Response of a `readRecords` query
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ReadRecordsResponse {
    #[serde(default)]
    pub records: Vec<StepRecord>,
}

// ============================================================================
// Aggregates
// ============================================================================

/// Origin reported for records without a data origin
pub const UNKNOWN_ORIGIN: &str = "unknown";

/// Steps for one calendar day, summed across every source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailySteps {
    pub date: NaiveDate,
    pub total: StepCount,
    /// Informational per-origin breakdown; never used to pick the total
    pub by_source: BTreeMap<String, StepCount>,
}

impl DailySteps {
    /// A day with no recorded steps
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total: 0,
            by_source: BTreeMap::new(),
        }
    }

    /// Sum records into a daily total
    pub fn from_records(date: NaiveDate, records: &[StepRecord]) -> Self {
        let mut by_source: BTreeMap<String, StepCount> = BTreeMap::new();
        let mut total: StepCount = 0;

        for record in records {
            let origin = if record.metadata.data_origin.is_empty() {
                UNKNOWN_ORIGIN
            } else {
                record.metadata.data_origin.as_str()
            };
            let entry = by_source.entry(origin.to_string()).or_default();
            *entry = entry.saturating_add(record.count);
            total = total.saturating_add(record.count);
        }

        Self {
            date,
            total,
            by_source,
        }
    }

    /// Source contributing the most steps, if any
    pub fn dominant_source(&self) -> Option<(&str, StepCount)> {
        self.by_source
            .iter()
            .filter(|(_, count)| **count > 0)
            .max_by_key(|(_, count)| **count)
            .map(|(source, count)| (source.as_str(), *count))
    }
}

/// Steps for a selected day and the day before it
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaySnapshot {
    pub selected: DailySteps,
    pub previous_day: DailySteps,
}

impl DaySnapshot {
    pub fn change_vs_previous_day(&self) -> DayChange {
        DayChange::between(self.selected.total, self.previous_day.total)
    }
}

/// Change of a day's total relative to the day before
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayChange {
    /// Whole percent of the previous day's total, unsigned
    pub percent: u64,
    pub is_increase: bool,
}

impl DayChange {
    /// A previous day with no steps counts as no change, upwards
    pub fn between(steps: StepCount, previous: StepCount) -> Self {
        if previous == 0 {
            return Self {
                percent: 0,
                is_increase: true,
            };
        }
        let change = steps as f64 - previous as f64;
        // Half-way values round towards positive infinity
        let percent = ((change / previous as f64) * 100.0 + 0.5).floor().abs();
        Self {
            percent: percent as u64,
            is_increase: steps >= previous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(count: u64, origin: &str) -> StepRecord {
        StepRecord {
            count,
            start_time: Utc.with_ymd_and_hms(2024, 5, 8, 9, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2024, 5, 8, 10, 0, 0).unwrap(),
            metadata: RecordMetadata {
                data_origin: origin.into(),
            },
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 8).unwrap()
    }

    #[test]
    fn test_sums_across_sources() {
        let records = vec![
            record(1200, "com.google.android.apps.fitness"),
            record(300, "com.sec.android.app.shealth"),
            record(800, "com.google.android.apps.fitness"),
        ];
        let daily = DailySteps::from_records(date(), &records);

        assert_eq!(daily.total, 2300);
        assert_eq!(daily.by_source["com.google.android.apps.fitness"], 2000);
        assert_eq!(daily.by_source["com.sec.android.app.shealth"], 300);
        assert_eq!(
            daily.dominant_source(),
            Some(("com.google.android.apps.fitness", 2000))
        );
    }

    #[test]
    fn test_empty_records() {
        let daily = DailySteps::from_records(date(), &[]);
        assert_eq!(daily, DailySteps::empty(date()));
        assert_eq!(daily.dominant_source(), None);
    }

    #[test]
    fn test_missing_origin_grouped_as_unknown() {
        let daily = DailySteps::from_records(date(), &[record(42, "")]);
        assert_eq!(daily.by_source[UNKNOWN_ORIGIN], 42);
    }

    #[test]
    fn test_change_increase() {
        let change = DayChange::between(8754, 7432);
        assert_eq!(change, DayChange { percent: 18, is_increase: true });
        assert_eq!(DayChange::between(7432, 7432), DayChange { percent: 0, is_increase: true });
    }

    #[test]
    fn test_change_decrease() {
        let change = DayChange::between(7432, 8754);
        assert_eq!(change, DayChange { percent: 15, is_increase: false });
        // -2.5% rounds to -2
        assert_eq!(DayChange::between(975, 1000), DayChange { percent: 2, is_increase: false });
        assert_eq!(DayChange::between(0, 500), DayChange { percent: 100, is_increase: false });
    }

    #[test]
    fn test_change_without_previous_day() {
        assert_eq!(DayChange::between(8754, 0), DayChange { percent: 0, is_increase: true });
        assert_eq!(DayChange::between(0, 0), DayChange { percent: 0, is_increase: true });
    }

    #[test]
    fn test_record_wire_shape() {
        let json = r#"{
            "records": [
                {
                    "count": 512,
                    "startTime": "2024-05-08T07:00:00Z",
                    "endTime": "2024-05-08T07:30:00Z",
                    "metadata": { "dataOrigin": "com.example.watch" }
                },
                {
                    "startTime": "2024-05-08T08:00:00Z",
                    "endTime": "2024-05-08T08:30:00Z"
                }
            ]
        }"#;
        let response: ReadRecordsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.records.len(), 2);
        assert_eq!(response.records[0].count, 512);
        assert_eq!(response.records[0].metadata.data_origin, "com.example.watch");
        assert_eq!(response.records[1].count, 0);
    }

    #[test]
    fn test_permission_scope_wire_shape() {
        let json = serde_json::to_string(&PermissionScope::READ_STEPS).unwrap();
        assert_eq!(json, r#"{"accessType":"read","recordType":"Steps"}"#);
    }

    #[test]
    fn test_filter_overlap() {
        let filter = TimeRangeFilter::between(
            Utc.with_ymd_and_hms(2024, 5, 8, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 8, 23, 59, 59).unwrap(),
        );
        // Ends exactly at the window start: belongs to the previous day
        assert!(!filter.overlaps(
            Utc.with_ymd_and_hms(2024, 5, 7, 23, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 8, 0, 0, 0).unwrap(),
        ));
        // Straddles midnight into the window
        assert!(filter.overlaps(
            Utc.with_ymd_and_hms(2024, 5, 7, 23, 30, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 8, 0, 30, 0).unwrap(),
        ));
    }
}
