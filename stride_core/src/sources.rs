//! Concrete health providers and test doubles.
//!
//! - [`CsvRecordProvider`]: step records replayed from a CSV file
//! - [`ScriptedProvider`]: in-memory records with injectable failures
//! - [`InflatingProvider`]: adds synthetic steps to one day on demand

use crate::dates::DayZone;
use crate::{
    HealthProvider, PermissionScope, ProviderError, ReadRecordsResponse, RecordMetadata,
    RecordType, StepCount, StepRecord, TimeRangeFilter,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use fs2::FileExt;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Origin tag of synthetic steps added by [`InflatingProvider`]
pub const INFLATION_ORIGIN: &str = "dev.inflation";

fn records_in(records: &[StepRecord], filter: &TimeRangeFilter) -> Vec<StepRecord> {
    records
        .iter()
        .filter(|r| filter.overlaps(r.start_time, r.end_time))
        .cloned()
        .collect()
}

// ============================================================================
// CSV-backed provider
// ============================================================================

/// CSV row: `start_time,end_time,count,data_origin`
#[derive(Debug, Deserialize)]
struct CsvRow {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    count: StepCount,
    #[serde(default)]
    data_origin: String,
}

/// Provider replaying step records from a CSV file
///
/// The file is re-read on every query, so edits show up on the next sync.
pub struct CsvRecordProvider {
    path: PathBuf,
}

impl CsvRecordProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read every parseable record from a CSV file under a shared lock
pub fn read_csv_records(path: &Path) -> crate::Result<Vec<StepRecord>> {
    let file = File::open(path)?;
    file.lock_shared()?;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(&file);
    let mut records = Vec::new();

    for (line_num, row) in reader.deserialize::<CsvRow>().enumerate() {
        match row {
            Ok(row) => records.push(StepRecord {
                count: row.count,
                start_time: row.start_time,
                end_time: row.end_time,
                metadata: RecordMetadata {
                    data_origin: row.data_origin,
                },
            }),
            Err(e) => {
                // Line numbers are 1-based and skip the header
                tracing::warn!("Skipping step record at line {}: {}", line_num + 2, e);
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} step records from {:?}", records.len(), path);
    Ok(records)
}

#[async_trait]
impl HealthProvider for CsvRecordProvider {
    fn name(&self) -> &str {
        "csv"
    }

    async fn initialize(&self) -> Result<bool, ProviderError> {
        Ok(self.path.exists())
    }

    async fn request_permission(
        &self,
        scopes: &[PermissionScope],
    ) -> Result<Vec<PermissionScope>, ProviderError> {
        Ok(scopes.to_vec())
    }

    async fn read_records(
        &self,
        _record_type: RecordType,
        filter: &TimeRangeFilter,
    ) -> Result<ReadRecordsResponse, ProviderError> {
        let path = self.path.clone();
        let all = tokio::task::spawn_blocking(move || read_csv_records(&path))
            .await
            .map_err(|e| ProviderError::QueryFailure(format!("record reader panicked: {}", e)))?
            .map_err(|e| ProviderError::QueryFailure(e.to_string()))?;

        Ok(ReadRecordsResponse {
            records: records_in(&all, filter),
        })
    }
}

// ============================================================================
// Scripted provider
// ============================================================================

#[derive(Debug, Default)]
struct Script {
    records: Vec<StepRecord>,
    unavailable: bool,
    deny_permission: bool,
    failing_queries: usize,
    latency: Duration,
}

/// Number of calls made to each provider operation
#[derive(Debug, Default)]
pub struct CallCounts {
    pub initialize: AtomicUsize,
    pub request_permission: AtomicUsize,
    pub read_records: AtomicUsize,
}

/// In-memory provider whose behavior is set by the caller
///
/// Shareable: clones observe and edit the same script.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    script: Arc<Mutex<Script>>,
    calls: Arc<CallCounts>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<StepRecord>) -> Self {
        let provider = Self::new();
        provider.set_records(records);
        provider
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_records(&self, records: Vec<StepRecord>) {
        self.script().records = records;
    }

    pub fn push_record(&self, record: StepRecord) {
        self.script().records.push(record);
    }

    /// Make `initialize` report the provider as unavailable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.script().unavailable = unavailable;
    }

    /// Grant no scopes on permission requests
    pub fn set_deny_permission(&self, deny: bool) {
        self.script().deny_permission = deny;
    }

    /// Fail the next `count` record queries
    pub fn fail_next_queries(&self, count: usize) {
        self.script().failing_queries = count;
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.script().latency = latency;
    }

    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    async fn wait(&self) {
        let latency = self.script().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl HealthProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn initialize(&self) -> Result<bool, ProviderError> {
        self.calls.initialize.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        Ok(!self.script().unavailable)
    }

    async fn request_permission(
        &self,
        scopes: &[PermissionScope],
    ) -> Result<Vec<PermissionScope>, ProviderError> {
        self.calls.request_permission.fetch_add(1, Ordering::SeqCst);
        if self.script().deny_permission {
            Ok(Vec::new())
        } else {
            Ok(scopes.to_vec())
        }
    }

    async fn read_records(
        &self,
        _record_type: RecordType,
        filter: &TimeRangeFilter,
    ) -> Result<ReadRecordsResponse, ProviderError> {
        self.calls.read_records.fetch_add(1, Ordering::SeqCst);
        self.wait().await;

        let mut script = self.script();
        if script.failing_queries > 0 {
            script.failing_queries -= 1;
            return Err(ProviderError::QueryFailure("scripted failure".into()));
        }
        Ok(ReadRecordsResponse {
            records: records_in(&script.records, filter),
        })
    }
}

// ============================================================================
// Inflating decorator
// ============================================================================

/// Handle controlling an [`InflatingProvider`]
#[derive(Clone, Debug)]
pub struct InflationHandle {
    bumps: Arc<AtomicU64>,
    per_bump: StepCount,
}

impl InflationHandle {
    /// Add one bump worth of synthetic steps
    pub fn bump(&self) {
        self.bumps.fetch_add(1, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.bumps.store(0, Ordering::SeqCst);
    }

    /// Synthetic steps currently added
    pub fn extra_steps(&self) -> StepCount {
        self.bumps
            .load(Ordering::SeqCst)
            .saturating_mul(self.per_bump)
    }
}

/// Decorator adding synthetic steps to one day's queries
///
/// Stands in for a development mode that inflates today's count on each
/// refresh, without touching production code paths.
pub struct InflatingProvider<P> {
    inner: P,
    window: TimeRangeFilter,
    handle: InflationHandle,
}

impl<P: HealthProvider> InflatingProvider<P> {
    pub fn new(inner: P, day: NaiveDate, zone: DayZone, per_bump: StepCount) -> Self {
        Self {
            inner,
            window: zone.window(day).filter(),
            handle: InflationHandle {
                bumps: Arc::new(AtomicU64::new(0)),
                per_bump,
            },
        }
    }

    pub fn handle(&self) -> InflationHandle {
        self.handle.clone()
    }
}

#[async_trait]
impl<P: HealthProvider> HealthProvider for InflatingProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn initialize(&self) -> Result<bool, ProviderError> {
        self.inner.initialize().await
    }

    async fn request_permission(
        &self,
        scopes: &[PermissionScope],
    ) -> Result<Vec<PermissionScope>, ProviderError> {
        self.inner.request_permission(scopes).await
    }

    async fn read_records(
        &self,
        record_type: RecordType,
        filter: &TimeRangeFilter,
    ) -> Result<ReadRecordsResponse, ProviderError> {
        let mut response = self.inner.read_records(record_type, filter).await?;
        let extra = self.handle.extra_steps();
        if extra > 0 && *filter == self.window {
            response.records.push(StepRecord {
                count: extra,
                start_time: self.window.start_time,
                end_time: self.window.end_time,
                metadata: RecordMetadata {
                    data_origin: INFLATION_ORIGIN.into(),
                },
            });
        }
        Ok(response)
    }
}
