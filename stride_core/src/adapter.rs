//! Step data provider adapter.
//!
//! The boundary between the app and the health provider. It:
//! - runs the initialize/permission handshake once, retrying until it succeeds
//! - queries a calendar day's window and sums every record from every source
//! - bounds each provider call with a timeout and a cancellation token
//! - substitutes fixed placeholder counts where no provider exists
//!
//! Callers choose between the fallible [`StepDataAdapter::fetch_day`] and the
//! silent-zero [`StepDataAdapter::steps_for_day`].

use crate::config::{ProviderConfig, ProviderKind};
use crate::dates::{previous_day, DayZone};
use crate::{
    DailySteps, DaySnapshot, HealthProvider, PermissionScope, ProviderError, RecordType,
    RecordMetadata, StepCount, StepRecord,
};
use chrono::NaiveDate;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

/// Origin reported for placeholder counts
pub const PLACEHOLDER_ORIGIN: &str = "placeholder";

/// Fixed counts used where the platform has no health provider
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaceholderSteps {
    pub selected: StepCount,
    pub previous_day: StepCount,
}

impl PlaceholderSteps {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            selected: config.placeholder_today,
            previous_day: config.placeholder_yesterday,
        }
    }
}

enum Backend {
    Health(Arc<dyn HealthProvider>),
    Placeholder(PlaceholderSteps),
}

/// Adapter turning provider records into daily step totals
pub struct StepDataAdapter {
    backend: Backend,
    zone: DayZone,
    timeout: Duration,
    handshake: OnceCell<()>,
}

impl StepDataAdapter {
    /// Adapter over a health provider
    pub fn new(provider: Arc<dyn HealthProvider>, zone: DayZone, timeout: Duration) -> Self {
        Self {
            backend: Backend::Health(provider),
            zone,
            timeout,
            handshake: OnceCell::new(),
        }
    }

    /// Adapter answering with fixed counts
    pub fn placeholder(steps: PlaceholderSteps, zone: DayZone) -> Self {
        Self {
            backend: Backend::Placeholder(steps),
            zone,
            timeout: Duration::ZERO,
            handshake: OnceCell::new(),
        }
    }

    /// Build from configuration
    ///
    /// Falls back to the placeholder when configured so, or when no provider
    /// is available on this platform.
    pub fn from_config(
        config: &ProviderConfig,
        provider: Option<Arc<dyn HealthProvider>>,
        zone: DayZone,
    ) -> Self {
        match (config.kind, provider) {
            (ProviderKind::HealthConnect, Some(provider)) => {
                tracing::info!("Using health provider '{}'", provider.name());
                Self::new(provider, zone, config.fetch_timeout())
            }
            (ProviderKind::HealthConnect, None) => {
                tracing::info!("No health provider on this platform, using placeholder counts");
                Self::placeholder(PlaceholderSteps::from_config(config), zone)
            }
            (ProviderKind::Placeholder, _) => {
                Self::placeholder(PlaceholderSteps::from_config(config), zone)
            }
        }
    }

    pub fn zone(&self) -> DayZone {
        self.zone
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.backend, Backend::Placeholder(_))
    }

    /// Whether the handshake has already succeeded
    pub fn is_ready(&self) -> bool {
        self.handshake.initialized()
    }

    /// Run the initialize/permission handshake if it has not succeeded yet
    ///
    /// Success is cached for the adapter's lifetime; a failure is retried on
    /// the next call.
    pub async fn ensure_ready(&self, cancel: &CancellationToken) -> Result<(), ProviderError> {
        let provider = match &self.backend {
            Backend::Placeholder(_) => return Ok(()),
            Backend::Health(provider) => provider,
        };

        self.handshake
            .get_or_try_init(|| async {
                tracing::debug!("Initializing health provider '{}'", provider.name());
                let initialized = self.guarded(provider.initialize(), cancel).await?;
                if !initialized {
                    tracing::warn!("Health provider '{}' failed to initialize", provider.name());
                    return Err(ProviderError::ProviderUnavailable(format!(
                        "{} did not initialize",
                        provider.name()
                    )));
                }

                tracing::debug!("Requesting permission to read steps");
                let scopes = [PermissionScope::READ_STEPS];
                let granted = self
                    .guarded(provider.request_permission(&scopes), cancel)
                    .await?;
                if !granted.contains(&PermissionScope::READ_STEPS) {
                    tracing::warn!("Steps read permission not granted");
                    return Err(ProviderError::PermissionDenied);
                }

                tracing::info!("Health provider '{}' ready", provider.name());
                Ok(())
            })
            .await
            .map(|_| ())
    }

    /// Steps for `date`, or the reason they could not be read
    pub async fn fetch_day(
        &self,
        date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<DailySteps, ProviderError> {
        let provider = match &self.backend {
            Backend::Placeholder(steps) => return Ok(self.placeholder_day(*steps, date)),
            Backend::Health(provider) => provider,
        };

        self.ensure_ready(cancel).await?;

        let window = self.zone.window(date);
        let filter = window.filter();
        tracing::debug!(
            %date,
            start = %filter.start_time,
            end = %filter.end_time,
            "Reading step records"
        );

        let response = self
            .guarded(provider.read_records(RecordType::Steps, &filter), cancel)
            .await?;
        let daily = DailySteps::from_records(date, &response.records);

        tracing::debug!(
            %date,
            records = response.records.len(),
            total = daily.total,
            "Read step records"
        );
        Ok(daily)
    }

    /// Steps for `date`, 0 when they could not be read
    pub async fn steps_for_day(&self, date: NaiveDate, cancel: &CancellationToken) -> StepCount {
        match self.fetch_day(date, cancel).await {
            Ok(daily) => daily.total,
            Err(e) => {
                tracing::warn!(%date, "Step fetch failed, reporting 0: {}", e);
                0
            }
        }
    }

    /// Steps for `date` and the day before, fetched concurrently
    ///
    /// Fails if either day fails.
    pub async fn fetch_snapshot(
        &self,
        date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<DaySnapshot, ProviderError> {
        let (selected, previous) = tokio::try_join!(
            self.fetch_day(date, cancel),
            self.fetch_day(previous_day(date), cancel),
        )?;
        Ok(DaySnapshot {
            selected,
            previous_day: previous,
        })
    }

    fn placeholder_day(&self, steps: PlaceholderSteps, date: NaiveDate) -> DailySteps {
        let count = if date == self.zone.today() {
            steps.selected
        } else if date == previous_day(self.zone.today()) {
            steps.previous_day
        } else {
            0
        };

        let window = self.zone.window(date);
        let records = [StepRecord {
            count,
            start_time: window.start,
            end_time: window.end,
            metadata: RecordMetadata {
                data_origin: PLACEHOLDER_ORIGIN.into(),
            },
        }];
        DailySteps::from_records(date, &records)
    }

    /// Bound a provider call by the timeout and the cancellation token
    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T, ProviderError>>,
        cancel: &CancellationToken,
    ) -> Result<T, ProviderError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ProviderError::Cancelled),
            result = tokio::time::timeout(self.timeout, call) => match result {
                Ok(inner) => inner,
                Err(_) => {
                    tracing::warn!("Health provider call timed out after {:?}", self.timeout);
                    Err(ProviderError::Timeout(self.timeout))
                }
            },
        }
    }
}
