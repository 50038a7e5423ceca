//! Health-data provider contract.
//!
//! The platform health API is consumed through [`HealthProvider`]. Concrete
//! implementations live in [`crate::sources`]; the adapter in
//! [`crate::adapter`] is the only caller.

use crate::{PermissionScope, ProviderError, ReadRecordsResponse, RecordType, TimeRangeFilter};
use async_trait::async_trait;
use std::sync::Arc;

/// Platform health-data provider
///
/// Mirrors the platform contract: initialize once, request scopes, then
/// query records by time range. Implementations report failures as
/// [`ProviderError`]; the adapter decides what the user sees.
#[async_trait]
pub trait HealthProvider: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Initialize the provider client; `false` means unavailable
    async fn initialize(&self) -> Result<bool, ProviderError>;

    /// Request scopes, returning the subset that was granted
    async fn request_permission(
        &self,
        scopes: &[PermissionScope],
    ) -> Result<Vec<PermissionScope>, ProviderError>;

    /// Read records of `record_type` inside `filter`
    async fn read_records(
        &self,
        record_type: RecordType,
        filter: &TimeRangeFilter,
    ) -> Result<ReadRecordsResponse, ProviderError>;
}

#[async_trait]
impl<P: HealthProvider + ?Sized> HealthProvider for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn initialize(&self) -> Result<bool, ProviderError> {
        (**self).initialize().await
    }

    async fn request_permission(
        &self,
        scopes: &[PermissionScope],
    ) -> Result<Vec<PermissionScope>, ProviderError> {
        (**self).request_permission(scopes).await
    }

    async fn read_records(
        &self,
        record_type: RecordType,
        filter: &TimeRangeFilter,
    ) -> Result<ReadRecordsResponse, ProviderError> {
        (**self).read_records(record_type, filter).await
    }
}

/// Host platform family
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    Android,
    Ios,
    Desktop,
}

impl Platform {
    /// Platform this binary was built for
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "ios") {
            Platform::Ios
        } else {
            Platform::Desktop
        }
    }

    /// Only Android hosts the platform health API
    pub fn supports_health_connect(&self) -> bool {
        matches!(self, Platform::Android)
    }
}
