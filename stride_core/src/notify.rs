//! Transient notices shown after a sync.

use crate::{ProviderError, StepCount};
use serde::Serialize;
use std::fmt;

/// Severity of a notice, picks the toast style
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Success,
    Info,
    Error,
}

/// Outcome of a user refresh as the user sees it
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncNotice {
    /// New steps arrived
    Synced { added: StepCount },
    /// Sync worked, nothing new
    UpToDate,
    /// Sync did not work; distinct from a zero reading
    Failed { reason: String },
}

impl SyncNotice {
    /// Notice for a successful sync from `previous` to `current`
    ///
    /// A lower count than before (corrective re-read) counts as up to date.
    pub fn for_sync(previous: StepCount, current: StepCount) -> Self {
        match current.saturating_sub(previous) {
            0 => SyncNotice::UpToDate,
            added => SyncNotice::Synced { added },
        }
    }

    pub fn failed(error: &ProviderError) -> Self {
        SyncNotice::Failed {
            reason: error.to_string(),
        }
    }

    pub fn kind(&self) -> NoticeKind {
        match self {
            SyncNotice::Synced { .. } => NoticeKind::Success,
            SyncNotice::UpToDate => NoticeKind::Info,
            SyncNotice::Failed { .. } => NoticeKind::Error,
        }
    }

    pub fn message(&self) -> String {
        match self {
            SyncNotice::Synced { added: 1 } => "Synced: +1 step".to_string(),
            SyncNotice::Synced { added } => format!("Synced: +{} steps", added),
            SyncNotice::UpToDate => "Steps are up to date".to_string(),
            SyncNotice::Failed { reason } => format!("Could not sync steps: {}", reason),
        }
    }
}

impl fmt::Display for SyncNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}
