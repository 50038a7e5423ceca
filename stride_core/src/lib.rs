#![forbid(unsafe_code)]

//! Core logic for the Stride step tracker.
//!
//! This crate provides:
//! - Level calculation from daily step counts
//! - The health provider contract and the adapter over it
//! - Step animation sequencing with the level-up flash
//! - The session controller driving fetches, notices, and day navigation
//! - A mock leaderboard

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod level;
pub mod dates;
pub mod provider;
pub mod adapter;
pub mod sources;
pub mod easing;
pub mod track;
pub mod animation;
pub mod flash;
pub mod notify;
pub mod session;
pub mod leaderboard;

// Re-export commonly used types
pub use error::{Error, ProviderError, Result};
pub use types::*;
pub use config::{AnimationTimings, Config};
pub use level::{
    calculate_level_info, has_leveled_up, levels_gained, LevelInfo, LevelTransition,
    STEPS_PER_LEVEL,
};
pub use provider::{HealthProvider, Platform};
pub use adapter::StepDataAdapter;
pub use easing::Easing;
pub use track::{Segment, Track};
pub use animation::{AnimationFrame, AnimationPhase, StepAnimator};
pub use flash::{FlashPulse, FlashWatcher};
pub use notify::{NoticeKind, SyncNotice};
pub use session::{StepSession, StepView, SyncReport, SyncTrigger};
pub use leaderboard::Leaderboard;
