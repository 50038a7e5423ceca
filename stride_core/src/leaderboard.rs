//! Mock leaderboard.
//!
//! There is no backend: standings come from a fixed seed of ten walkers,
//! one of which is the current user. Calls can be given a simulated network
//! latency.

use crate::level::level_for;
use crate::StepCount;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Id of the current user in the seed data
pub const CURRENT_USER_ID: &str = "4";

/// One walker on the board
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub id: String,
    pub name: String,
    pub steps: StepCount,
}

/// An entry with its position
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Standing {
    /// 1-based
    pub rank: usize,
    pub level: u64,
    pub is_current_user: bool,
    #[serde(flatten)]
    pub entry: LeaderboardEntry,
}

/// Seed data, built once
static MOCK_ENTRIES: Lazy<Vec<LeaderboardEntry>> = Lazy::new(|| {
    [
        ("1", "Sophie", 12453),
        ("2", "Thomas", 11289),
        ("3", "Julie", 10876),
        (CURRENT_USER_ID, "You", 8567),
        ("5", "Maxime", 7921),
        ("6", "Léa", 6543),
        ("7", "Antoine", 5432),
        ("8", "Emma", 4983),
        ("9", "Lucas", 3254),
        ("10", "Chloé", 2198),
    ]
    .into_iter()
    .map(|(id, name, steps)| LeaderboardEntry {
        id: id.to_string(),
        name: name.to_string(),
        steps,
    })
    .collect()
});

/// Leaderboard over the mock data
pub struct Leaderboard {
    entries: Mutex<Vec<LeaderboardEntry>>,
    latency: Duration,
}

impl Default for Leaderboard {
    fn default() -> Self {
        Self::mock()
    }
}

impl Leaderboard {
    /// A fresh copy of the seed data
    pub fn mock() -> Self {
        Self {
            entries: Mutex::new(MOCK_ENTRIES.clone()),
            latency: Duration::ZERO,
        }
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn entries(&self) -> MutexGuard<'_, Vec<LeaderboardEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn wait(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Standings by steps, highest first
    ///
    /// Ties keep seed order.
    pub async fn standings(&self) -> Vec<Standing> {
        self.wait().await;
        let mut entries = self.entries().clone();
        entries.sort_by(|a, b| b.steps.cmp(&a.steps));
        entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| Standing {
                rank: i + 1,
                level: level_for(entry.steps),
                is_current_user: entry.id == CURRENT_USER_ID,
                entry,
            })
            .collect()
    }

    pub async fn current_user(&self) -> Option<LeaderboardEntry> {
        self.wait().await;
        self.entries()
            .iter()
            .find(|entry| entry.id == CURRENT_USER_ID)
            .cloned()
    }

    /// Replace the current user's step count
    pub async fn update_current_user_steps(&self, steps: StepCount) {
        self.wait().await;
        if let Some(entry) = self
            .entries()
            .iter_mut()
            .find(|entry| entry.id == CURRENT_USER_ID)
        {
            tracing::debug!("Leaderboard steps {} -> {}", entry.steps, steps);
            entry.steps = steps;
        }
    }
}
