//! Step-to-level progression.
//!
//! Levels have a uniform width of [`STEPS_PER_LEVEL`] steps and start at 0:
//! - 0..=999 steps: level 0
//! - 1000..=1999 steps: level 1
//! - and so on, with no upper bound
//!
//! Everything here is a pure function of its inputs. Level-down is not
//! modeled: a smaller count than before simply reports no level-up.

use crate::StepCount;
use serde::{Deserialize, Serialize};

/// Width of every level, in steps
pub const STEPS_PER_LEVEL: StepCount = 1000;

/// Level and progress derived from a single step count
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelInfo {
    pub current_level: u64,
    pub progress_in_current_level: u64,
    /// Percentage of the current level completed, in [0, 100)
    pub progress_percentage: f64,
    pub steps_to_next_level: u64,
    /// Span of the current level (always [`STEPS_PER_LEVEL`])
    pub total_steps_for_current_level: u64,
}

impl LevelInfo {
    /// Progress within the level as a fraction in [0, 1)
    pub fn progress_fraction(&self) -> f64 {
        self.progress_in_current_level as f64 / self.total_steps_for_current_level as f64
    }
}

/// Level change between two successive step counts
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTransition {
    pub previous_steps: StepCount,
    pub current_steps: StepCount,
    pub has_leveled_up: bool,
    pub levels_gained: u64,
}

impl LevelTransition {
    pub fn between(previous_steps: StepCount, current_steps: StepCount) -> Self {
        Self {
            previous_steps,
            current_steps,
            has_leveled_up: has_leveled_up(previous_steps, current_steps),
            levels_gained: levels_gained(previous_steps, current_steps),
        }
    }
}

/// Level reached with `total_steps`
pub fn level_for(total_steps: StepCount) -> u64 {
    total_steps / STEPS_PER_LEVEL
}

/// Compute level information for a step total
///
/// Exact multiples of the level span wrap to the next level with zero
/// progress (1000 steps is level 1 at 0, never level 0 at 1000).
pub fn calculate_level_info(total_steps: StepCount) -> LevelInfo {
    let current_level = level_for(total_steps);
    let progress_in_current_level = total_steps % STEPS_PER_LEVEL;

    LevelInfo {
        current_level,
        progress_in_current_level,
        progress_percentage: progress_in_current_level as f64 / STEPS_PER_LEVEL as f64 * 100.0,
        steps_to_next_level: STEPS_PER_LEVEL - progress_in_current_level,
        total_steps_for_current_level: STEPS_PER_LEVEL,
    }
}

/// True when `current` sits on a strictly higher level than `previous`
pub fn has_leveled_up(previous: StepCount, current: StepCount) -> bool {
    level_for(current) > level_for(previous)
}

/// Number of levels gained from `previous` to `current`, 0 when going down
pub fn levels_gained(previous: StepCount, current: StepCount) -> u64 {
    level_for(current).saturating_sub(level_for(previous))
}
