//! Easing curves for timed interpolations.
//!
//! Every curve maps `t` in [0, 1] to an eased fraction with `f(0) = 0` and
//! `f(1) = 1`. Inputs outside [0, 1] are clamped.

use serde::{Deserialize, Serialize};

/// Easing curve
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    Linear,
    InCubic,
    OutCubic,
    InOutCubic,
}

impl Easing {
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match *self {
            Easing::Linear => t,
            Easing::InCubic => t * t * t,
            Easing::OutCubic => 1.0 - (1.0 - t).powi(3),
            Easing::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
        }
    }
}
