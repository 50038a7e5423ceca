//! Level-up flash consumption.
//!
//! The animator exposes the flash as a counter. Consumers react to any
//! change of the counter, never to a particular value.

use crate::{AnimationTimings, Easing, Segment, Track};
use std::time::Duration;

/// Detects changes of the flash counter
#[derive(Clone, Copy, Debug)]
pub struct FlashWatcher {
    last_seen: u64,
}

impl FlashWatcher {
    pub fn new(initial: u64) -> Self {
        Self { last_seen: initial }
    }

    /// True when `value` differs from the last observed value
    pub fn observe(&mut self, value: u64) -> bool {
        let changed = value != self.last_seen;
        self.last_seen = value;
        changed
    }
}

/// Overlay opacity of the progress-bar flash
///
/// Each observed edge restarts the pulse: 0 → 0.8 → 0.4 → 0, in three
/// equal legs over the flash duration.
#[derive(Clone, Debug)]
pub struct FlashPulse {
    watcher: FlashWatcher,
    opacity: Track,
    duration: Duration,
}

impl FlashPulse {
    pub fn new(initial_counter: u64, timings: &AnimationTimings) -> Self {
        Self {
            watcher: FlashWatcher::new(initial_counter),
            opacity: Track::at_rest(0.0),
            duration: AnimationTimings::ms(timings.flash_duration),
        }
    }

    /// Feed the current counter; returns the overlay opacity at `now`
    pub fn update(&mut self, now: Duration, counter: u64) -> f64 {
        if self.watcher.observe(counter) {
            let leg = self.duration / 3;
            self.opacity.snap(0.0);
            self.opacity.retarget(
                now,
                vec![
                    Segment::to(0.8, leg, Easing::OutCubic),
                    Segment::to(0.4, leg, Easing::InOutCubic),
                    Segment::to(0.0, leg, Easing::InCubic),
                ],
            );
        }
        self.opacity.value_at(now)
    }

    pub fn is_flashing(&self, now: Duration) -> bool {
        !self.opacity.is_settled(now)
    }
}
