//! Retargetable animated values.
//!
//! A [`Track`] is one animated quantity on a shared timeline. It holds an
//! origin value, the timeline position where its current sequence started,
//! and the segments of that sequence. Sampling is a pure function of the
//! timeline position, so renderers can sample at any cadence.
//!
//! Retargeting replaces the whole sequence, starting from whatever value the
//! track shows at that instant. The newest sequence always wins.

use crate::Easing;
use std::time::Duration;

/// One leg of a sequence: wait `delay`, then move to `target` over `duration`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub delay: Duration,
    pub duration: Duration,
    pub target: f64,
    pub easing: Easing,
}

impl Segment {
    /// Timed move to `target`
    pub fn to(target: f64, duration: Duration, easing: Easing) -> Self {
        Self {
            delay: Duration::ZERO,
            duration,
            target,
            easing,
        }
    }

    /// Instant jump to `target`
    pub fn snap(target: f64) -> Self {
        Self::to(target, Duration::ZERO, Easing::Linear)
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn span(&self) -> Duration {
        self.delay + self.duration
    }
}

/// An independently retargetable animated value
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    origin: f64,
    started_at: Duration,
    segments: Vec<Segment>,
}

impl Track {
    /// A track resting at `value`
    pub fn at_rest(value: f64) -> Self {
        Self {
            origin: value,
            started_at: Duration::ZERO,
            segments: Vec::new(),
        }
    }

    /// Value shown at timeline position `now`
    pub fn value_at(&self, now: Duration) -> f64 {
        let mut cursor = self.started_at;
        let mut from = self.origin;

        for segment in &self.segments {
            cursor += segment.delay;
            if now < cursor {
                return from;
            }
            if now < cursor + segment.duration {
                let elapsed = (now - cursor).as_secs_f64();
                let t = elapsed / segment.duration.as_secs_f64();
                let eased = segment.easing.apply(t);
                return from + (segment.target - from) * eased;
            }
            cursor += segment.duration;
            from = segment.target;
        }

        from
    }

    /// Value the track settles at once its sequence completes
    pub fn final_value(&self) -> f64 {
        self.segments.last().map_or(self.origin, |s| s.target)
    }

    /// Timeline position at which the current sequence completes
    pub fn ends_at(&self) -> Duration {
        self.started_at + self.segments.iter().map(Segment::span).sum::<Duration>()
    }

    /// Timeline position at which segment `index` finishes, if it exists
    pub fn segment_end(&self, index: usize) -> Option<Duration> {
        if index >= self.segments.len() {
            return None;
        }
        Some(
            self.started_at
                + self.segments[..=index]
                    .iter()
                    .map(Segment::span)
                    .sum::<Duration>(),
        )
    }

    pub fn is_settled(&self, now: Duration) -> bool {
        now >= self.ends_at()
    }

    /// Replace the sequence, starting from the value shown at `now`
    pub fn retarget(&mut self, now: Duration, segments: Vec<Segment>) {
        self.origin = self.value_at(now);
        self.started_at = now;
        self.segments = segments;
    }

    /// Drop any sequence and rest at `value`
    pub fn snap(&mut self, value: f64) {
        self.origin = value;
        self.segments.clear();
    }
}
