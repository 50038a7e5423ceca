//! Step animation sequencing.
//!
//! Turns a new step total into a timeline of displayed values that a
//! renderer samples at its own cadence:
//!
//! - **Counting**: the counter and the progress bar ease to the new values
//!   concurrently, each after a short settle delay.
//! - **LevelingUp**: the bar fills to 100% of the level span, the flash
//!   counter ticks, the bar empties and the level label flips, then the bar
//!   refills to the new progress. The counter runs independently.
//!
//! A jump of several levels plays a single fill/reset/refill cycle and the
//! label goes straight to the final level.
//!
//! Starting a new animation mid-flight retargets every quantity from the
//! value it shows at that instant; the newest target always wins.

use crate::level::{calculate_level_info, LevelInfo, LevelTransition, STEPS_PER_LEVEL};
use crate::{AnimationTimings, Easing, Segment, StepCount, Track};
use serde::Serialize;
use std::time::Duration;

/// Displayed values at one instant
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AnimationFrame {
    /// Counter value, rounded for display
    pub steps: StepCount,
    /// Bar fill as a fraction of the level span, in [0, 1]
    pub progress: f64,
    pub level: u64,
    /// Edge-triggered flash counter; any change means "flash now"
    pub flash: u64,
}

/// Which sequence is playing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationPhase {
    Idle,
    Counting,
    LevelingUp,
}

/// Level label that flips at a scheduled instant
#[derive(Clone, Copy, Debug)]
struct LevelLabel {
    shown: u64,
    next: u64,
    flips_at: Duration,
    /// When the flash for this flip fires
    flash_at: Option<Duration>,
}

impl LevelLabel {
    fn fixed(level: u64) -> Self {
        Self {
            shown: level,
            next: level,
            flips_at: Duration::ZERO,
            flash_at: None,
        }
    }

    fn value_at(&self, now: Duration) -> u64 {
        if now >= self.flips_at {
            self.next
        } else {
            self.shown
        }
    }

    /// The flip is still pending but its flash has already fired
    fn flashed_before_flip(&self, now: Duration) -> bool {
        now < self.flips_at && matches!(self.flash_at, Some(at) if now >= at)
    }
}

/// Flash counter with at most one scheduled increment
#[derive(Clone, Copy, Debug, Default)]
struct FlashCounter {
    fired: u64,
    pending_at: Option<Duration>,
}

impl FlashCounter {
    fn value_at(&self, now: Duration) -> u64 {
        match self.pending_at {
            Some(at) if now >= at => self.fired.wrapping_add(1),
            _ => self.fired,
        }
    }

    /// Fold a fired increment in and drop one that has not fired yet
    fn settle(&mut self, now: Duration) {
        self.fired = self.value_at(now);
        self.pending_at = None;
    }
}

/// Drives the displayed counter, progress bar, level label, and flash
/// counter from successive step totals
#[derive(Clone, Debug)]
pub struct StepAnimator {
    timings: AnimationTimings,
    steps: Track,
    /// Bar fill in steps within the level, 0..=STEPS_PER_LEVEL
    progress: Track,
    level: LevelLabel,
    flash: FlashCounter,
    target_steps: StepCount,
    phase: AnimationPhase,
}

impl StepAnimator {
    /// An animator resting on `steps`
    pub fn at_rest(steps: StepCount, timings: AnimationTimings) -> Self {
        let info = calculate_level_info(steps);
        Self {
            timings,
            steps: Track::at_rest(steps as f64),
            progress: Track::at_rest(info.progress_in_current_level as f64),
            level: LevelLabel::fixed(info.current_level),
            flash: FlashCounter::default(),
            target_steps: steps,
            phase: AnimationPhase::Idle,
        }
    }

    /// Step total the animation converges to
    pub fn target_steps(&self) -> StepCount {
        self.target_steps
    }

    pub fn target_info(&self) -> LevelInfo {
        calculate_level_info(self.target_steps)
    }

    /// Start animating towards `new_steps` at timeline position `now`
    ///
    /// Returns the level transition from the previous target.
    pub fn animate_to(&mut self, now: Duration, new_steps: StepCount) -> LevelTransition {
        let transition = LevelTransition::between(self.target_steps, new_steps);
        let target = calculate_level_info(new_steps);
        let displayed_level = self.level.value_at(now);
        let t = &self.timings;

        self.flash.settle(now);

        self.steps.retarget(
            now,
            vec![Segment::to(
                new_steps as f64,
                AnimationTimings::ms(t.counter_duration),
                Easing::OutCubic,
            )
            .after(AnimationTimings::ms(t.counter_delay))],
        );

        if target.current_level > displayed_level
            && target.current_level <= self.level.next
            && self.level.flashed_before_flip(now)
        {
            // Same crossing, flash already shown: finish emptying the bar on
            // the original schedule, then refill to the new progress
            let flips_at = self.level.flips_at;
            self.progress.retarget(
                now,
                vec![
                    Segment::to(0.0, flips_at - now, Easing::InOutCubic),
                    Segment::to(
                        target.progress_in_current_level as f64,
                        AnimationTimings::ms(t.level_refill_duration),
                        Easing::OutCubic,
                    ),
                ],
            );
            self.level.next = target.current_level;
            self.phase = AnimationPhase::LevelingUp;
        } else if target.current_level > displayed_level {
            let span = STEPS_PER_LEVEL as f64;
            self.progress.retarget(
                now,
                vec![
                    Segment::to(span, AnimationTimings::ms(t.level_fill_duration), Easing::OutCubic),
                    Segment::snap(span).after(AnimationTimings::ms(t.level_hold)),
                    Segment::to(
                        0.0,
                        AnimationTimings::ms(t.level_reset_duration),
                        Easing::InOutCubic,
                    ),
                    Segment::to(
                        target.progress_in_current_level as f64,
                        AnimationTimings::ms(t.level_refill_duration),
                        Easing::OutCubic,
                    ),
                ],
            );

            // Phase (a) completes at the end of segment 0, the bar is empty
            // at the end of segment 2
            let filled_at = self.progress.segment_end(0).unwrap_or(now);
            let emptied_at = self.progress.segment_end(2).unwrap_or(now);

            self.flash.pending_at = Some(filled_at);
            self.level = LevelLabel {
                shown: displayed_level,
                next: target.current_level,
                flips_at: emptied_at,
                flash_at: Some(filled_at),
            };
            self.phase = AnimationPhase::LevelingUp;
        } else {
            self.progress.retarget(
                now,
                vec![Segment::to(
                    target.progress_in_current_level as f64,
                    AnimationTimings::ms(t.progress_duration),
                    Easing::OutCubic,
                )
                .after(AnimationTimings::ms(t.progress_delay))],
            );
            // A lower level than displayed (corrective re-fetch) is shown
            // directly; level-down is never animated
            self.level = LevelLabel::fixed(target.current_level);
            self.phase = AnimationPhase::Counting;
        }

        tracing::debug!(
            from = transition.previous_steps,
            to = new_steps,
            leveled_up = transition.has_leveled_up,
            levels_gained = transition.levels_gained,
            phase = ?self.phase,
            "Animation started"
        );

        self.target_steps = new_steps;
        transition
    }

    /// Jump straight to `steps` without animating
    pub fn snap_to(&mut self, now: Duration, steps: StepCount) {
        let info = calculate_level_info(steps);
        self.flash.settle(now);
        self.steps.snap(steps as f64);
        self.progress.snap(info.progress_in_current_level as f64);
        self.level = LevelLabel::fixed(info.current_level);
        self.target_steps = steps;
        self.phase = AnimationPhase::Idle;
    }

    /// Displayed values at timeline position `now`
    pub fn frame(&self, now: Duration) -> AnimationFrame {
        let span = STEPS_PER_LEVEL as f64;
        let progress = self.progress.value_at(now).clamp(0.0, span) / span;
        AnimationFrame {
            steps: self.steps.value_at(now).max(0.0).round() as StepCount,
            progress,
            level: self.level.value_at(now),
            flash: self.flash.value_at(now),
        }
    }

    pub fn phase(&self, now: Duration) -> AnimationPhase {
        if self.is_settled(now) {
            AnimationPhase::Idle
        } else {
            self.phase
        }
    }

    /// Timeline position after which nothing changes until the next target
    pub fn settles_at(&self) -> Duration {
        let mut end = self.steps.ends_at().max(self.progress.ends_at());
        end = end.max(self.level.flips_at);
        if let Some(at) = self.flash.pending_at {
            end = end.max(at);
        }
        end
    }

    pub fn is_settled(&self, now: Duration) -> bool {
        now >= self.settles_at()
    }

    /// Frames sampled every `every` from `from` until the animation settles
    ///
    /// The last frame is taken at or after the settle point, so it always
    /// shows the resting values.
    pub fn frames(&self, from: Duration, every: Duration) -> Frames<'_> {
        Frames {
            animator: self,
            cursor: from,
            every: every.max(Duration::from_millis(1)),
            done: false,
        }
    }
}

/// Iterator over sampled frames, see [`StepAnimator::frames`]
pub struct Frames<'a> {
    animator: &'a StepAnimator,
    cursor: Duration,
    every: Duration,
    done: bool,
}

impl Iterator for Frames<'_> {
    type Item = (Duration, AnimationFrame);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let at = self.cursor;
        if self.animator.is_settled(at) {
            self.done = true;
        }
        self.cursor += self.every;
        Some((at, self.animator.frame(at)))
    }
}
