//! Step session: the controller between a view and the core.
//!
//! A session owns the selected day, the latest readings for it and the day
//! before, and the animator that replays changes. Every way of asking for
//! fresh data (first load, polling, foreground resume, pull-to-refresh, day
//! navigation) goes through [`StepSession::refresh`], which keeps at most one
//! fetch outstanding per day and hands its outcome to every concurrent
//! caller.
//!
//! Failure policy: a failed fetch never changes what is displayed. Only a
//! user refresh reports the failure; every other trigger stays silent.

use crate::adapter::StepDataAdapter;
use crate::animation::{AnimationFrame, AnimationPhase, StepAnimator};
use crate::config::Config;
use crate::dates::{format_day, is_today, last_updated_text, next_day, previous_day, DayZone};
use crate::level::{LevelInfo, LevelTransition};
use crate::notify::SyncNotice;
use crate::{AnimationTimings, DailySteps, DayChange, DaySnapshot, ProviderError, StepCount};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Why a refresh was started
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// First load of the session
    Initial,
    /// Periodic refresh while viewing today
    Poll,
    /// App came back to the foreground
    Foreground,
    /// Pull-to-refresh
    UserRefresh,
    /// A different day was selected
    DayChange,
}

impl SyncTrigger {
    /// Only user refreshes report their outcome
    pub fn is_user_initiated(&self) -> bool {
        matches!(self, SyncTrigger::UserRefresh)
    }
}

/// Result of one refresh
#[derive(Clone, Debug, Serialize)]
pub struct SyncReport {
    pub sync_id: Uuid,
    pub trigger: SyncTrigger,
    pub date: NaiveDate,
    /// Reading for `date` before the refresh started
    pub previous: StepCount,
    /// Reading for `date` after the refresh; equals `previous` on failure
    pub current: StepCount,
    pub transition: LevelTransition,
    /// What to show the user, if anything
    pub notice: Option<SyncNotice>,
    #[serde(skip)]
    pub error: Option<ProviderError>,
    /// Joined a fetch another caller had already started
    pub coalesced: bool,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything a view needs to draw the step screen
#[derive(Clone, Debug, Serialize)]
pub struct StepView {
    pub date: NaiveDate,
    pub date_label: String,
    pub is_today: bool,
    pub can_go_forward: bool,
    /// Displayed (animated) values
    pub frame: AnimationFrame,
    pub phase: AnimationPhase,
    /// Values the animation converges to
    pub target: LevelInfo,
    pub steps: StepCount,
    pub previous_day_steps: StepCount,
    pub change_vs_previous_day: DayChange,
    pub dominant_source: Option<String>,
    pub is_loading: bool,
    pub initial_load_done: bool,
    pub last_updated: String,
}

type FetchOutcome = Result<DaySnapshot, ProviderError>;

struct SessionState {
    selected_date: NaiveDate,
    snapshot: DaySnapshot,
    animator: StepAnimator,
    initial_load_done: bool,
    is_loading: bool,
    last_updated: Option<DateTime<Utc>>,
}

struct InFlight {
    date: NaiveDate,
    generation: u64,
    outcome: watch::Receiver<Option<FetchOutcome>>,
}

enum Claim {
    Lead {
        generation: u64,
        outcome: watch::Sender<Option<FetchOutcome>>,
    },
    Follow(watch::Receiver<Option<FetchOutcome>>),
}

/// Clears the in-flight slot when the leading fetch ends, even if its
/// future is dropped
struct InFlightGuard<'a> {
    session: &'a StepSession,
    generation: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let cleared = {
            let mut slot = self.session.in_flight();
            match slot.as_ref() {
                Some(flight) if flight.generation == self.generation => {
                    *slot = None;
                    true
                }
                _ => false,
            }
        };
        if cleared {
            self.session.state().is_loading = false;
        }
    }
}

fn empty_snapshot(date: NaiveDate) -> DaySnapshot {
    DaySnapshot {
        selected: DailySteps::empty(date),
        previous_day: DailySteps::empty(previous_day(date)),
    }
}

/// Shortest poll interval a session accepts
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Step screen controller
pub struct StepSession {
    adapter: Arc<StepDataAdapter>,
    zone: DayZone,
    poll_interval: Duration,
    epoch: Instant,
    cancel: CancellationToken,
    state: Mutex<SessionState>,
    in_flight: Mutex<Option<InFlight>>,
    generation: AtomicU64,
}

impl StepSession {
    /// A session showing today, nothing loaded yet
    ///
    /// `poll_interval` is raised to [`MIN_POLL_INTERVAL`] if shorter.
    pub fn new(
        adapter: Arc<StepDataAdapter>,
        timings: AnimationTimings,
        poll_interval: Duration,
    ) -> Self {
        let zone = adapter.zone();
        let today = zone.today();
        Self {
            adapter,
            zone,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            epoch: Instant::now(),
            cancel: CancellationToken::new(),
            state: Mutex::new(SessionState {
                selected_date: today,
                snapshot: empty_snapshot(today),
                animator: StepAnimator::at_rest(0, timings),
                initial_load_done: false,
                is_loading: false,
                last_updated: None,
            }),
            in_flight: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn from_config(adapter: Arc<StepDataAdapter>, config: &Config) -> Self {
        Self::new(adapter, config.animation.clone(), config.sync.poll_interval())
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_flight(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Position on the animation timeline
    pub fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    pub fn selected_date(&self) -> NaiveDate {
        self.state().selected_date
    }

    pub fn is_viewing_today(&self) -> bool {
        is_today(self.selected_date(), self.zone.today())
    }

    pub fn initial_load_done(&self) -> bool {
        self.state().initial_load_done
    }

    /// Displayed values right now
    pub fn frame(&self) -> AnimationFrame {
        let now = self.now();
        self.state().animator.frame(now)
    }

    /// Time left until the current animation settles
    pub fn settles_in(&self) -> Duration {
        let now = self.now();
        self.state().animator.settles_at().saturating_sub(now)
    }

    pub fn view(&self) -> StepView {
        let now = self.now();
        let today = self.zone.today();
        let state = self.state();
        StepView {
            date: state.selected_date,
            date_label: format_day(state.selected_date),
            is_today: is_today(state.selected_date, today),
            can_go_forward: state.selected_date < today,
            frame: state.animator.frame(now),
            phase: state.animator.phase(now),
            target: state.animator.target_info(),
            steps: state.snapshot.selected.total,
            previous_day_steps: state.snapshot.previous_day.total,
            change_vs_previous_day: state.snapshot.change_vs_previous_day(),
            dominant_source: state
                .snapshot
                .selected
                .dominant_source()
                .map(|(source, _)| source.to_string()),
            is_loading: state.is_loading,
            initial_load_done: state.initial_load_done,
            last_updated: last_updated_text(state.last_updated, self.zone),
        }
    }

    /// Load the selected day the first time the session is shown
    ///
    /// Returns `None` once the first load has already happened.
    pub async fn load_initial(&self) -> Option<SyncReport> {
        if self.initial_load_done() {
            return None;
        }
        tracing::info!("First load of step data");
        Some(self.refresh(SyncTrigger::Initial).await)
    }

    /// Fetch the selected day and the day before, then animate the change
    pub async fn refresh(&self, trigger: SyncTrigger) -> SyncReport {
        let sync_id = Uuid::new_v4();
        let (date, previous) = {
            let state = self.state();
            (state.selected_date, state.snapshot.selected.total)
        };

        let (outcome, coalesced) = match self.claim(date) {
            Claim::Follow(receiver) => {
                tracing::debug!(%sync_id, %date, ?trigger, "Joining in-flight fetch");
                (Self::follow(receiver).await, true)
            }
            Claim::Lead {
                generation,
                outcome,
            } => {
                tracing::debug!(%sync_id, %date, ?trigger, "Fetching steps");
                let _guard = InFlightGuard {
                    session: self,
                    generation,
                };
                self.state().is_loading = true;
                let result = self.adapter.fetch_snapshot(date, &self.cancel).await;
                self.apply(date, trigger, &result);
                outcome.send_replace(Some(result.clone()));
                (result, false)
            }
        };

        let report = match outcome {
            Ok(snapshot) => {
                let current = snapshot.selected.total;
                SyncReport {
                    sync_id,
                    trigger,
                    date,
                    previous,
                    current,
                    transition: LevelTransition::between(previous, current),
                    notice: trigger
                        .is_user_initiated()
                        .then(|| SyncNotice::for_sync(previous, current)),
                    error: None,
                    coalesced,
                }
            }
            Err(e) => {
                if trigger.is_user_initiated() {
                    tracing::warn!(%sync_id, %date, "Refresh failed: {}", e);
                } else {
                    tracing::debug!(%sync_id, %date, ?trigger, "Sync failed silently: {}", e);
                }
                SyncReport {
                    sync_id,
                    trigger,
                    date,
                    previous,
                    current: previous,
                    transition: LevelTransition::between(previous, previous),
                    notice: trigger
                        .is_user_initiated()
                        .then(|| SyncNotice::failed(&e)),
                    error: Some(e),
                    coalesced,
                }
            }
        };

        tracing::info!(
            %sync_id,
            ?trigger,
            previous = report.previous,
            current = report.current,
            coalesced,
            "Sync finished"
        );
        report
    }

    /// Foreground resume hook; refreshes only while viewing today
    pub async fn on_foreground(&self) -> Option<SyncReport> {
        if !self.is_viewing_today() {
            return None;
        }
        tracing::debug!("App returned to foreground");
        Some(self.refresh(SyncTrigger::Foreground).await)
    }

    /// Refresh every poll interval while viewing today, until cancelled
    pub async fn run_polling(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;
        tracing::debug!("Polling every {:?}", self.poll_interval);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if self.is_viewing_today() {
                        self.refresh(SyncTrigger::Poll).await;
                    }
                }
            }
        }
        tracing::debug!("Polling stopped");
    }

    /// Show `date` and load it
    ///
    /// Returns `None` for days after today.
    pub async fn select_date(&self, date: NaiveDate) -> Option<SyncReport> {
        if date > self.zone.today() {
            tracing::debug!(%date, "Refusing to select a future day");
            return None;
        }
        {
            let now = self.now();
            let mut state = self.state();
            state.selected_date = date;
            state.snapshot = empty_snapshot(date);
            state.animator.snap_to(now, 0);
        }
        Some(self.refresh(SyncTrigger::DayChange).await)
    }

    pub async fn show_previous_day(&self) -> Option<SyncReport> {
        self.select_date(previous_day(self.selected_date())).await
    }

    /// Never moves past today
    pub async fn show_next_day(&self) -> Option<SyncReport> {
        let selected = self.selected_date();
        if selected >= self.zone.today() {
            return None;
        }
        self.select_date(next_day(selected)).await
    }

    /// Cancel in-flight fetches and stop polling
    pub fn shutdown(&self) {
        tracing::debug!("Shutting down step session");
        self.cancel.cancel();
    }

    fn claim(&self, date: NaiveDate) -> Claim {
        let mut slot = self.in_flight();
        if let Some(flight) = slot.as_ref() {
            if flight.date == date {
                return Claim::Follow(flight.outcome.clone());
            }
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (sender, receiver) = watch::channel(None);
        *slot = Some(InFlight {
            date,
            generation,
            outcome: receiver,
        });
        Claim::Lead {
            generation,
            outcome: sender,
        }
    }

    async fn follow(mut receiver: watch::Receiver<Option<FetchOutcome>>) -> FetchOutcome {
        let outcome = match receiver.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        // The leader went away without an outcome
        outcome.unwrap_or(Err(ProviderError::Cancelled))
    }

    fn apply(&self, date: NaiveDate, trigger: SyncTrigger, outcome: &FetchOutcome) {
        let now = self.now();
        let mut state = self.state();
        state.initial_load_done = true;

        if state.selected_date != date {
            tracing::debug!(%date, "Discarding fetch for a day no longer shown");
            return;
        }

        let snapshot = match outcome {
            Ok(snapshot) => snapshot,
            Err(_) => return,
        };

        let total = snapshot.selected.total;
        if trigger == SyncTrigger::DayChange {
            state.animator.snap_to(now, total);
        } else {
            state.animator.animate_to(now, total);
        }
        state.snapshot = snapshot.clone();
        state.last_updated = Some(Utc::now());
    }
}

impl Drop for StepSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::init_test;
    use crate::notify::NoticeKind;
    use crate::sources::ScriptedProvider;
    use crate::{HealthProvider, RecordMetadata, StepRecord};
    use chrono::Duration as Span;

    fn record_on(date: NaiveDate, hour: i64, count: StepCount) -> StepRecord {
        let start = DayZone::utc().window(date).start + Span::hours(hour);
        StepRecord {
            count,
            start_time: start,
            end_time: start + Span::minutes(30),
            metadata: RecordMetadata {
                data_origin: "com.example.phone".into(),
            },
        }
    }

    fn today() -> NaiveDate {
        DayZone::utc().today()
    }

    fn seeded_provider() -> ScriptedProvider {
        ScriptedProvider::with_records(vec![
            record_on(today(), 8, 8754),
            record_on(previous_day(today()), 8, 7432),
        ])
    }

    fn session_over(provider: &ScriptedProvider) -> StepSession {
        init_test();
        let provider: Arc<dyn HealthProvider> = Arc::new(provider.clone());
        let adapter = StepDataAdapter::new(provider, DayZone::utc(), Duration::from_secs(10));
        StepSession::new(
            Arc::new(adapter),
            AnimationTimings::default(),
            Duration::from_secs(60),
        )
    }

    async fn settle(session: &StepSession) {
        tokio::time::sleep(session.settles_in() + Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_load_animates_from_zero() {
        let provider = seeded_provider();
        let session = session_over(&provider);

        let report = session.load_initial().await.unwrap();
        assert_eq!(report.previous, 0);
        assert_eq!(report.current, 8754);
        assert!(report.transition.has_leveled_up);
        assert!(report.notice.is_none());
        assert!(session.load_initial().await.is_none());

        settle(&session).await;
        let view = session.view();
        assert_eq!(view.frame.steps, 8754);
        assert_eq!(view.frame.level, 8);
        assert!((view.frame.progress - 0.754).abs() < 1e-9);
        assert_eq!(view.frame.flash, 1);
        assert_eq!(view.previous_day_steps, 7432);
        assert_eq!(
            view.change_vs_previous_day,
            DayChange { percent: 18, is_increase: true }
        );
        assert!(view.initial_load_done);
        assert!(!view.is_loading);
        assert_eq!(view.phase, AnimationPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_refresh_reports_added_steps() {
        let provider = seeded_provider();
        let session = session_over(&provider);
        session.load_initial().await;
        settle(&session).await;

        provider.push_record(record_on(today(), 12, 500));
        let report = session.refresh(SyncTrigger::UserRefresh).await;
        assert_eq!(report.notice, Some(SyncNotice::Synced { added: 500 }));
        assert!(report.transition.has_leveled_up);

        let report = session.refresh(SyncTrigger::UserRefresh).await;
        assert_eq!(report.notice, Some(SyncNotice::UpToDate));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_keeps_display_and_notifies() {
        let provider = seeded_provider();
        let session = session_over(&provider);
        session.load_initial().await;
        settle(&session).await;

        provider.fail_next_queries(1);
        let report = session.refresh(SyncTrigger::UserRefresh).await;

        let notice = report.notice.clone().unwrap();
        assert_eq!(notice.kind(), NoticeKind::Error);
        assert!(!report.is_success());
        assert_eq!(report.current, 8754);

        settle(&session).await;
        let view = session.view();
        assert_eq!(view.frame.steps, 8754);
        assert_eq!(view.steps, 8754);
        assert_eq!(view.frame.flash, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_failure_is_silent() {
        let provider = seeded_provider();
        let session = session_over(&provider);
        session.load_initial().await;

        provider.fail_next_queries(2);
        let report = session.refresh(SyncTrigger::Poll).await;
        assert!(report.notice.is_none());
        assert!(matches!(report.error, Some(ProviderError::QueryFailure(_))));
        assert_eq!(session.view().steps, 8754);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_failure_shows_zero() {
        let provider = seeded_provider();
        provider.set_deny_permission(true);
        let session = session_over(&provider);

        let report = session.load_initial().await.unwrap();
        assert_eq!(report.error, Some(ProviderError::PermissionDenied));
        assert!(report.notice.is_none());

        let view = session.view();
        assert_eq!(view.frame.steps, 0);
        assert!(view.initial_load_done);
        assert_eq!(view.last_updated, "Never updated");
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_refreshes_last_writer_wins() {
        let provider = seeded_provider();
        let session = session_over(&provider);
        session.load_initial().await;
        settle(&session).await;

        provider.push_record(record_on(today(), 12, 200));
        session.refresh(SyncTrigger::UserRefresh).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        provider.push_record(record_on(today(), 13, 1100));
        let report = session.refresh(SyncTrigger::UserRefresh).await;
        assert_eq!(report.previous, 8954);
        assert_eq!(report.current, 10054);

        settle(&session).await;
        let frame = session.frame();
        assert_eq!(frame.steps, 10054);
        assert_eq!(frame.level, 10);
        assert!((frame.progress - 0.054).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refreshes_share_one_fetch() {
        let provider = seeded_provider();
        provider.set_latency(Duration::from_millis(200));
        let session = session_over(&provider);

        let (user, foreground) = tokio::join!(
            session.refresh(SyncTrigger::UserRefresh),
            session.refresh(SyncTrigger::Foreground),
        );

        assert_eq!(provider.calls().read_records.load(Ordering::SeqCst), 2);
        assert_eq!(provider.calls().initialize.load(Ordering::SeqCst), 1);
        assert!(!user.coalesced);
        assert!(foreground.coalesced);
        assert_eq!(user.current, 8754);
        assert_eq!(foreground.current, 8754);
        assert_eq!(user.notice, Some(SyncNotice::Synced { added: 8754 }));
        assert!(foreground.notice.is_none());
        assert!(!session.view().is_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_day_navigation() {
        let provider = seeded_provider();
        let session = session_over(&provider);
        session.load_initial().await;

        assert!(session.show_next_day().await.is_none());

        let report = session.show_previous_day().await.unwrap();
        assert_eq!(report.trigger, SyncTrigger::DayChange);
        assert_eq!(report.current, 7432);
        assert!(!session.is_viewing_today());

        // Day changes snap instead of animating
        let view = session.view();
        assert_eq!(view.frame.steps, 7432);
        assert_eq!(view.frame.level, 7);
        assert!(view.can_go_forward);
        assert!(session.on_foreground().await.is_none());

        session.show_next_day().await.unwrap();
        assert!(session.is_viewing_today());
        assert_eq!(session.view().frame.steps, 8754);
    }

    #[tokio::test(start_paused = true)]
    async fn test_future_day_rejected() {
        let provider = seeded_provider();
        let session = session_over(&provider);
        assert!(session.select_date(next_day(today())).await.is_none());
        assert_eq!(session.selected_date(), today());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_refreshes_today() {
        let provider = seeded_provider();
        let session = Arc::new(session_over(&provider));
        session.load_initial().await;
        assert_eq!(provider.calls().read_records.load(Ordering::SeqCst), 2);

        let cancel = CancellationToken::new();
        let poller = {
            let session = session.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { session.run_polling(cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(provider.calls().read_records.load(Ordering::SeqCst), 4);

        cancel.cancel();
        poller.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_poll_interval_is_raised() {
        init_test();
        let provider = seeded_provider();
        let shared: Arc<dyn HealthProvider> = Arc::new(provider.clone());
        let adapter = StepDataAdapter::new(shared, DayZone::utc(), Duration::from_secs(10));
        let session = Arc::new(StepSession::new(
            Arc::new(adapter),
            AnimationTimings::default(),
            Duration::ZERO,
        ));
        session.load_initial().await;

        let cancel = CancellationToken::new();
        let poller = {
            let session = session.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { session.run_polling(cancel).await })
        };

        tokio::time::sleep(MIN_POLL_INTERVAL + Duration::from_millis(500)).await;
        assert_eq!(provider.calls().read_records.load(Ordering::SeqCst), 4);

        cancel.cancel();
        poller.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_fetches() {
        let provider = seeded_provider();
        let session = session_over(&provider);

        session.shutdown();
        let report = session.refresh(SyncTrigger::UserRefresh).await;
        assert_eq!(report.error, Some(ProviderError::Cancelled));
        assert!(session.view().initial_load_done);
    }
}
