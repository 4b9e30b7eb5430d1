//! Pull-to-refresh gesture recognition.
//!
//! [`RefreshController`] turns a stream of pointer samples on one scrollable
//! surface into at most one refresh per gesture, reporting damped progress
//! for the spinner along the way. It knows nothing about any input system:
//! the host forwards [`PointerSample`]s and the surface's scroll offset.
//!
//! The refresh itself is an injected async [`RefreshOperation`]. Releasing
//! past the threshold invokes it and hands the caller a [`PendingRefresh`] to
//! await; the result goes back through [`RefreshController::finish`]. Keeping
//! the await outside the controller is what lets the host keep feeding
//! events (which are then refused by the re-entrancy guard) while a refresh
//! is outstanding.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::RefreshConfig;
use crate::notify::{Notification, Notifier};

/// One pointer/touch sample in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerSample {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position; grows downwards.
    pub y: f64,
    /// Sample time in milliseconds.
    pub timestamp_ms: u64,
}

impl PointerSample {
    /// Create a sample.
    pub fn new(x: f64, y: f64, timestamp_ms: u64) -> Self {
        Self { x, y, timestamp_ms }
    }
}

/// Lifecycle of the recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPhase {
    /// No gesture in progress.
    #[default]
    Idle,
    /// Following a pull that started at the top of the surface.
    Tracking,
    /// Released past the threshold; the refresh is being started.
    Committing,
    /// The refresh operation is outstanding.
    Refreshing,
}

impl std::fmt::Display for RefreshPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Tracking => write!(f, "tracking"),
            Self::Committing => write!(f, "committing"),
            Self::Refreshing => write!(f, "refreshing"),
        }
    }
}

/// State of one touch interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureSession {
    origin_y: f64,
    raw_distance: f64,
    damped_distance: f64,
    started_at_ms: u64,
    last_sample_ms: u64,
}

impl GestureSession {
    fn begin(sample: PointerSample) -> Self {
        Self {
            origin_y: sample.y,
            raw_distance: 0.0,
            damped_distance: 0.0,
            started_at_ms: sample.timestamp_ms,
            last_sample_ms: sample.timestamp_ms,
        }
    }

    /// Vertical position at touch start.
    pub fn origin_y(&self) -> f64 {
        self.origin_y
    }

    /// Downward displacement since touch start, never negative.
    pub fn raw_distance(&self) -> f64 {
        self.raw_distance
    }

    /// Raw distance after damping.
    pub fn damped_distance(&self) -> f64 {
        self.damped_distance
    }

    /// How long the finger has been down, in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.last_sample_ms.saturating_sub(self.started_at_ms)
    }
}

/// Why an input event did nothing. Not an error; hosts usually ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureIgnored {
    /// The surface was scrolled away from the top at touch start.
    NotAtTop { scroll_offset: f64 },
    /// A refresh is still outstanding.
    RefreshInFlight,
    /// No gesture is being tracked.
    NoSession,
    /// The surface has been torn down.
    Detached,
}

/// Result of [`RefreshController::on_interaction_start`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartOutcome {
    /// A session was opened.
    Tracking,
    /// The interaction will be ignored until the next start.
    Ignored(GestureIgnored),
}

/// Result of [`RefreshController::on_interaction_move`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveOutcome {
    /// The pull moved the spinner; the host must suppress native scrolling.
    Consumed { damped_distance: f64 },
    /// At or above the origin; native scrolling may proceed.
    Passthrough,
    /// No session to update.
    Ignored(GestureIgnored),
}

/// Error returned by a failed refresh operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("Refresh failed: {reason}")]
pub struct RefreshFailed {
    /// Human-readable failure reason.
    pub reason: String,
}

impl RefreshFailed {
    /// Create a failure with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// How a refresh ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// The operation resolved successfully.
    Completed,
    /// The operation rejected.
    Failed(RefreshFailed),
}

impl RefreshOutcome {
    /// Check if the refresh succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Boxed future returned by a refresh operation.
pub type RefreshFuture = Pin<Box<dyn Future<Output = Result<(), RefreshFailed>> + Send + 'static>>;

/// The async work a committed gesture starts.
pub trait RefreshOperation: Send + Sync {
    /// Start one refresh.
    fn refresh(&self) -> RefreshFuture;
}

impl<F, Fut> RefreshOperation for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), RefreshFailed>> + Send + 'static,
{
    fn refresh(&self) -> RefreshFuture {
        Box::pin(self())
    }
}

/// Callbacks into the presentation layer.
pub trait RefreshObserver: Send {
    /// Damped distance or phase changed.
    fn on_progress(&mut self, _damped_distance: f64, _phase: RefreshPhase) {}

    /// A refresh operation was just started.
    fn on_refresh_start(&mut self) {}

    /// The outstanding refresh finished.
    fn on_refresh_end(&mut self, _outcome: &RefreshOutcome) {}
}

/// Observer that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RefreshObserver for NoopObserver {}

/// Observer callbacks as a value, for channel-based hosts.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshEvent {
    /// See [`RefreshObserver::on_progress`].
    Progress {
        damped_distance: f64,
        phase: RefreshPhase,
    },
    /// See [`RefreshObserver::on_refresh_start`].
    Started,
    /// See [`RefreshObserver::on_refresh_end`].
    Finished(RefreshOutcome),
}

impl RefreshObserver for mpsc::UnboundedSender<RefreshEvent> {
    fn on_progress(&mut self, damped_distance: f64, phase: RefreshPhase) {
        let _ = self.send(RefreshEvent::Progress {
            damped_distance,
            phase,
        });
    }

    fn on_refresh_start(&mut self) {
        let _ = self.send(RefreshEvent::Started);
    }

    fn on_refresh_end(&mut self, outcome: &RefreshOutcome) {
        let _ = self.send(RefreshEvent::Finished(outcome.clone()));
    }
}

/// Identifies one committed refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefreshTicket(u64);

/// A started refresh the host must await and hand back via
/// [`RefreshController::finish`].
pub struct PendingRefresh {
    ticket: RefreshTicket,
    future: RefreshFuture,
}

impl PendingRefresh {
    /// Ticket of this refresh.
    pub fn ticket(&self) -> RefreshTicket {
        self.ticket
    }

    /// Await the refresh operation.
    pub async fn wait(self) -> RefreshCompletion {
        let result = self.future.await;
        RefreshCompletion {
            ticket: self.ticket,
            result,
        }
    }
}

impl std::fmt::Debug for PendingRefresh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRefresh")
            .field("ticket", &self.ticket)
            .finish_non_exhaustive()
    }
}

/// Result of an awaited [`PendingRefresh`].
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshCompletion {
    /// Which refresh finished.
    pub ticket: RefreshTicket,
    /// What the operation returned.
    pub result: Result<(), RefreshFailed>,
}

/// Result of [`RefreshController::on_interaction_end`].
#[derive(Debug)]
pub enum Release {
    /// Threshold exceeded; the refresh operation is running.
    Refreshing(PendingRefresh),
    /// Threshold not met; back to idle without refreshing.
    Reset { damped_distance: f64 },
    /// No session to release.
    Ignored(GestureIgnored),
}

/// Pull-to-refresh recognizer for one scrollable surface.
pub struct RefreshController {
    config: RefreshConfig,
    operation: Arc<dyn RefreshOperation>,
    observer: Box<dyn RefreshObserver>,
    notifier: Option<Box<dyn Notifier>>,
    phase: RefreshPhase,
    session: Option<GestureSession>,
    in_flight: Option<RefreshTicket>,
    next_ticket: u64,
    detached: bool,
}

impl RefreshController {
    /// Create a controller that runs `operation` on committed gestures.
    pub fn new(config: RefreshConfig, operation: Arc<dyn RefreshOperation>) -> Self {
        Self {
            config,
            operation,
            observer: Box::new(NoopObserver),
            notifier: None,
            phase: RefreshPhase::Idle,
            session: None,
            in_flight: None,
            next_ticket: 1,
            detached: false,
        }
    }

    /// Attach presentation callbacks.
    #[must_use]
    pub fn with_observer(mut self, observer: impl RefreshObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Attach a notifier for refresh toasts.
    #[must_use]
    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }

    /// Current phase.
    pub fn phase(&self) -> RefreshPhase {
        self.phase
    }

    /// Active gesture session, if any.
    pub fn session(&self) -> Option<&GestureSession> {
        self.session.as_ref()
    }

    /// Damped distance of the active session, or 0.
    pub fn damped_distance(&self) -> f64 {
        self.session.as_ref().map_or(0.0, GestureSession::damped_distance)
    }

    /// Spinner translation for the current distance, clamped to the
    /// configured maximum.
    pub fn indicator_offset(&self) -> f64 {
        (self.damped_distance() * self.config.indicator_scale).min(self.config.indicator_max)
    }

    /// Check if a refresh is outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.phase == RefreshPhase::Refreshing
    }

    /// Touch down at `sample`, with the surface scrolled to `scroll_offset`.
    pub fn on_interaction_start(&mut self, sample: PointerSample, scroll_offset: f64) -> StartOutcome {
        if self.detached {
            return self.ignore(GestureIgnored::Detached);
        }
        if self.phase == RefreshPhase::Refreshing {
            return self.ignore(GestureIgnored::RefreshInFlight);
        }
        if !scroll_offset.is_finite() || scroll_offset.abs() > f64::EPSILON {
            self.session = None;
            self.phase = RefreshPhase::Idle;
            return self.ignore(GestureIgnored::NotAtTop { scroll_offset });
        }

        self.session = Some(GestureSession::begin(sample));
        self.phase = RefreshPhase::Tracking;
        StartOutcome::Tracking
    }

    /// Finger moved to `sample`.
    pub fn on_interaction_move(&mut self, sample: PointerSample) -> MoveOutcome {
        if self.phase != RefreshPhase::Tracking {
            return MoveOutcome::Ignored(GestureIgnored::NoSession);
        }
        let Some(session) = self.session.as_mut() else {
            return MoveOutcome::Ignored(GestureIgnored::NoSession);
        };

        session.raw_distance = (sample.y - session.origin_y).max(0.0);
        session.damped_distance = session.raw_distance * self.config.damping_factor;
        session.last_sample_ms = sample.timestamp_ms;
        let (raw, damped) = (session.raw_distance, session.damped_distance);

        self.observer.on_progress(damped, RefreshPhase::Tracking);
        if raw > 0.0 {
            MoveOutcome::Consumed {
                damped_distance: damped,
            }
        } else {
            MoveOutcome::Passthrough
        }
    }

    /// Finger lifted.
    pub fn on_interaction_end(&mut self) -> Release {
        if self.phase != RefreshPhase::Tracking {
            return Release::Ignored(GestureIgnored::NoSession);
        }
        let Some(session) = self.session.as_ref() else {
            return Release::Ignored(GestureIgnored::NoSession);
        };
        let damped = session.damped_distance;

        if damped <= self.config.threshold || self.in_flight.is_some() {
            self.reset();
            return Release::Reset {
                damped_distance: damped,
            };
        }

        self.phase = RefreshPhase::Committing;
        self.observer.on_progress(damped, RefreshPhase::Committing);

        let ticket = RefreshTicket(self.next_ticket);
        self.next_ticket += 1;
        self.in_flight = Some(ticket);
        self.phase = RefreshPhase::Refreshing;
        self.observer.on_progress(damped, RefreshPhase::Refreshing);
        self.observer.on_refresh_start();
        info!(damped_distance = damped, "Pull-to-refresh committed");

        Release::Refreshing(PendingRefresh {
            ticket,
            future: self.operation.refresh(),
        })
    }

    /// Apply the result of an awaited refresh.
    ///
    /// Returns `None` when the completion no longer matches the outstanding
    /// refresh, e.g. after [`RefreshController::teardown`].
    pub fn finish(&mut self, completion: RefreshCompletion) -> Option<RefreshOutcome> {
        if self.in_flight != Some(completion.ticket) {
            debug!(ticket = ?completion.ticket, "Discarding completion of a stale refresh");
            return None;
        }
        self.in_flight = None;
        self.reset();

        let outcome = match completion.result {
            Ok(()) => RefreshOutcome::Completed,
            Err(e) => RefreshOutcome::Failed(e),
        };
        self.observer.on_refresh_end(&outcome);

        match &outcome {
            RefreshOutcome::Completed => {
                info!("Refresh completed");
                if let (Some(notifier), Some(message)) =
                    (self.notifier.as_mut(), self.config.success_message.as_ref())
                {
                    notifier.notify(Notification::success(message.clone()));
                }
            }
            RefreshOutcome::Failed(e) => {
                warn!(error = %e, "Refresh failed");
                if let Some(notifier) = self.notifier.as_mut() {
                    notifier.notify(Notification::error(e.to_string()));
                }
            }
        }
        Some(outcome)
    }

    /// Give up on an outstanding refresh whose completion will never be
    /// handed back, e.g. because the host dropped the [`PendingRefresh`].
    ///
    /// Returns to `Idle` without reporting an outcome. Returns `false` if
    /// `ticket` is not the outstanding refresh.
    pub fn abandon(&mut self, ticket: RefreshTicket) -> bool {
        if self.in_flight != Some(ticket) {
            return false;
        }
        debug!(?ticket, "Abandoning outstanding refresh");
        self.in_flight = None;
        self.reset();
        true
    }

    /// The host surface went away. Drops any session without refreshing and
    /// discards the completion of an outstanding refresh.
    pub fn teardown(&mut self) {
        if self.session.is_some() || self.in_flight.is_some() {
            debug!(phase = %self.phase, "Surface torn down mid-gesture");
        }
        self.detached = true;
        self.session = None;
        self.in_flight = None;
        self.phase = RefreshPhase::Idle;
    }

    fn reset(&mut self) {
        self.session = None;
        self.phase = RefreshPhase::Idle;
        self.observer.on_progress(0.0, RefreshPhase::Idle);
    }

    fn ignore(&self, reason: GestureIgnored) -> StartOutcome {
        debug!(?reason, "Ignoring interaction start");
        StartOutcome::Ignored(reason)
    }
}

impl std::fmt::Debug for RefreshController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshController")
            .field("phase", &self.phase)
            .field("session", &self.session)
            .field("in_flight", &self.in_flight)
            .field("detached", &self.detached)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ToastLevel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Harness {
        controller: RefreshController,
        events: mpsc::UnboundedReceiver<RefreshEvent>,
        calls: Arc<AtomicUsize>,
    }

    impl Harness {
        fn new(result: Result<(), RefreshFailed>) -> Self {
            let calls = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&calls);
            let operation = move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let result = result.clone();
                async move { result }
            };
            let (tx, events) = mpsc::unbounded_channel();
            let controller =
                RefreshController::new(RefreshConfig::default(), Arc::new(operation)).with_observer(tx);
            Self {
                controller,
                events,
                calls,
            }
        }

        fn ok() -> Self {
            Self::new(Ok(()))
        }

        fn drain(&mut self) -> Vec<RefreshEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn pull(&mut self, distance: f64) -> Release {
            self.controller
                .on_interaction_start(PointerSample::new(10.0, 100.0, 0), 0.0);
            self.controller
                .on_interaction_move(PointerSample::new(10.0, 100.0 + distance, 16));
            self.controller.on_interaction_end()
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[tokio::test]
    async fn test_pull_past_threshold_refreshes_once() {
        let mut h = Harness::ok();
        h.controller
            .on_interaction_start(PointerSample::new(0.0, 100.0, 0), 0.0);
        let moved = h
            .controller
            .on_interaction_move(PointerSample::new(0.0, 240.0, 16));
        assert_eq!(moved, MoveOutcome::Consumed { damped_distance: 70.0 });
        assert_close(h.controller.damped_distance(), 70.0);

        let Release::Refreshing(pending) = h.controller.on_interaction_end() else {
            panic!("expected a refresh");
        };
        assert_eq!(h.calls(), 1);
        assert_eq!(h.controller.phase(), RefreshPhase::Refreshing);

        let outcome = h.controller.finish(pending.wait().await);
        assert_eq!(outcome, Some(RefreshOutcome::Completed));
        assert_eq!(h.controller.phase(), RefreshPhase::Idle);
        assert_close(h.controller.damped_distance(), 0.0);
        assert_eq!(h.calls(), 1);

        let events = h.drain();
        let starts = events.iter().filter(|e| **e == RefreshEvent::Started).count();
        assert_eq!(starts, 1);
        assert_eq!(
            events.last(),
            Some(&RefreshEvent::Finished(RefreshOutcome::Completed))
        );
    }

    #[test]
    fn test_pull_below_threshold_resets_without_refresh() {
        let mut h = Harness::ok();
        let release = h.pull(80.0);

        match release {
            Release::Reset { damped_distance } => assert_close(damped_distance, 40.0),
            other => panic!("expected reset, got {other:?}"),
        }
        assert_eq!(h.calls(), 0);
        assert_eq!(h.controller.phase(), RefreshPhase::Idle);
        assert!(!h.drain().contains(&RefreshEvent::Started));
    }

    #[test]
    fn test_exactly_at_threshold_does_not_refresh() {
        let mut h = Harness::ok();
        assert!(matches!(h.pull(120.0), Release::Reset { .. }));
        assert_eq!(h.calls(), 0);
    }

    #[test]
    fn test_scrolled_surface_never_tracks() {
        let mut h = Harness::ok();
        let start = h
            .controller
            .on_interaction_start(PointerSample::new(0.0, 100.0, 0), 12.0);
        assert_eq!(
            start,
            StartOutcome::Ignored(GestureIgnored::NotAtTop { scroll_offset: 12.0 })
        );

        let moved = h
            .controller
            .on_interaction_move(PointerSample::new(0.0, 400.0, 16));
        assert_eq!(moved, MoveOutcome::Ignored(GestureIgnored::NoSession));
        assert!(matches!(
            h.controller.on_interaction_end(),
            Release::Ignored(GestureIgnored::NoSession)
        ));

        assert!(h.drain().is_empty(), "no progress for scrolled surfaces");
        assert_eq!(h.calls(), 0);
    }

    #[test]
    fn test_upward_motion_reports_zero_progress() {
        let mut h = Harness::ok();
        h.controller
            .on_interaction_start(PointerSample::new(0.0, 300.0, 0), 0.0);

        let samples = [320.0, 250.0, 300.0, 410.0, 100.0];
        for (i, y) in samples.into_iter().enumerate() {
            let outcome = h
                .controller
                .on_interaction_move(PointerSample::new(0.0, y, i as u64 * 16));
            let expected = (y - 300.0_f64).max(0.0) * 0.5;
            assert_close(h.controller.damped_distance(), expected);
            if expected > 0.0 {
                assert!(matches!(outcome, MoveOutcome::Consumed { .. }));
            } else {
                assert_eq!(outcome, MoveOutcome::Passthrough);
            }
        }

        for event in h.drain() {
            if let RefreshEvent::Progress { damped_distance, .. } = event {
                assert!(damped_distance >= 0.0);
            }
        }
    }

    #[tokio::test]
    async fn test_restart_while_refreshing_is_ignored() {
        let mut h = Harness::ok();
        let Release::Refreshing(pending) = h.pull(200.0) else {
            panic!("expected a refresh");
        };

        let again = h
            .controller
            .on_interaction_start(PointerSample::new(0.0, 100.0, 50), 0.0);
        assert_eq!(again, StartOutcome::Ignored(GestureIgnored::RefreshInFlight));
        assert!(matches!(
            h.controller.on_interaction_move(PointerSample::new(0.0, 400.0, 60)),
            MoveOutcome::Ignored(_)
        ));
        assert!(matches!(h.controller.on_interaction_end(), Release::Ignored(_)));
        assert_eq!(h.calls(), 1);

        h.controller.finish(pending.wait().await);

        // Once idle again a new gesture may refresh.
        assert!(matches!(h.pull(200.0), Release::Refreshing(_)));
        assert_eq!(h.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_still_returns_to_idle() {
        let mut h = Harness::new(Err(RefreshFailed::new("offline")));
        let Release::Refreshing(pending) = h.pull(200.0) else {
            panic!("expected a refresh");
        };

        let outcome = h.controller.finish(pending.wait().await);
        assert_eq!(
            outcome,
            Some(RefreshOutcome::Failed(RefreshFailed::new("offline")))
        );
        assert_eq!(h.controller.phase(), RefreshPhase::Idle);
        assert_close(h.controller.damped_distance(), 0.0);
        assert!(h.drain().contains(&RefreshEvent::Finished(RefreshOutcome::Failed(
            RefreshFailed::new("offline")
        ))));
    }

    #[test]
    fn test_committing_reported_before_start() {
        let mut h = Harness::ok();
        let _pending = h.pull(200.0);

        let phases: Vec<_> = h
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                RefreshEvent::Progress { phase, .. } => Some(phase),
                RefreshEvent::Started => Some(RefreshPhase::Refreshing),
                RefreshEvent::Finished(_) => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                RefreshPhase::Tracking,
                RefreshPhase::Committing,
                RefreshPhase::Refreshing,
                RefreshPhase::Refreshing,
            ]
        );
    }

    #[test]
    fn test_teardown_mid_session_never_refreshes() {
        let mut h = Harness::ok();
        h.controller
            .on_interaction_start(PointerSample::new(0.0, 100.0, 0), 0.0);
        h.controller
            .on_interaction_move(PointerSample::new(0.0, 400.0, 16));

        h.controller.teardown();
        assert!(h.controller.session().is_none());
        assert!(matches!(h.controller.on_interaction_end(), Release::Ignored(_)));
        assert_eq!(
            h.controller
                .on_interaction_start(PointerSample::new(0.0, 100.0, 32), 0.0),
            StartOutcome::Ignored(GestureIgnored::Detached)
        );
        assert_eq!(h.calls(), 0);
    }

    #[tokio::test]
    async fn test_teardown_discards_outstanding_completion() {
        let mut h = Harness::ok();
        let Release::Refreshing(pending) = h.pull(200.0) else {
            panic!("expected a refresh");
        };
        h.controller.teardown();
        h.drain();

        assert_eq!(h.controller.finish(pending.wait().await), None);
        assert!(h.drain().is_empty(), "no end callback after teardown");
    }

    #[test]
    fn test_abandoned_refresh_frees_controller() {
        let mut h = Harness::ok();
        let Release::Refreshing(pending) = h.pull(200.0) else {
            panic!("expected a refresh");
        };
        let ticket = pending.ticket();
        drop(pending);
        h.drain();

        assert!(h.controller.abandon(ticket));
        assert!(!h.controller.abandon(ticket));
        assert_eq!(h.controller.phase(), RefreshPhase::Idle);
        assert!(!h.drain().iter().any(|e| matches!(e, RefreshEvent::Finished(_))));

        assert!(matches!(h.pull(200.0), Release::Refreshing(_)));
        assert_eq!(h.calls(), 2);
    }

    #[tokio::test]
    async fn test_abandon_ignores_other_tickets() {
        let mut h = Harness::ok();
        let Release::Refreshing(first) = h.pull(200.0) else {
            panic!("expected a refresh");
        };
        let stale = first.ticket();
        h.controller.finish(first.wait().await);

        let Release::Refreshing(second) = h.pull(200.0) else {
            panic!("expected a refresh");
        };
        assert!(!h.controller.abandon(stale));
        assert!(h.controller.is_refreshing());
        assert_eq!(
            h.controller.finish(second.wait().await),
            Some(RefreshOutcome::Completed)
        );
    }

    #[test]
    fn test_non_finite_offset_never_tracks() {
        let mut h = Harness::ok();
        for offset in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let start = h
                .controller
                .on_interaction_start(PointerSample::new(0.0, 100.0, 0), offset);
            assert!(matches!(
                start,
                StartOutcome::Ignored(GestureIgnored::NotAtTop { .. })
            ));
            assert!(h.controller.session().is_none());
            assert!(matches!(
                h.controller.on_interaction_end(),
                Release::Ignored(GestureIgnored::NoSession)
            ));
        }
        assert_eq!(h.calls(), 0);
    }

    #[test]
    fn test_indicator_offset_is_clamped() {
        let mut h = Harness::ok();
        h.controller
            .on_interaction_start(PointerSample::new(0.0, 0.0, 0), 0.0);

        h.controller.on_interaction_move(PointerSample::new(0.0, 100.0, 16));
        assert_close(h.controller.indicator_offset(), 25.0);

        h.controller.on_interaction_move(PointerSample::new(0.0, 1000.0, 32));
        assert_close(h.controller.indicator_offset(), 60.0);
        assert_eq!(h.controller.session().unwrap().duration_ms(), 32);
    }

    #[tokio::test]
    async fn test_refresh_toasts() {
        let (toast_tx, mut toasts) = mpsc::unbounded_channel::<Notification>();
        let operation = || async { Ok::<(), RefreshFailed>(()) };
        let mut controller = RefreshController::new(RefreshConfig::default(), Arc::new(operation))
            .with_notifier(toast_tx);

        controller.on_interaction_start(PointerSample::new(0.0, 0.0, 0), 0.0);
        controller.on_interaction_move(PointerSample::new(0.0, 300.0, 16));
        let Release::Refreshing(pending) = controller.on_interaction_end() else {
            panic!("expected a refresh");
        };
        controller.finish(pending.wait().await);

        let toast: Notification = toasts.try_recv().unwrap();
        assert_eq!(toast.level, ToastLevel::Success);
        assert_eq!(toast.message, "Feed refreshed!");
    }
}
