//! Import details polling until a terminal state.
//!
//! `ImportStatusSource` is the seam: `TimerStatusPoller` implements it with a
//! fixed-interval GET loop, and a push transport can replace it without
//! touching the orchestrator.
//!
//! Delivery rules:
//! - The callback is `FnOnce`, held in a [`DeliverySlot`] and taken on first use
//! - Nothing is delivered once the subscription is cancelled or dropped
//! - After a terminal state the loop exits; it never polls again

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::import::api::{redact_id, ImportServiceOps};
use crate::import::models::{ImportDetails, ImportErrorData, ImportOutcome};
use crate::import::StatePhase;

/// Message carried by the outcome when `max_poll_duration` elapses. Same as
/// the display text of `AppError::PollingTimeout`.
pub const POLLING_TIMED_OUT: &str = "polling timed out";

/// Completion callback of a status subscription.
pub type ImportCallback = Box<dyn FnOnce(ImportOutcome) + Send + 'static>;

// ─────────────────────────────────────────────────────────────────────────────
// Delivery
// ─────────────────────────────────────────────────────────────────────────────

/// Holds a completion callback until it is delivered or discarded.
pub struct DeliverySlot {
    callback: Mutex<Option<ImportCallback>>,
    cancel: CancellationToken,
}

impl DeliverySlot {
    pub fn new(callback: ImportCallback, cancel: CancellationToken) -> Self {
        Self {
            callback: Mutex::new(Some(callback)),
            cancel,
        }
    }

    /// Invokes the callback unless it already ran or the owner cancelled.
    /// Returns whether the outcome was delivered.
    ///
    /// The cancellation check and the take happen under the slot lock, so
    /// once `cancel` fires and [`Subscription::unsubscribe`] returns, the
    /// callback either was already taken or never runs. A callback taken
    /// just before cancellation may still be running on another thread.
    pub fn deliver(&self, outcome: ImportOutcome) -> bool {
        let callback = {
            let mut slot = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
            if self.cancel.is_cancelled() {
                return false;
            }
            slot.take()
        };
        match callback {
            Some(callback) => {
                callback(outcome);
                true
            }
            None => false,
        }
    }

    pub fn is_spent(&self) -> bool {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn discard(&self) {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscription
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to a running status subscription. Dropping it unsubscribes.
pub struct Subscription {
    cancel: CancellationToken,
    slot: Arc<DeliverySlot>,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Assembles a subscription for a custom `ImportStatusSource`.
    ///
    /// `slot` must have been created with `cancel`.
    pub fn from_parts(
        cancel: CancellationToken,
        slot: Arc<DeliverySlot>,
        handle: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            cancel,
            slot,
            handle,
        }
    }

    /// Stops polling and discards the callback without invoking it.
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
        self.slot.discard();
    }

    /// True until the outcome is delivered or the subscription is cancelled.
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.slot.is_spent()
    }

    /// Waits for the polling task to exit.
    pub async fn finished(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Source of import status updates for one import id.
pub trait ImportStatusSource: Send + Sync {
    /// Starts watching `import_id`. `on_update` runs at most once with the
    /// terminal outcome. Must be called within a tokio runtime.
    fn subscribe(&self, import_id: &str, on_update: ImportCallback) -> Subscription;
}

// ─────────────────────────────────────────────────────────────────────────────
// State Evaluation
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum PollDecision {
    Continue,
    Finish(ImportOutcome),
}

/// Maps one details snapshot to the poller's next step.
pub fn evaluate(details: &ImportDetails) -> PollDecision {
    match details.import_state.phase() {
        StatePhase::Pending => PollDecision::Continue,
        StatePhase::Succeeded => PollDecision::Finish(ImportOutcome::success(details)),
        StatePhase::Failed => PollDecision::Finish(ImportOutcome::import_failed(details)),
    }
}

/// Maps a failed poll request. Transient failures keep the loop alive.
fn evaluate_error(error: &AppError, file_name: &str) -> PollDecision {
    if error.is_transient() {
        return PollDecision::Continue;
    }
    PollDecision::Finish(ImportOutcome::error(ImportErrorData::request_failed(
        file_name,
        error.to_string(),
    )))
}

// ─────────────────────────────────────────────────────────────────────────────
// TimerStatusPoller
// ─────────────────────────────────────────────────────────────────────────────

/// Polls `GET buyer-orgs/{importId}` at a fixed interval.
#[derive(Clone)]
pub struct TimerStatusPoller<S> {
    service: S,
    interval: Duration,
    max_duration: Option<Duration>,
}

impl<S: ImportServiceOps + 'static> TimerStatusPoller<S> {
    /// `interval` must be non-zero.
    pub fn new(service: S, interval: Duration) -> Self {
        Self {
            service,
            interval,
            max_duration: None,
        }
    }

    /// Ends the session with a `RequestFailed` outcome once `limit` elapses.
    pub fn with_max_duration(mut self, limit: Option<Duration>) -> Self {
        self.max_duration = limit;
        self
    }
}

impl<S: ImportServiceOps + 'static> ImportStatusSource for TimerStatusPoller<S> {
    fn subscribe(&self, import_id: &str, on_update: ImportCallback) -> Subscription {
        let cancel = CancellationToken::new();
        let slot = Arc::new(DeliverySlot::new(on_update, cancel.clone()));

        let task = PollTask {
            service: self.service.clone(),
            import_id: import_id.to_string(),
            interval: self.interval,
            max_duration: self.max_duration,
            cancel: cancel.clone(),
            slot: slot.clone(),
        };
        let handle = tokio::spawn(task.run());

        Subscription::from_parts(cancel, slot, Some(handle))
    }
}

struct PollTask<S> {
    service: S,
    import_id: String,
    interval: Duration,
    max_duration: Option<Duration>,
    cancel: CancellationToken,
    slot: Arc<DeliverySlot>,
}

impl<S: ImportServiceOps> PollTask<S> {
    async fn run(self) {
        let started = Instant::now();
        // First request goes out one interval after subscribing.
        let mut ticker = tokio::time::interval_at(started + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let id = redact_id(&self.import_id);
        let mut file_name = String::new();
        let mut polls = 0u32;

        info!("[IMPORT-POLL] Watching import {}", id);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("[IMPORT-POLL] Import {} unsubscribed after {} polls", id, polls);
                    return;
                }
                _ = ticker.tick() => {}
            }

            if let Some(limit) = self.max_duration {
                if started.elapsed() >= limit {
                    warn!(
                        "[IMPORT-POLL] Import {} still pending after {}s, giving up",
                        id,
                        limit.as_secs()
                    );
                    let error = AppError::PollingTimeout {
                        import_id: self.import_id.clone(),
                    };
                    if let PollDecision::Finish(outcome) = evaluate_error(&error, &file_name) {
                        self.slot.deliver(outcome);
                    }
                    return;
                }
            }

            let result = tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("[IMPORT-POLL] Import {} unsubscribed mid-request", id);
                    return;
                }
                result = self.service.get_import_details(&self.import_id) => result,
            };
            polls += 1;

            let decision = match &result {
                Ok(details) => {
                    file_name.clone_from(&details.file_name);
                    debug!(
                        "[IMPORT-POLL] Import {} is {} ({}%)",
                        id,
                        details.import_state.as_str(),
                        details.clamped_percentage()
                    );
                    evaluate(details)
                }
                Err(e) => {
                    let decision = evaluate_error(e, &file_name);
                    if decision == PollDecision::Continue {
                        warn!("[IMPORT-POLL] Poll {} for import {} failed: {}", polls, id, e);
                    } else {
                        warn!("[IMPORT-POLL] Import {} polling stopped: {}", id, e);
                    }
                    decision
                }
            };

            if let PollDecision::Finish(outcome) = decision {
                let success = outcome.is_success();
                if self.slot.deliver(outcome) {
                    info!(
                        "[IMPORT-POLL] Import {} finished after {} polls (success: {})",
                        id, polls, success
                    );
                }
                return;
            }
        }
    }
}
