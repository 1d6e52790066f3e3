//! The request consumption loop.
//!
//! ```text
//! Draining --work--> Dispatching --pass done--> Draining
//! Draining --empty or failed listing--> Idle --poll interval--> Draining
//! Idle --idle budget spent--> Stopped
//! ```
//!
//! The idle budget starts at `max_idle_polls` and shrinks by one per empty or
//! failed drain for the whole run; finding work does not restore it. Shutdown
//! is honoured between items and at every wait, never in the middle of a
//! dispatch.
mod dispatch;

#[cfg(test)]
mod tests;

use std::fmt;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::Config;
use crate::server::monitoring::ConsumerMetrics;
use crate::sink::WidgetSink;
use crate::source::RequestSource;

pub use dispatch::DispatchOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerPolicy {
    /// Empty drains, over the whole run, before the loop stops.
    pub max_idle_polls: u32,
    /// Wait after an empty drain, or after a pass where nothing could be applied.
    pub poll_interval: Duration,
    /// Keep rejected requests in the source instead of dropping them.
    pub retain_rejected: bool,
}

impl Default for ConsumerPolicy {
    fn default() -> Self {
        Self {
            max_idle_polls: 10,
            poll_interval: Duration::from_millis(500),
            retain_rejected: false,
        }
    }
}

impl ConsumerPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_idle_polls: config.max_idle_polls.max(1),
            poll_interval: config.poll_interval,
            retain_rejected: config.retain_rejected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Draining,
    Dispatching,
    Idle,
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Draining => "draining",
            Self::Dispatching => "dispatching",
            Self::Idle => "idle",
            Self::Stopped => "stopped",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The idle budget ran out with nothing pending.
    IdleExhausted,
    /// The shutdown token was cancelled.
    Shutdown,
}

/// Tally of one `run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub drains: u64,
    pub applied: u64,
    pub rejected: u64,
    pub deferred: u64,
    pub ack_failures: u64,
    pub source_errors: u64,
    pub idle_polls: u32,
    pub stop_reason: StopReason,
}

#[derive(Default)]
struct Tally {
    drains: u64,
    applied: u64,
    rejected: u64,
    deferred: u64,
    ack_failures: u64,
    source_errors: u64,
    idle_polls: u32,
}

impl Tally {
    /// Counts one outcome and reports whether it changed the source or sink.
    fn record(&mut self, outcome: &DispatchOutcome) -> bool {
        match outcome {
            DispatchOutcome::Applied { acknowledged, .. } => {
                self.applied += 1;
                if !acknowledged {
                    self.ack_failures += 1;
                }
                true
            }
            DispatchOutcome::Rejected { dropped, .. } => {
                self.rejected += 1;
                *dropped
            }
            DispatchOutcome::Deferred { .. } => {
                self.deferred += 1;
                false
            }
        }
    }

    fn finish(self, stop_reason: StopReason) -> RunSummary {
        RunSummary {
            drains: self.drains,
            applied: self.applied,
            rejected: self.rejected,
            deferred: self.deferred,
            ack_failures: self.ack_failures,
            source_errors: self.source_errors,
            idle_polls: self.idle_polls,
            stop_reason,
        }
    }
}

/// Drains a request source into a widget sink.
///
/// One instance is one logical worker; it holds no state shared with other
/// instances.
pub struct ConsumerLoop<S, K>
where
    S: RequestSource,
    K: WidgetSink,
{
    source: S,
    sink: K,
    policy: ConsumerPolicy,
    metrics: ConsumerMetrics,
}

impl<S, K> ConsumerLoop<S, K>
where
    S: RequestSource,
    K: WidgetSink,
{
    pub fn new(source: S, sink: K, policy: ConsumerPolicy) -> Self {
        Self {
            source,
            sink,
            policy,
            metrics: ConsumerMetrics::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: ConsumerMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn policy(&self) -> &ConsumerPolicy {
        &self.policy
    }

    /// Runs until the idle budget is spent or `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> RunSummary {
        let span = tracing::info_span!(
            "consumer",
            source = %self.source.describe(),
            backend = %self.sink.backend(),
        );
        self.run_inner(shutdown).instrument(span).await
    }

    async fn run_inner(&self, shutdown: CancellationToken) -> RunSummary {
        let mut tally = Tally::default();
        let mut idle_remaining = self.policy.max_idle_polls.max(1);
        let mut state = LoopState::Draining;

        tracing::info!(
            event = "consumer_started",
            max_idle_polls = self.policy.max_idle_polls,
            poll_interval_ms = self.policy.poll_interval.as_millis() as u64,
            "consumer started"
        );

        loop {
            let drained = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return self.stop(state, tally, StopReason::Shutdown),
                drained = self.source.list_pending() => drained,
            };
            tally.drains += 1;

            let items = match drained {
                Ok(items) => items,
                Err(err) => {
                    tally.source_errors += 1;
                    self.metrics.source_errors_total.inc();
                    tracing::error!(
                        event = "source_listing_failed",
                        error = %err,
                        "failed to list pending requests"
                    );
                    Vec::new()
                }
            };

            if items.is_empty() {
                state = self.transition(state, LoopState::Idle);
                idle_remaining = idle_remaining.saturating_sub(1);
                tally.idle_polls += 1;
                self.metrics.idle_polls_total.inc();
                tracing::info!(
                    event = "no_pending_requests",
                    idle_remaining,
                    "no requests to process"
                );

                if idle_remaining == 0 {
                    return self.stop(state, tally, StopReason::IdleExhausted);
                }
                if !self.wait(&shutdown).await {
                    return self.stop(state, tally, StopReason::Shutdown);
                }
                state = self.transition(state, LoopState::Draining);
                continue;
            }

            state = self.transition(state, LoopState::Dispatching);
            tracing::debug!(event = "pass_started", pending = items.len(), "dispatching pass");

            let mut progressed = false;
            for item in &items {
                if shutdown.is_cancelled() {
                    return self.stop(state, tally, StopReason::Shutdown);
                }
                let outcome = self.dispatch(item).await;
                progressed |= tally.record(&outcome);
            }

            state = self.transition(state, LoopState::Draining);
            // Everything left in place: pause so the same items are not retried
            // in a tight loop.
            if !progressed && !self.wait(&shutdown).await {
                return self.stop(state, tally, StopReason::Shutdown);
            }
        }
    }

    /// Sleeps one poll interval. Returns `false` if shutdown interrupted it.
    async fn wait(&self, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(self.policy.poll_interval) => true,
        }
    }

    fn transition(&self, from: LoopState, to: LoopState) -> LoopState {
        if from != to {
            tracing::debug!(event = "consumer_state_transition", %from, %to, "state transition");
        }
        to
    }

    fn stop(&self, state: LoopState, tally: Tally, reason: StopReason) -> RunSummary {
        self.transition(state, LoopState::Stopped);
        let summary = tally.finish(reason);
        tracing::info!(
            event = "consumer_stopped",
            reason = ?summary.stop_reason,
            drains = summary.drains,
            applied = summary.applied,
            rejected = summary.rejected,
            deferred = summary.deferred,
            ack_failures = summary.ack_failures,
            source_errors = summary.source_errors,
            idle_polls = summary.idle_polls,
            "finished processing requests"
        );
        summary
    }
}
