//! Outcome review loop.
//!
//! Each cycle lists decisions whose fixtures have concluded, fetches their
//! results with bounded concurrency and feeds confirmed verdicts to the
//! calibrator. A decision is only marked REVIEWED, and the weights only
//! adjusted, after a final score has been obtained.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use leo_db::{RecordStore, ResultSource, ResultStatus, SourceError, StoreError};
use leo_models::{FinalScore, LeoError, PredictionDecision, ReviewOutcome};
use leo_stream::{EngineEvent, EventBus};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::calibrator::ConfidenceCalibrator;
use crate::metrics::{EngineMetrics, REVIEW_CORRECT, REVIEW_DEFERRED, REVIEW_FAILED, REVIEW_INCORRECT};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Concurrent review tasks per cycle.
    pub batch_width: usize,
    /// Most recent awaiting decisions considered per cycle.
    pub lookback_limit: usize,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_jitter_ms: u64,
    /// Time after kickoff at which a fixture counts as concluded.
    pub match_duration_minutes: i64,
    pub interval_secs: u64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            batch_width: 5,
            lookback_limit: 50,
            max_attempts: 3,
            base_delay_ms: 500,
            max_jitter_ms: 250,
            match_duration_minutes: 120,
            interval_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub reviewed: usize,
    pub failed: usize,
    /// Fixtures whose result is not available yet.
    pub deferred: usize,
}

#[derive(Debug)]
enum TaskOutcome {
    Reviewed(bool),
    Deferred,
    Failed,
    AlreadyDone,
}

/// Delay before retry number `attempt + 1`: `base · 2^attempt` plus jitter.
pub fn backoff_delay(base_ms: u64, attempt: u32, max_jitter_ms: u64) -> Duration {
    let exponential = base_ms.saturating_mul(1u64 << attempt.min(16));
    let jitter = if max_jitter_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=max_jitter_ms)
    };
    Duration::from_millis(exponential.saturating_add(jitter))
}

async fn fetch_with_retry(
    source: &dyn ResultSource,
    fixture_id: &str,
    config: &ReviewConfig,
) -> Result<ResultStatus, SourceError> {
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match source.actual_result(fixture_id).await {
            Ok(status) => return Ok(status),
            // retrying cannot make an unknown fixture appear
            Err(e @ SourceError::UnknownFixture(_)) => return Err(e),
            Err(e) if attempt + 1 < attempts => {
                let delay = backoff_delay(config.base_delay_ms, attempt, config.max_jitter_ms);
                warn!(
                    fixture_id,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "result fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Shared handles a review task needs.
#[derive(Clone)]
struct ReviewContext {
    store: Arc<dyn RecordStore>,
    results: Arc<dyn ResultSource>,
    calibrator: Arc<ConfidenceCalibrator>,
    bus: EventBus,
    config: Arc<ReviewConfig>,
}

impl ReviewContext {
    async fn review(&self, decision: PredictionDecision) -> TaskOutcome {
        match fetch_with_retry(self.results.as_ref(), &decision.fixture_id, &self.config).await {
            Ok(ResultStatus::Final(score)) => self.finalize(&decision, score).await,
            Ok(ResultStatus::NotFinished) => {
                debug!(fixture_id = %decision.fixture_id, "result not available yet");
                TaskOutcome::Deferred
            }
            Err(e) => {
                warn!(
                    decision_id = %decision.id,
                    fixture_id = %decision.fixture_id,
                    error = %e,
                    "review failed after retries, left for next cycle"
                );
                TaskOutcome::Failed
            }
        }
    }

    async fn finalize(&self, decision: &PredictionDecision, score: FinalScore) -> TaskOutcome {
        let outcome = match ReviewOutcome::settle(decision, score) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(decision_id = %decision.id, error = %e, "decision cannot be settled");
                return TaskOutcome::Failed;
            }
        };

        match self.store.append_review_outcome(&outcome).await {
            // an earlier cycle stored the outcome but never completed the transition
            Ok(()) | Err(StoreError::AlreadyReviewed(_)) => {}
            Err(e) => {
                warn!(decision_id = %decision.id, error = %e, "could not store review outcome");
                return TaskOutcome::Failed;
            }
        }

        match self.store.mark_reviewed(decision.id).await {
            Ok(_) => {}
            Err(StoreError::Model(LeoError::InvalidTransition { .. })) => {
                debug!(decision_id = %decision.id, "decision reviewed elsewhere");
                return TaskOutcome::AlreadyDone;
            }
            Err(e) => {
                warn!(decision_id = %decision.id, error = %e, "could not mark decision reviewed");
                return TaskOutcome::Failed;
            }
        }

        let updated = self.calibrator.apply_outcome(&outcome);
        for weight in &updated {
            match self.store.save_weight(weight).await {
                Ok(true) => {}
                Ok(false) => debug!(key = %weight.key(), revision = weight.revision, "newer weight already stored"),
                // the in-memory weight stays authoritative; the next adjustment writes a newer revision
                Err(e) => warn!(key = %weight.key(), error = %e, "could not persist calibration weight"),
            }
        }

        info!(
            "📋 Reviewed {} ({}): {} -> {}",
            outcome.fixture_id,
            outcome.pick,
            outcome.final_score,
            if outcome.market_correct { "correct" } else { "incorrect" }
        );

        let correct = outcome.market_correct;
        self.bus.publish(EngineEvent::OutcomeReviewed { outcome });
        self.bus.publish(EngineEvent::WeightsUpdated { weights: updated });

        TaskOutcome::Reviewed(correct)
    }
}

pub struct OutcomeReviewLoop {
    context: ReviewContext,
    metrics: Arc<EngineMetrics>,
    gate: Arc<Semaphore>,
}

impl OutcomeReviewLoop {
    pub fn new(
        store: Arc<dyn RecordStore>,
        results: Arc<dyn ResultSource>,
        calibrator: Arc<ConfidenceCalibrator>,
        bus: EventBus,
        metrics: Arc<EngineMetrics>,
        config: ReviewConfig,
    ) -> Self {
        let gate = Arc::new(Semaphore::new(config.batch_width.max(1)));
        Self {
            context: ReviewContext {
                store,
                results,
                calibrator,
                bus,
                config: Arc::new(config),
            },
            metrics,
            gate,
        }
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.context.config
    }

    pub async fn run_review_cycle(&self) -> Result<ReviewSummary> {
        let config = &self.context.config;
        let cutoff = Utc::now() - chrono::Duration::minutes(config.match_duration_minutes);
        let pending = self
            .context
            .store
            .list_pending(cutoff, config.lookback_limit)
            .await?;

        let mut summary = ReviewSummary::default();
        if pending.is_empty() {
            debug!("no concluded decisions awaiting review");
            self.metrics.record_cycle();
            return Ok(summary);
        }

        info!("🔍 Reviewing {} concluded decisions", pending.len());

        let mut tasks = JoinSet::new();
        for decision in pending {
            let context = self.context.clone();
            let gate = Arc::clone(&self.gate);
            tasks.spawn(async move {
                let Ok(_permit) = gate.acquire_owned().await else {
                    return TaskOutcome::Failed;
                };
                context.review(decision).await
            });
        }

        let mut correct = 0u64;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(TaskOutcome::Reviewed(was_correct)) => {
                    summary.reviewed += 1;
                    if was_correct {
                        correct += 1;
                    }
                }
                Ok(TaskOutcome::Deferred) => summary.deferred += 1,
                Ok(TaskOutcome::Failed) => summary.failed += 1,
                Ok(TaskOutcome::AlreadyDone) => {}
                Err(e) => {
                    error!(error = %e, "review task panicked");
                    summary.failed += 1;
                }
            }
        }

        self.metrics.record_reviews(REVIEW_CORRECT, correct);
        self.metrics.record_reviews(REVIEW_INCORRECT, summary.reviewed as u64 - correct);
        self.metrics.record_reviews(REVIEW_FAILED, summary.failed as u64);
        self.metrics.record_reviews(REVIEW_DEFERRED, summary.deferred as u64);
        self.metrics.record_cycle();

        info!(
            "✅ Review cycle done: {} reviewed, {} failed, {} deferred",
            summary.reviewed, summary.failed, summary.deferred
        );
        Ok(summary)
    }

    /// Runs a cycle every `interval` until `cancel` fires. A failing cycle is
    /// logged and the next one runs on schedule.
    pub async fn run_forever(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Review loop stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_review_cycle().await {
                        error!(error = %e, "review cycle failed");
                    }
                }
            }
        }
    }
}
