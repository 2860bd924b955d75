use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramTimer, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use leo_models::DecisionStatus;

pub const REVIEW_CORRECT: &str = "correct";
pub const REVIEW_INCORRECT: &str = "incorrect";
pub const REVIEW_FAILED: &str = "failed";
pub const REVIEW_DEFERRED: &str = "deferred";

/// Prometheus instruments for the prediction and review paths.
pub struct EngineMetrics {
    registry: Registry,
    decisions: IntCounterVec,
    reviews: IntCounterVec,
    review_cycles: IntCounter,
    prediction_latency: Histogram,
}

impl EngineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("leo".to_string()), None)?;

        let decisions = IntCounterVec::new(
            Opts::new("decisions_total", "Prediction decisions recorded, by status"),
            &["status"],
        )?;
        let reviews = IntCounterVec::new(
            Opts::new("reviews_total", "Review task results"),
            &["result"],
        )?;
        let review_cycles = IntCounter::new("review_cycles_total", "Completed review cycles")?;
        let prediction_latency = Histogram::with_opts(
            HistogramOpts::new("prediction_seconds", "Time spent producing one decision")
                .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1]),
        )?;

        registry.register(Box::new(decisions.clone()))?;
        registry.register(Box::new(reviews.clone()))?;
        registry.register(Box::new(review_cycles.clone()))?;
        registry.register(Box::new(prediction_latency.clone()))?;

        Ok(Self {
            registry,
            decisions,
            reviews,
            review_cycles,
            prediction_latency,
        })
    }

    pub fn record_decision(&self, status: DecisionStatus) {
        self.decisions.with_label_values(&[status.code()]).inc();
    }

    pub fn record_reviews(&self, result: &str, count: u64) {
        if count > 0 {
            self.reviews.with_label_values(&[result]).inc_by(count);
        }
    }

    pub fn record_cycle(&self) {
        self.review_cycles.inc();
    }

    pub fn start_prediction_timer(&self) -> HistogramTimer {
        self.prediction_latency.start_timer()
    }

    pub fn decisions_with_status(&self, status: DecisionStatus) -> u64 {
        self.decisions.with_label_values(&[status.code()]).get()
    }

    pub fn reviews_with_result(&self, result: &str) -> u64 {
        self.reviews.with_label_values(&[result]).get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition format for `GET /metrics`.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
