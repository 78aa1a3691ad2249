//! Prometheus metrics for processed units of work
//!
//! One outcome counter increment and one duration observation are recorded
//! per execution of the worker.

use prometheus::{CounterVec, Histogram, HistogramOpts, Opts, Registry};
use std::sync::OnceLock;

/// Outcome label values
pub mod labels {
    pub const UNMODIFIED: &str = "unmodified";
    pub const REPLACED: &str = "replaced";
    pub const FAILED: &str = "failed";
    pub const TIMEOUT: &str = "timeout_err";
    pub const EXCEPTION: &str = "exception_err";
    pub const ARCHIVE_FOUND: &str = "archive_found";
}

/// Global Prometheus registry for worker metrics
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Get or initialize the global registry
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        let r = Registry::new();
        register_metrics(&r);
        r
    })
}

/// Processed units of work by outcome
///
/// Labels: outcome (see [`labels`])
pub static OUTCOMES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Wall-clock time of one execution, deadline path included
///
/// Buckets: 100ms, 500ms, 1s, 5s, 10s, 30s, 1m, 5m
pub static PROCESSING_DURATION_SECONDS: OnceLock<Histogram> = OnceLock::new();

fn register_metrics(registry: &Registry) {
    match CounterVec::new(
        Opts::new(
            "cdr_processing_outcomes_total",
            "Total number of processed files by outcome",
        ),
        &["outcome"],
    ) {
        Ok(outcomes) => {
            if let Err(e) = registry.register(Box::new(outcomes.clone())) {
                tracing::warn!("Failed to register outcome counter: {}", e);
            }
            OUTCOMES_TOTAL.set(outcomes).ok();
        }
        Err(e) => tracing::warn!("Failed to create outcome counter: {}", e),
    }

    match Histogram::with_opts(
        HistogramOpts::new(
            "cdr_processing_duration_seconds",
            "Time taken to process one file",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
    ) {
        Ok(duration) => {
            if let Err(e) = registry.register(Box::new(duration.clone())) {
                tracing::warn!("Failed to register duration histogram: {}", e);
            }
            PROCESSING_DURATION_SECONDS.set(duration).ok();
        }
        Err(e) => tracing::warn!("Failed to create duration histogram: {}", e),
    }
}

/// Increment the outcome counter for `outcome`
pub fn inc_outcome(outcome: &str) {
    let _ = registry();
    if let Some(counter) = OUTCOMES_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Current value of the outcome counter for `outcome`
pub fn outcome_count(outcome: &str) -> f64 {
    let _ = registry();
    OUTCOMES_TOTAL
        .get()
        .map(|counter| counter.with_label_values(&[outcome]).get())
        .unwrap_or(0.0)
}

/// Record the duration of one execution
pub fn observe_processing_duration(duration_secs: f64) {
    let _ = registry();
    if let Some(histogram) = PROCESSING_DURATION_SECONDS.get() {
        histogram.observe(duration_secs);
    }
}

/// Get metrics in Prometheus text format
pub fn metrics_text() -> String {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
