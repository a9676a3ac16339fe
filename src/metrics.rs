//! Counters for listing and load activity
//!
//! Recorded through the `metrics` facade; they are no-ops unless the
//! embedding host installs a recorder.

/// Record a listing that fell back to the default model list
pub fn record_listing_fallback(reason: &'static str) {
    metrics::counter!("lms_nodes_listing_fallbacks_total",
        "reason" => reason
    )
    .increment(1);
}

/// Record a load attempt for a model
pub fn record_load_attempt(model: &str) {
    metrics::counter!("lms_nodes_load_attempts_total",
        "model" => model.to_string()
    )
    .increment(1);
}

/// Record the final status of a load invocation
pub fn record_load_outcome(status: &'static str) {
    metrics::counter!("lms_nodes_load_outcomes_total",
        "status" => status
    )
    .increment(1);
}

/// Record how many `lms ps` polls verification took
pub fn record_verify_attempts(attempts: u32) {
    metrics::histogram!("lms_nodes_verify_attempts").record(attempts as f64);
}
