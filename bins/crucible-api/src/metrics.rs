// Prometheus metrics for execution requests
use crucible_runner::Outcome;
use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Encoder, Histogram,
    IntCounterVec, IntGauge, TextEncoder,
};
use std::time::Duration;

lazy_static! {
    pub static ref RUNS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "crucible_runs_total",
        "Execution requests by outcome",
        &["outcome"]
    )
    .expect("crucible_runs_total can be registered");
    pub static ref RUN_DURATION: Histogram = register_histogram!(
        "crucible_run_duration_seconds",
        "Wall-clock time per execution request, compile included",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 10.0, 30.0]
    )
    .expect("crucible_run_duration_seconds can be registered");
    pub static ref RUNS_IN_FLIGHT: IntGauge = register_int_gauge!(
        "crucible_runs_in_flight",
        "Execution requests currently holding a concurrency permit"
    )
    .expect("crucible_runs_in_flight can be registered");
}

pub fn record_run(outcome: Outcome, elapsed: Duration) {
    RUNS_TOTAL.with_label_values(&[outcome.as_str()]).inc();
    RUN_DURATION.observe(elapsed.as_secs_f64());
}

/// Keeps `crucible_runs_in_flight` accurate even if the request is dropped
pub struct InFlight;

impl InFlight {
    pub fn enter() -> Self {
        RUNS_IN_FLIGHT.inc();
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        RUNS_IN_FLIGHT.dec();
    }
}

/// Text exposition of every registered metric
pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_run_counts_by_outcome() {
        let before = RUNS_TOTAL.with_label_values(&["timeout"]).get();
        record_run(Outcome::Timeout, Duration::from_millis(2100));
        assert_eq!(RUNS_TOTAL.with_label_values(&["timeout"]).get(), before + 1);

        let text = render().unwrap();
        assert!(text.contains("crucible_runs_total"));
        assert!(text.contains("crucible_run_duration_seconds"));
    }

    #[test]
    fn test_in_flight_guard() {
        let before = RUNS_IN_FLIGHT.get();
        {
            let _guard = InFlight::enter();
            assert!(RUNS_IN_FLIGHT.get() >= before + 1);
        }
        // Other tests may run concurrently, so only check the guard released its own count
        assert!(RUNS_IN_FLIGHT.get() <= before + 1);
    }
}
