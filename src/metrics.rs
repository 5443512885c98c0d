//! Process-wide Prometheus counters

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntGauge, TextEncoder};

fn counter(name: &str, help: &str) -> IntCounter {
    let c = IntCounter::new(name, help).expect("static metric definition");
    // Already-registered only happens if two registries share a name; the
    // counter still works locally.
    let _ = prometheus::register(Box::new(c.clone()));
    c
}

pub static SAMPLING_TICKS: Lazy<IntCounter> =
    Lazy::new(|| counter("pointsim_sampling_ticks_total", "Sampling timer ticks"));

pub static SAMPLES_DELIVERED: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "pointsim_samples_delivered_total",
        "Values delivered to the notification sink",
    )
});

pub static SAMPLE_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "pointsim_sample_failures_total",
        "Per-point sampling failures swallowed by the scheduler",
    )
});

pub static GENERATE_REQUESTS: Lazy<IntCounter> =
    Lazy::new(|| counter("pointsim_generate_requests_total", "Values generated on demand"));

pub static HISTORY_APPENDS: Lazy<IntCounter> =
    Lazy::new(|| counter("pointsim_history_appends_total", "History entries appended"));

pub static HISTORY_PAGES: Lazy<IntCounter> =
    Lazy::new(|| counter("pointsim_history_pages_total", "History pages served"));

pub static MONITORED_POINTS: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new(
        "pointsim_monitored_points",
        "Distinct points in the sampling set",
    )
    .expect("static metric definition");
    let _ = prometheus::register(Box::new(g.clone()));
    g
});

/// Text exposition of every registered metric
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_touched_counters() {
        HISTORY_PAGES.inc();
        let text = render();
        assert!(text.contains("pointsim_history_pages_total"));
    }
}
