use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::KeyValue;

pub trait Metrics {
    fn register() -> Self;
}

macro_rules! register_metric {
    ($name:ident, $type:ty) => {
        pub static $name: Lazy<$type> = Lazy::new(|| <$type>::register());
    };
}

fn register_counter_metric_instrument(
    meter: &Meter,
    name: &'static str,
    desc: &'static str,
    unit: &'static str,
) -> Counter<u64> {
    meter.u64_counter(name).with_description(desc).with_unit(unit).init()
}

fn register_gauge_metric_instrument(
    meter: &Meter,
    name: &'static str,
    desc: &'static str,
    unit: &'static str,
) -> Gauge<u64> {
    meter.u64_gauge(name).with_description(desc).with_unit(unit).init()
}

fn register_histogram_metric_instrument(
    meter: &Meter,
    name: &'static str,
    desc: &'static str,
    unit: &'static str,
) -> Histogram<f64> {
    meter.f64_histogram(name).with_description(desc).with_unit(unit).init()
}

register_metric!(ANCHOR_METRICS, AnchorMetrics);

/// Anchoring metrics exported to OTEL. Recording is a no-op until the host installs a meter provider.
pub struct AnchorMetrics {
    pub commits_total: Counter<u64>,
    pub skipped_polls_total: Counter<u64>,
    pub failures_total: Counter<u64>,
    pub last_committed_height: Gauge<u64>,
    pub commit_duration_seconds: Histogram<f64>,
}

impl Metrics for AnchorMetrics {
    fn register() -> Self {
        let meter = global::meter("crates.anchor.opentelemetry");

        Self {
            commits_total: register_counter_metric_instrument(
                &meter,
                "anchor_commits_total",
                "Number of state roots anchored on the destination chain",
                "commits",
            ),
            skipped_polls_total: register_counter_metric_instrument(
                &meter,
                "anchor_skipped_polls_total",
                "Number of polls where the committable block was already anchored or not yet available",
                "polls",
            ),
            failures_total: register_counter_metric_instrument(
                &meter,
                "anchor_failures_total",
                "Number of anchoring runs that ended in an error",
                "runs",
            ),
            last_committed_height: register_gauge_metric_instrument(
                &meter,
                "anchor_last_committed_height",
                "Height of the last source block anchored by this process",
                "block",
            ),
            commit_duration_seconds: register_histogram_metric_instrument(
                &meter,
                "anchor_commit_duration_seconds",
                "Time from submission to confirmed receipt",
                "s",
            ),
        }
    }
}

impl AnchorMetrics {
    pub fn record_commit(&self, height: u64, duration_s: f64) {
        self.commits_total.add(1, &[]);
        self.last_committed_height.record(height, &[]);
        self.commit_duration_seconds.record(duration_s, &[]);
    }

    pub fn record_skip(&self) {
        self.skipped_polls_total.add(1, &[]);
    }

    pub fn record_failure(&self, error_kind: &'static str) {
        self.failures_total.add(1, &[KeyValue::new("error_kind", error_kind)]);
    }
}
