use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter, MeterProvider, UpDownCounter},
    KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;

/// Histogram buckets for inference latency, in milliseconds. Fine-grained
/// where a typical CPU pass lands, coarse for the slow tail.
const LATENCY_SEGMENTS: [(u64, u64, u64); 3] = [(10, 100, 10), (100, 500, 50), (500, 3000, 500)];

pub struct Metrics {
    requests: Counter<u64>,
    inference_latency: Histogram<u64>,
    frames_skipped: Counter<u64>,
    active_sessions: UpDownCounter<i64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter("microscope_server");
        global::set_meter_provider(provider);

        Ok(Self::with_meter(&meter, registry))
    }

    fn with_meter(meter: &Meter, registry: Registry) -> Self {
        Metrics {
            requests: meter
                .u64_counter("requests_total")
                .with_description("Requests handled, by route")
                .build(),
            inference_latency: meter
                .u64_histogram("prediction_duration_ms")
                .with_boundaries(latency_boundaries(&LATENCY_SEGMENTS))
                .with_description("Detect and render time per image in milliseconds")
                .build(),
            frames_skipped: meter
                .u64_counter("frames_skipped_total")
                .with_description("Streamed frames dropped without a response")
                .build(),
            active_sessions: meter
                .i64_up_down_counter("active_sessions")
                .with_description("Open streaming sessions")
                .build(),
            registry,
        }
    }

    pub fn record_request(&self, route: &'static str) {
        self.requests.add(1, &[KeyValue::new("route", route)]);
    }

    pub fn record_prediction_duration(&self, duration_ms: u64, route: &'static str) {
        self.inference_latency
            .record(duration_ms, &[KeyValue::new("route", route)]);
    }

    pub fn record_frame_skipped(&self, reason: &'static str) {
        self.frames_skipped.add(1, &[KeyValue::new("reason", reason)]);
    }

    pub fn session_opened(&self) {
        self.active_sessions.add(1, &[]);
    }

    pub fn session_closed(&self) {
        self.active_sessions.add(-1, &[]);
    }
}

/// Expands `(start, end, step)` segments into sorted, deduplicated bucket
/// boundaries. Each segment includes both of its ends.
fn latency_boundaries(segments: &[(u64, u64, u64)]) -> Vec<f64> {
    let mut boundaries: Vec<u64> = segments
        .iter()
        .flat_map(|&(start, end, step)| (start..=end).step_by(step.max(1) as usize))
        .collect();
    boundaries.sort_unstable();
    boundaries.dedup();
    boundaries.into_iter().map(|bound| bound as f64).collect()
}
