use metrics::{counter, Counter};

/// Counter handles for the segment reporter, registered once at construction.
///
/// All counters live under the `tracing.skywalking.` prefix.
#[derive(Clone)]
pub(crate) struct ReporterTelemetry {
    segments_sent: Counter,
    segments_dropped: Counter,
    cache_flushed: Counter,
    segments_flushed: Counter,
}

impl ReporterTelemetry {
    pub fn new() -> Self {
        Self {
            segments_sent: counter!("tracing.skywalking.segments_sent"),
            segments_dropped: counter!("tracing.skywalking.segments_dropped"),
            cache_flushed: counter!("tracing.skywalking.cache_flushed"),
            segments_flushed: counter!("tracing.skywalking.segments_flushed"),
        }
    }

    /// Sampled, finished segments written to the collector stream.
    pub fn segments_sent(&self) -> &Counter {
        &self.segments_sent
    }

    /// Segments discarded because the delayed-segment cache was full.
    pub fn segments_dropped(&self) -> &Counter {
        &self.segments_dropped
    }

    /// Times the delayed-segment cache was flushed into a fresh stream.
    pub fn cache_flushed(&self) -> &Counter {
        &self.cache_flushed
    }

    /// Segments written to the collector stream from the cache.
    pub fn segments_flushed(&self) -> &Counter {
        &self.segments_flushed
    }
}
