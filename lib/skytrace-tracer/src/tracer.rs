use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use http::request::Parts;
use http::HeaderMap;
use skytrace_config::TracerConfiguration;
use skytrace_propagation::{
    RandomGenerator, SegmentContext, SpanContext, ThreadRandomGenerator, TracingDecision,
};
use skytrace_reporter::ReporterHandle;
use tracing::debug;

use crate::time::epoch_millis;

/// Transport collaborator interface: receives finished, sampled segments for
/// transmission to the collector.
pub trait SegmentSink {
    /// Receives a finished, sampled segment.
    fn report(&self, segment: &SegmentContext);
}

impl SegmentSink for ReporterHandle {
    fn report(&self, segment: &SegmentContext) {
        ReporterHandle::report(self, segment);
    }
}

/// The tracer driver: one per process, shared across workers.
pub struct Tracer {
    service_name: String,
    instance_name: String,
    pass_endpoint: bool,
    rng: Mutex<Box<dyn RandomGenerator + Send>>,
    sink: Arc<dyn SegmentSink + Send + Sync>,
}

impl Tracer {
    /// Builds a tracer from resolved configuration and a segment sink.
    pub fn new(config: &TracerConfiguration, sink: Arc<dyn SegmentSink + Send + Sync>) -> Self {
        Self::with_random_source(config, sink, Box::new(ThreadRandomGenerator))
    }

    /// Builds a tracer drawing identifiers from the given random source.
    pub fn with_random_source(
        config: &TracerConfiguration, sink: Arc<dyn SegmentSink + Send + Sync>,
        rng: Box<dyn RandomGenerator + Send>,
    ) -> Self {
        Self {
            service_name: config.service_name().to_string(),
            instance_name: config.instance_name().to_string(),
            pass_endpoint: config.pass_endpoint(),
            rng: Mutex::new(rng),
            sink,
        }
    }

    /// Starts the entry span for an inbound request.
    ///
    /// A present `sw8` header continues the upstream trace, and its sampling
    /// flag overrides `decision`. A malformed header never fails the request:
    /// it is logged and the request is traced as the root of a new trace.
    pub fn start_span(&self, parts: &Parts, now: SystemTime, decision: TracingDecision) -> Span {
        let previous = match SpanContext::from_request_headers(&parts.headers) {
            Ok(previous) => previous,
            Err(error) => {
                debug!(%error, "Failed to parse propagation header. Starting a new trace.");
                None
            }
        };

        let mut segment = {
            let mut rng = self.rng.lock().unwrap();
            SegmentContext::new(previous, decision, rng.as_mut())
        };
        segment.set_service(self.service_name.clone());
        segment.set_service_instance(self.instance_name.clone());

        // The upstream endpoint is reused only when configured to pass it and
        // the request actually continued a trace; otherwise the endpoint is
        // derived from the request line.
        let endpoint = match segment.previous_span_context() {
            Some(previous) if self.pass_endpoint => previous.endpoint().to_string(),
            _ => format!("/{}{}", parts.method, parts.uri.path()),
        };
        segment.set_endpoint(endpoint);

        let entry_span_id = segment.create_span(None, epoch_millis(now)).span_id();

        Span {
            segment,
            span_id: entry_span_id,
            sink: Arc::clone(&self.sink),
        }
    }
}

/// One in-flight traced request: the segment plus the entry span driving it.
///
/// Dropping a span without finishing it discards the segment; nothing is
/// reported for an aborted request.
pub struct Span {
    segment: SegmentContext,
    span_id: i32,
    sink: Arc<dyn SegmentSink + Send + Sync>,
}

impl Span {
    /// The segment recorded for this request.
    pub fn segment(&self) -> &SegmentContext {
        &self.segment
    }

    /// The segment, for direct mutation.
    pub fn segment_mut(&mut self) -> &mut SegmentContext {
        &mut self.segment
    }

    /// The entry span's id within the segment.
    pub fn span_id(&self) -> i32 {
        self.span_id
    }

    /// Sets the operation name of the entry span.
    pub fn set_operation(&mut self, operation: impl Into<String>) {
        if let Some(span) = self.segment.span_mut(self.span_id) {
            span.set_operation(operation);
        }
    }

    /// Flags the entry span as failed.
    pub fn set_as_error(&mut self, is_error: bool) {
        if let Some(span) = self.segment.span_mut(self.span_id) {
            span.set_as_error(is_error);
        }
    }

    /// Records the address of the downstream peer on the entry span.
    pub fn set_peer_address(&mut self, peer_address: impl Into<String>) {
        if let Some(span) = self.segment.span_mut(self.span_id) {
            span.set_peer_address(peer_address);
        }
    }

    /// Records the upstream address advertised to callees.
    pub fn set_upstream_address(&mut self, upstream_address: impl Into<String>) {
        if let Some(span) = self.segment.span_mut(self.span_id) {
            span.set_upstream_address(upstream_address);
        }
    }

    /// Starts an exit span for an outbound call made under the entry span,
    /// returning its id.
    pub fn start_exit_span(&mut self, operation: impl Into<String>, now: SystemTime) -> i32 {
        let parent_span_id = self.span_id;
        let span = self.segment.create_span(Some(parent_span_id), epoch_millis(now));
        span.set_as_entry_span(false);
        span.set_operation(operation);
        span.span_id()
    }

    /// Finishes an exit span.
    pub fn finish_exit_span(&mut self, span_id: i32, now: SystemTime) {
        if let Some(span) = self.segment.span_mut(span_id) {
            span.finish(epoch_millis(now));
        }
    }

    /// Writes the outbound `sw8` header for a downstream call made under the
    /// given span.
    pub fn inject_context(&self, span_id: i32, headers: &mut HeaderMap) {
        if let Some(span) = self.segment.span(span_id) {
            span.inject_context(&self.segment, headers);
        }
    }

    /// Finishes the entry span and hands the segment off for transmission.
    ///
    /// Unsampled segments are discarded without touching the sink.
    pub fn finish(mut self, now: SystemTime) {
        if let Some(span) = self.segment.span_mut(self.span_id) {
            span.finish(epoch_millis(now));
        }

        if self.segment.sampled() {
            self.sink.report(&self.segment);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::{HeaderValue, Request};
    use skytrace_propagation::PROPAGATION_HEADER_KEY;

    use super::*;

    const TEST_TOKEN_CONFIG: &str = r#"
        service_name: FAKE_FAKE_FAKE
        instance_name: FAKE_FAKE_FAKE
        authentication: FAKE_FAKE_FAKE_FAKE_FAKE_FAKE
        pass_endpoint: true
        max_cache_size: 2333
    "#;

    struct FixedRandomGenerator(u64);

    impl RandomGenerator for FixedRandomGenerator {
        fn random(&mut self) -> u64 {
            self.0
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        segments: Arc<Mutex<Vec<SegmentContext>>>,
    }

    impl RecordingSink {
        fn reported(&self) -> Vec<SegmentContext> {
            self.segments.lock().unwrap().clone()
        }
    }

    impl SegmentSink for RecordingSink {
        fn report(&self, segment: &SegmentContext) {
            self.segments.lock().unwrap().push(segment.clone());
        }
    }

    fn b64(value: &str) -> String {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine as _;
        STANDARD.encode(value)
    }

    fn previous_header(sampled: u8) -> String {
        format!(
            "{}-{}-{}-233333-{}-{}-{}-{}",
            sampled,
            b64("deadbeefdeadbeefdeadbeefdeadbeef"),
            b64("cafebabecafebabecafebabecafebabe"),
            b64("SERVICE"),
            b64("INSTANCE"),
            b64("ENDPOINT"),
            b64("ADDRESS"),
        )
    }

    fn request_parts(sw8: Option<&str>) -> Parts {
        let mut builder = Request::builder().method("GET").uri("http://test.com/path");
        if let Some(value) = sw8 {
            builder = builder.header(PROPAGATION_HEADER_KEY, value);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        parts
    }

    fn tracer_with_sink(yaml: &str, sink: &RecordingSink) -> Tracer {
        let config = TracerConfiguration::from_yaml_str(yaml).unwrap();
        Tracer::with_random_source(
            &config,
            Arc::new(sink.clone()),
            Box::new(FixedRandomGenerator(666666)),
        )
    }

    fn traced() -> TracingDecision {
        TracingDecision { traced: true }
    }

    #[test]
    fn continues_upstream_trace() {
        let sink = RecordingSink::default();
        let tracer = tracer_with_sink(TEST_TOKEN_CONFIG, &sink);

        let parts = request_parts(Some(&previous_header(0)));
        let span = tracer.start_span(&parts, SystemTime::now(), traced());

        let segment = span.segment();
        assert!(segment.previous_span_context().is_some());
        assert_eq!(segment.service(), "FAKE_FAKE_FAKE");
        assert_eq!(segment.service_instance(), "FAKE_FAKE_FAKE");
        assert_eq!(segment.trace_id(), "deadbeefdeadbeefdeadbeefdeadbeef");

        // With pass_endpoint set, the upstream endpoint is used directly.
        let upstream_endpoint = segment.previous_span_context().unwrap().endpoint().to_string();
        assert_eq!(segment.endpoint(), upstream_endpoint);

        // The inbound sampling flag overrides the local tracing decision, so
        // finishing this span reports nothing.
        assert!(!segment.sampled());
        span.finish(SystemTime::now());
        assert!(sink.reported().is_empty());
    }

    #[test]
    fn originates_trace_without_header() {
        let sink = RecordingSink::default();
        let tracer = tracer_with_sink(TEST_TOKEN_CONFIG, &sink);

        let parts = request_parts(None);
        let started = SystemTime::UNIX_EPOCH + Duration::from_millis(22222222);
        let finished = SystemTime::UNIX_EPOCH + Duration::from_millis(33333333);

        let span = tracer.start_span(&parts, started, traced());

        let segment = span.segment();
        assert!(segment.previous_span_context().is_none());
        // pass_endpoint only applies to requests that continued a trace.
        assert_eq!(segment.endpoint(), "/GET/path");
        assert!(segment.sampled());

        span.finish(finished);

        let reported = sink.reported();
        assert_eq!(reported.len(), 1);
        let entry = reported[0].span(0).unwrap();
        assert_eq!(entry.parent_span_id(), -1);
        assert_eq!(entry.start_time(), 22222222);
        assert_eq!(entry.end_time(), 33333333);
        assert!(entry.is_entry_span());
    }

    #[test]
    fn malformed_header_degrades_to_new_trace() {
        let sink = RecordingSink::default();
        let tracer = tracer_with_sink(TEST_TOKEN_CONFIG, &sink);

        let parts = request_parts(Some("xxxxxx-error-propagation-header"));
        let span = tracer.start_span(&parts, SystemTime::now(), traced());

        let segment = span.segment();
        assert!(segment.previous_span_context().is_none());
        assert_eq!(segment.endpoint(), "/GET/path");
        assert!(segment.sampled());

        span.finish(SystemTime::now());
        assert_eq!(sink.reported().len(), 1);
    }

    #[test]
    fn default_configuration_supplies_identity() {
        let sink = RecordingSink::default();
        let tracer = tracer_with_sink("{}", &sink);

        let parts = request_parts(None);
        let span = tracer.start_span(&parts, SystemTime::now(), traced());

        assert_eq!(span.segment().service(), "skytrace");
        assert_eq!(span.segment().service_instance(), "skytrace-instance");
        assert_eq!(span.segment().endpoint(), "/GET/path");
    }

    #[test]
    fn exit_spans_parent_under_the_entry_span() {
        let sink = RecordingSink::default();
        let tracer = tracer_with_sink(TEST_TOKEN_CONFIG, &sink);

        let parts = request_parts(None);
        let mut span = tracer.start_span(&parts, SystemTime::now(), traced());

        let exit_id = span.start_exit_span("/backend/call", SystemTime::now());
        assert_eq!(exit_id, 1);

        let mut outbound = HeaderMap::new();
        outbound.insert(http::header::HOST, HeaderValue::from_static("backend.test"));
        span.inject_context(exit_id, &mut outbound);

        let injected = outbound.get(PROPAGATION_HEADER_KEY).unwrap().to_str().unwrap();
        let fields = injected.split('-').collect::<Vec<_>>();
        assert_eq!(fields.len(), 8);
        assert_eq!(fields[0], "1");
        // The callee sees this exit span as its parent.
        assert_eq!(fields[3], "1");

        span.finish_exit_span(exit_id, SystemTime::now());
        span.finish(SystemTime::now());

        let reported = sink.reported();
        assert_eq!(reported.len(), 1);
        let exit = reported[0].span(exit_id).unwrap();
        assert!(!exit.is_entry_span());
        assert_eq!(exit.parent_span_id(), 0);
        assert_ne!(exit.end_time(), 0);
    }

    #[test]
    fn dropped_span_reports_nothing() {
        let sink = RecordingSink::default();
        let tracer = tracer_with_sink(TEST_TOKEN_CONFIG, &sink);

        let parts = request_parts(None);
        let span = tracer.start_span(&parts, SystemTime::now(), traced());
        drop(span);

        assert!(sink.reported().is_empty());
    }
}
