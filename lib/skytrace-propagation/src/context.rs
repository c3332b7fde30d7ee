use http::HeaderMap;
use snafu::OptionExt as _;

use crate::codec;
use crate::error::{InvalidSamplingFlag, InvalidSpanId, MalformedHeader, PropagationError};
use crate::id::{generate_id, RandomGenerator};
use crate::span::SpanStore;

/// Header key carrying the encoded span context between caller and callee.
pub const PROPAGATION_HEADER_KEY: &str = "sw8";

const HEADER_FIELD_COUNT: usize = 8;

/// Indices of the base64-encoded header fields that must be non-empty.
const REQUIRED_FIELDS: [usize; 6] = [1, 2, 4, 5, 6, 7];

/// Caller-supplied sampling decision for requests that originate a trace.
///
/// Only consulted when no upstream span context exists; an inbound sampling
/// flag always wins over the local decision.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDecision {
    /// Whether the request should be traced.
    pub traced: bool,
}

/// Span context parsed from an inbound `sw8` propagation header.
///
/// Built once by [`SpanContext::from_request_headers`] and then absorbed by
/// the [`SegmentContext`] continuing the trace; never mutated afterwards.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SpanContext {
    sampled: bool,
    trace_id: String,
    trace_segment_id: String,
    span_id: i32,
    service: String,
    service_instance: String,
    endpoint: String,
    target_address: String,
}

impl SpanContext {
    /// Parses the `sw8` propagation header from inbound request headers.
    ///
    /// An absent header is not an error: it means the request originates a new
    /// trace, and `Ok(None)` is returned. A present but invalid header fails
    /// with the [`PropagationError`] variant matching the first violated rule:
    /// field count and required-field emptiness are checked before the
    /// sampling flag, the sampling flag before the span id, and the span id
    /// before any base64 decoding.
    pub fn from_request_headers(headers: &HeaderMap) -> Result<Option<Self>, PropagationError> {
        let value = match headers.get(PROPAGATION_HEADER_KEY) {
            Some(value) => value,
            None => return Ok(None),
        };

        let raw = value.to_str().ok().with_context(|| MalformedHeader {
            header: String::from_utf8_lossy(value.as_bytes()).into_owned(),
        })?;

        let fields = raw.split('-').collect::<Vec<_>>();
        let well_formed = fields.len() == HEADER_FIELD_COUNT
            && REQUIRED_FIELDS.iter().all(|idx| !fields[*idx].is_empty());
        snafu::ensure!(well_formed, MalformedHeader { header: raw });

        let sampled = match fields[0] {
            "0" => false,
            "1" => true,
            flag => return InvalidSamplingFlag { flag }.fail(),
        };

        let span_id = fields[3]
            .parse::<i32>()
            .ok()
            .context(InvalidSpanId { span_id: fields[3] })?;

        Ok(Some(SpanContext {
            sampled,
            trace_id: codec::decode(fields[1])?,
            trace_segment_id: codec::decode(fields[2])?,
            span_id,
            service: codec::decode(fields[4])?,
            service_instance: codec::decode(fields[5])?,
            endpoint: codec::decode(fields[6])?,
            target_address: codec::decode(fields[7])?,
        }))
    }

    /// Upstream sampling flag.
    pub fn sampled(&self) -> bool {
        self.sampled
    }

    /// Trace id shared by every segment of the trace.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Segment id of the upstream caller's segment.
    pub fn trace_segment_id(&self) -> &str {
        &self.trace_segment_id
    }

    /// Span id of the upstream span that made the call.
    pub fn span_id(&self) -> i32 {
        self.span_id
    }

    /// Service name of the upstream caller.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Service instance name of the upstream caller.
    pub fn service_instance(&self) -> &str {
        &self.service_instance
    }

    /// Endpoint the upstream caller was serving.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Address the upstream caller targeted for this request.
    pub fn target_address(&self) -> &str {
        &self.target_address
    }
}

/// Per-request trace segment: identity, sampling decision, and the ordered
/// list of spans recorded within the request.
///
/// Spans are owned by the segment and reference their parent by span id (the
/// index into [`span_list`](Self::span_list)), never by pointer.
#[derive(Clone, Debug)]
pub struct SegmentContext {
    sampled: bool,
    trace_id: String,
    trace_segment_id: String,
    service: String,
    service_instance: String,
    endpoint: String,
    previous_span_context: Option<SpanContext>,
    span_list: Vec<SpanStore>,
}

impl SegmentContext {
    /// Creates the segment context for one traced request.
    ///
    /// When `previous` is present it is absorbed: the trace id and sampling
    /// flag are inherited from it, and `decision` is ignored. Without it the
    /// segment originates a new trace id and samples per `decision`. The trace
    /// segment id is freshly generated in both cases.
    ///
    /// Service, service instance, and endpoint start empty; the driver fills
    /// them in through the setters.
    pub fn new<R>(previous: Option<SpanContext>, decision: TracingDecision, rng: &mut R) -> Self
    where
        R: RandomGenerator + ?Sized,
    {
        let sampled = previous.as_ref().map_or(decision.traced, SpanContext::sampled);
        let trace_id = match previous.as_ref() {
            Some(previous) => previous.trace_id.clone(),
            None => generate_id(rng),
        };

        Self {
            sampled,
            trace_id,
            trace_segment_id: generate_id(rng),
            service: String::new(),
            service_instance: String::new(),
            endpoint: String::new(),
            previous_span_context: previous,
            span_list: Vec::new(),
        }
    }

    /// Whether this segment's spans are collected and shipped.
    pub fn sampled(&self) -> bool {
        self.sampled
    }

    /// Trace id shared by every segment of the trace.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// This segment's own id, always freshly generated.
    pub fn trace_segment_id(&self) -> &str {
        &self.trace_segment_id
    }

    /// Service name reported for this segment.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Sets the service name reported for this segment.
    pub fn set_service(&mut self, service: impl Into<String>) {
        self.service = service.into();
    }

    /// Service instance name reported for this segment.
    pub fn service_instance(&self) -> &str {
        &self.service_instance
    }

    /// Sets the service instance name reported for this segment.
    pub fn set_service_instance(&mut self, service_instance: impl Into<String>) {
        self.service_instance = service_instance.into();
    }

    /// Endpoint served by the request this segment records.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sets the endpoint served by the request this segment records.
    pub fn set_endpoint(&mut self, endpoint: impl Into<String>) {
        self.endpoint = endpoint.into();
    }

    /// The absorbed upstream span context, when the request continued a trace.
    pub fn previous_span_context(&self) -> Option<&SpanContext> {
        self.previous_span_context.as_ref()
    }

    /// Spans recorded within this segment, in creation order.
    pub fn span_list(&self) -> &[SpanStore] {
        &self.span_list
    }

    /// Appends a new span and returns it for further setup.
    ///
    /// Span ids are assigned from the list position: 0, 1, 2, ... in creation
    /// order, never reused. `parent_span_id` must name a span already present
    /// in this segment, or be `None` for a root span.
    pub fn create_span(&mut self, parent_span_id: Option<i32>, now: i64) -> &mut SpanStore {
        let span_id = self.span_list.len() as i32;
        let parent_span_id = parent_span_id.unwrap_or(-1);
        debug_assert!((-1..span_id).contains(&parent_span_id));

        let idx = self.span_list.len();
        self.span_list.push(SpanStore::new(span_id, parent_span_id, now));
        &mut self.span_list[idx]
    }

    /// Returns the span with the given id.
    pub fn span(&self, span_id: i32) -> Option<&SpanStore> {
        usize::try_from(span_id).ok().and_then(|idx| self.span_list.get(idx))
    }

    /// Returns the span with the given id for mutation.
    pub fn span_mut(&mut self, span_id: i32) -> Option<&mut SpanStore> {
        usize::try_from(span_id).ok().and_then(|idx| self.span_list.get_mut(idx))
    }
}
