use http::header::HOST;
use http::{HeaderMap, HeaderValue};

use crate::codec;
use crate::context::{SegmentContext, PROPAGATION_HEADER_KEY};

/// Address reported while a span has not learned a real peer or upstream.
const UNKNOWN_ADDRESS: &str = "0.0.0.0";

/// One timed unit of work within a segment.
///
/// Created and owned by a [`SegmentContext`]; the parent is referenced by span
/// id rather than by pointer, so accessors that need live segment state take
/// the owning segment as an argument.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SpanStore {
    span_id: i32,
    parent_span_id: i32,
    start_time: i64,
    end_time: i64,
    operation: String,
    peer_address: String,
    upstream_address: String,
    is_entry_span: bool,
    is_error: bool,
}

impl SpanStore {
    pub(crate) fn new(span_id: i32, parent_span_id: i32, start_time: i64) -> Self {
        Self {
            span_id,
            parent_span_id,
            start_time,
            end_time: 0,
            operation: String::new(),
            peer_address: UNKNOWN_ADDRESS.to_string(),
            upstream_address: UNKNOWN_ADDRESS.to_string(),
            is_entry_span: true,
            is_error: false,
        }
    }

    /// This span's id within its segment.
    pub fn span_id(&self) -> i32 {
        self.span_id
    }

    /// Span id of the parent span, or -1 for a root span.
    pub fn parent_span_id(&self) -> i32 {
        self.parent_span_id
    }

    /// Re-parents the span.
    pub fn set_parent_span_id(&mut self, parent_span_id: i32) {
        self.parent_span_id = parent_span_id;
    }

    /// Start of the span, in epoch milliseconds.
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// Sets the start of the span, in epoch milliseconds.
    pub fn set_start_time(&mut self, start_time: i64) {
        self.start_time = start_time;
    }

    /// End of the span, in epoch milliseconds; 0 until set or finished.
    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    /// Sets the end of the span, in epoch milliseconds.
    ///
    /// [`finish`](Self::finish) overwrites this value.
    pub fn set_end_time(&mut self, end_time: i64) {
        self.end_time = end_time;
    }

    /// Operation name recorded for this span.
    ///
    /// While no explicit name is set this resolves to the owning segment's
    /// current endpoint, so a later endpoint change is reflected here.
    pub fn operation<'a>(&'a self, segment: &'a SegmentContext) -> &'a str {
        if self.operation.is_empty() {
            segment.endpoint()
        } else {
            &self.operation
        }
    }

    /// Sets the operation name; an empty name re-enables the endpoint
    /// fallback.
    pub fn set_operation(&mut self, operation: impl Into<String>) {
        self.operation = operation.into();
    }

    /// Address of the peer this span talked to.
    pub fn peer_address(&self) -> &str {
        &self.peer_address
    }

    /// Sets the address of the peer this span talked to.
    pub fn set_peer_address(&mut self, peer_address: impl Into<String>) {
        self.peer_address = peer_address.into();
    }

    /// Upstream address advertised as the target of downstream calls.
    pub fn upstream_address(&self) -> &str {
        &self.upstream_address
    }

    /// Sets the upstream address advertised as the target of downstream
    /// calls.
    pub fn set_upstream_address(&mut self, upstream_address: impl Into<String>) {
        self.upstream_address = upstream_address.into();
    }

    /// Whether this span is the inbound, server-side span of the request.
    pub fn is_entry_span(&self) -> bool {
        self.is_entry_span
    }

    /// Marks this span as an entry span (or not).
    pub fn set_as_entry_span(&mut self, is_entry_span: bool) {
        self.is_entry_span = is_entry_span;
    }

    /// Whether the unit of work failed.
    pub fn is_error(&self) -> bool {
        self.is_error
    }

    /// Marks the unit of work as failed (or not).
    pub fn set_as_error(&mut self, is_error: bool) {
        self.is_error = is_error;
    }

    /// Marks the span as finished at `now`.
    ///
    /// The end time is stamped unconditionally; a manually set end time is
    /// overwritten. Mutating a span after finishing it is a caller error that
    /// is not guarded against.
    pub fn finish(&mut self, now: i64) {
        self.end_time = now;
    }

    /// Writes the `sw8` propagation header for a downstream call made under
    /// this span.
    ///
    /// This span's id becomes the parent span id seen by the callee. The
    /// target address is the recorded upstream address or, when that is
    /// empty, the outbound request's `Host` header. Repeated calls overwrite
    /// the header rather than appending.
    pub fn inject_context(&self, segment: &SegmentContext, headers: &mut HeaderMap) {
        let target_address = if self.upstream_address.is_empty() {
            headers
                .get(HOST)
                .and_then(|host| host.to_str().ok())
                .unwrap_or_default()
                .to_owned()
        } else {
            self.upstream_address.clone()
        };

        let value = format!(
            "{}-{}-{}-{}-{}-{}-{}-{}",
            u8::from(segment.sampled()),
            codec::encode(segment.trace_id()),
            codec::encode(segment.trace_segment_id()),
            self.span_id,
            codec::encode(segment.service()),
            codec::encode(segment.service_instance()),
            codec::encode(segment.endpoint()),
            codec::encode(&target_address),
        );

        let value = HeaderValue::from_str(&value).expect("encoded header value is ASCII");
        headers.insert(PROPAGATION_HEADER_KEY, value);
    }
}
