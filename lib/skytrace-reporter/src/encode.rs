use skytrace_propagation::SegmentContext;
use skywalking_protos::skywalking::v3::{
    RefType, SegmentObject, SegmentReference, SpanLayer, SpanObject, SpanType,
};

/// Component id assigned to proxies in the SkyWalking component registry.
const PROXY_COMPONENT_ID: i32 = 9000;

/// Renders a finished segment into the collector's wire representation.
///
/// The absorbed previous span context, when present, becomes a cross-process
/// segment reference on the segment's entry spans, linking this segment back
/// to the caller's.
pub fn encode_segment(segment: &SegmentContext) -> SegmentObject {
    let reference = segment.previous_span_context().map(|previous| SegmentReference {
        ref_type: RefType::CrossProcess as i32,
        trace_id: previous.trace_id().to_string(),
        parent_trace_segment_id: previous.trace_segment_id().to_string(),
        parent_span_id: previous.span_id(),
        parent_service: previous.service().to_string(),
        parent_service_instance: previous.service_instance().to_string(),
        parent_endpoint: previous.endpoint().to_string(),
        network_address_used_at_peer: previous.target_address().to_string(),
    });

    let spans = segment
        .span_list()
        .iter()
        .map(|span| {
            let span_type = if span.is_entry_span() {
                SpanType::Entry
            } else {
                SpanType::Exit
            };
            let refs = match (&reference, span.is_entry_span()) {
                (Some(reference), true) => vec![reference.clone()],
                _ => Vec::new(),
            };

            SpanObject {
                span_id: span.span_id(),
                parent_span_id: span.parent_span_id(),
                start_time: span.start_time(),
                end_time: span.end_time(),
                refs,
                operation_name: span.operation(segment).to_string(),
                peer: span.peer_address().to_string(),
                span_type: span_type as i32,
                span_layer: SpanLayer::Http as i32,
                component_id: PROXY_COMPONENT_ID,
                is_error: span.is_error(),
                tags: Vec::new(),
                logs: Vec::new(),
                skip_analysis: false,
            }
        })
        .collect();

    SegmentObject {
        trace_id: segment.trace_id().to_string(),
        trace_segment_id: segment.trace_segment_id().to_string(),
        spans,
        service: segment.service().to_string(),
        service_instance: segment.service_instance().to_string(),
        is_size_limited: false,
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, HeaderValue};
    use skytrace_propagation::{
        SpanContext, ThreadRandomGenerator, TracingDecision, PROPAGATION_HEADER_KEY,
    };

    use super::*;

    fn b64(value: &str) -> String {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine as _;
        STANDARD.encode(value)
    }

    fn continuing_segment() -> SegmentContext {
        let value = format!(
            "1-{}-{}-7-{}-{}-{}-{}",
            b64("deadbeefdeadbeefdeadbeefdeadbeef"),
            b64("cafebabecafebabecafebabecafebabe"),
            b64("UPSTREAM#SERVICE"),
            b64("UPSTREAM#INSTANCE"),
            b64("/upstream/endpoint"),
            b64("10.0.0.1:8080"),
        );
        let mut headers = HeaderMap::new();
        headers.insert(PROPAGATION_HEADER_KEY, HeaderValue::from_str(&value).unwrap());
        let previous = SpanContext::from_request_headers(&headers).unwrap().unwrap();

        let mut segment = SegmentContext::new(
            Some(previous),
            TracingDecision { traced: true },
            &mut ThreadRandomGenerator,
        );
        segment.set_service("CURR#SERVICE");
        segment.set_service_instance("CURR#INSTANCE");
        segment.set_endpoint("/GET/path");
        segment
    }

    #[test]
    fn encodes_segment_identity() {
        let mut segment = continuing_segment();
        segment.create_span(None, 100).finish(200);

        let encoded = encode_segment(&segment);

        assert_eq!(encoded.trace_id, "deadbeefdeadbeefdeadbeefdeadbeef");
        assert_eq!(encoded.trace_segment_id, segment.trace_segment_id());
        assert_eq!(encoded.service, "CURR#SERVICE");
        assert_eq!(encoded.service_instance, "CURR#INSTANCE");
        assert!(!encoded.is_size_limited);
        assert_eq!(encoded.spans.len(), 1);
    }

    #[test]
    fn entry_span_carries_cross_process_reference() {
        let mut segment = continuing_segment();
        let root_id = segment.create_span(None, 100).span_id();
        let exit = segment.create_span(Some(root_id), 150);
        exit.set_as_entry_span(false);
        exit.set_peer_address("10.1.1.1:9000");

        let encoded = encode_segment(&segment);

        let entry = &encoded.spans[0];
        assert_eq!(entry.span_type, SpanType::Entry as i32);
        assert_eq!(entry.refs.len(), 1);
        let reference = &entry.refs[0];
        assert_eq!(reference.ref_type, RefType::CrossProcess as i32);
        assert_eq!(reference.trace_id, "deadbeefdeadbeefdeadbeefdeadbeef");
        assert_eq!(reference.parent_trace_segment_id, "cafebabecafebabecafebabecafebabe");
        assert_eq!(reference.parent_span_id, 7);
        assert_eq!(reference.parent_service, "UPSTREAM#SERVICE");
        assert_eq!(reference.parent_service_instance, "UPSTREAM#INSTANCE");
        assert_eq!(reference.parent_endpoint, "/upstream/endpoint");
        assert_eq!(reference.network_address_used_at_peer, "10.0.0.1:8080");

        // Exit spans carry no reference; they point at the parent span instead.
        let exit = &encoded.spans[1];
        assert_eq!(exit.span_type, SpanType::Exit as i32);
        assert!(exit.refs.is_empty());
        assert_eq!(exit.parent_span_id, 0);
        assert_eq!(exit.peer, "10.1.1.1:9000");
    }

    #[test]
    fn originating_segment_has_no_references() {
        let mut segment = SegmentContext::new(
            None,
            TracingDecision { traced: true },
            &mut ThreadRandomGenerator,
        );
        segment.set_endpoint("/GET/path");
        segment.create_span(None, 100);

        let encoded = encode_segment(&segment);

        assert!(encoded.spans[0].refs.is_empty());
        // No explicit operation name was set, so the endpoint is reported.
        assert_eq!(encoded.spans[0].operation_name, "/GET/path");
        assert_eq!(encoded.spans[0].component_id, PROXY_COMPONENT_ID);
        assert_eq!(encoded.spans[0].span_layer, SpanLayer::Http as i32);
    }
}
