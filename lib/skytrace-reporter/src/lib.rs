//! Segment transport for the SkyWalking tracer.
//!
//! Receives finished, sampled segments from the tracer, renders them into the
//! collector's wire representation, and ships them over the client-streaming
//! `TraceSegmentReportService/collect` RPC. Segments that arrive while the
//! stream is down are buffered in a bounded delayed-segment cache and flushed
//! once a stream is available again.

mod encode;
mod reporter;
mod telemetry;

pub use self::encode::encode_segment;
pub use self::reporter::{ReporterHandle, TraceSegmentReporter};
