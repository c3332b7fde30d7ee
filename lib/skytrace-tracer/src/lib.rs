//! Driver for the SkyWalking tracer integration.
//!
//! Wires an inbound HTTP request to the propagation core: parses the `sw8`
//! header, builds the request's segment context with the configured identity
//! and endpoint policy, tracks the entry span and any exit spans for outbound
//! calls, and hands finished, sampled segments to the segment sink.

mod time;
mod tracer;

pub use self::time::epoch_millis;
pub use self::tracer::{SegmentSink, Span, Tracer};
