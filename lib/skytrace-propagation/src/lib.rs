//! Cross-process trace context propagation for the SkyWalking tracer.
//!
//! This crate carries the per-request state of the tracer integration: parsing
//! the inbound `sw8` propagation header into a [`SpanContext`], deriving the
//! request's [`SegmentContext`] (trace/segment identity plus sampling
//! decision), recording units of work as [`SpanStore`] entries, and encoding
//! the outbound `sw8` header for downstream calls.
//!
//! Everything here is synchronous, in-memory string and integer processing.
//! Shipping finished segments to the collector is `skytrace-reporter`'s job.

mod codec;
mod context;
mod error;
mod id;
mod span;

pub use self::context::{SegmentContext, SpanContext, TracingDecision, PROPAGATION_HEADER_KEY};
pub use self::error::PropagationError;
pub use self::id::{generate_id, RandomGenerator, ThreadRandomGenerator};
pub use self::span::SpanStore;
