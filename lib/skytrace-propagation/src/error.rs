use snafu::Snafu;

/// An error raised while parsing an inbound `sw8` propagation header.
///
/// None of these are retryable (parsing is pure and deterministic) and none
/// are fatal: the driver treats any of them as "no valid previous context" and
/// traces the request as the root of a new trace instead of failing it.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
#[snafu(visibility(pub(crate)))]
pub enum PropagationError {
    /// Header did not have exactly eight fields, or a required field was empty.
    #[snafu(display("Invalid propagation header for SkyWalking: {}", header))]
    MalformedHeader {
        /// The raw header value, embedded verbatim.
        header: String,
    },

    /// First field was not the literal `0` or `1`.
    #[snafu(display(
        "Invalid propagation header for SkyWalking: sampling flag can only be '0' or '1' but '{}' was provided",
        flag
    ))]
    InvalidSamplingFlag {
        /// The offending sampling flag field.
        flag: String,
    },

    /// Fourth field did not parse as a span id.
    #[snafu(display(
        "Invalid propagation header for SkyWalking: cannot convert '{}' to valid span id",
        span_id
    ))]
    InvalidSpanId {
        /// The offending span id field.
        span_id: String,
    },

    /// A base64-encoded field failed to decode.
    ///
    /// Decoding failures are not attributed to a specific field.
    #[snafu(display("Invalid propagation header for SkyWalking: parse error"))]
    Decode,
}
