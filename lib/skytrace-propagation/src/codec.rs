//! Base64 helpers for the payload fields of the `sw8` header.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use snafu::OptionExt as _;

use crate::error::{Decode, PropagationError};

pub(crate) fn encode(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}

pub(crate) fn decode(value: &str) -> Result<String, PropagationError> {
    let bytes = STANDARD.decode(value).ok().context(Decode)?;
    String::from_utf8(bytes).ok().context(Decode)
}
