//! Time helpers for span timestamps.

use std::time::SystemTime;

/// Converts a wall-clock instant into epoch milliseconds.
pub fn epoch_millis(time: SystemTime) -> i64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|since_epoch| since_epoch.as_millis() as i64)
        .unwrap_or_default()
}
