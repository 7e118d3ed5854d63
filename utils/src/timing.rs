// Helpers for timestamping log lines
//
// Global Graphics Software Ltd.
use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current time in milliseconds since the epoch.
///
/// Used purely for timestamping log output; the engine does not
/// schedule anything off of wall-clock time.
pub fn get_current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Error getting system time")
        .as_millis() as u64
}
