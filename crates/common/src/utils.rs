//! Utility functions for Photo Curator
//!
//! Formatting helpers for log lines and a timeout wrapper used when a caller
//! wants to stop waiting on a long-running operation.

use std::future::Future;
use std::time::Duration;
use bytesize::ByteSize;
use tokio::time::timeout;
use tracing::warn;

use crate::error::{Error, Result};

/// Formats a byte size into a human-readable string
///
/// # Examples
///
/// ```
/// use common::utils::format_bytes;
///
/// assert_eq!(format_bytes(0), "0 B");
/// assert_eq!(format_bytes(512), "512 B");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    ByteSize(bytes).to_string_as(true)
}

/// Formats a duration as `1m 5s`, `250ms` or `40µs`
///
/// # Examples
///
/// ```
/// use common::utils::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
/// assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();

    if total_secs == 0 {
        let millis = duration.subsec_millis();
        if millis == 0 {
            return format!("{}µs", duration.subsec_micros());
        }
        return format!("{}ms", millis);
    }

    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    match (hours, minutes) {
        (0, 0) => format!("{}s", seconds),
        (0, _) => format!("{}m {}s", minutes, seconds),
        _ => format!("{}h {}m {}s", hours, minutes, seconds),
    }
}

/// Awaits a future, giving up with [`Error::Timeout`] after `duration`
///
/// Dropping the inner future on timeout only stops *waiting*; work that was
/// spawned elsewhere keeps running.
pub async fn execute_with_timeout<T, F>(
    future: F,
    duration: Duration,
    operation_name: &str,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation = %operation_name, "Stopped waiting after {}", format_duration(duration));
            Err(Error::Timeout(format!(
                "Operation '{}' timed out after {}",
                operation_name,
                format_duration(duration)
            )))
        }
    }
}
