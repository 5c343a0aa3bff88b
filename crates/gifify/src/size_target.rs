//! Size Target Module
//!
//! Post-encode check of an animated image against the caller's size bound.

use serde::{Deserialize, Serialize};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Result of the size target check
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SizeTargetResult {
    /// Output fits the bound
    Within,
    /// Output exceeds the bound
    Over { output_bytes: u64, max_bytes: u64 },
}

/// Check if the output file size fits the target.
///
/// Returns `Within` if `output_bytes <= max_bytes`, otherwise `Over`.
pub fn check_size_target(output_bytes: u64, max_bytes: u64) -> SizeTargetResult {
    if output_bytes <= max_bytes {
        SizeTargetResult::Within
    } else {
        SizeTargetResult::Over {
            output_bytes,
            max_bytes,
        }
    }
}

/// Convert a size in MiB (as users enter it) to bytes
pub fn mb_to_bytes(mb: f64) -> u64 {
    if mb.is_finite() && mb > 0.0 {
        (mb * BYTES_PER_MB).floor() as u64
    } else {
        0
    }
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// Size in MiB rounded to two decimals, as reported to clients
pub fn rounded_mb(bytes: u64) -> f64 {
    (bytes_to_mb(bytes) * 100.0).round() / 100.0
}
