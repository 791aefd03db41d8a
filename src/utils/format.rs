//! Human-readable formatting utilities.

const MIB: u64 = 1024 * 1024;

/// Format a byte count with a decimal unit suffix.
pub fn format_size(bytes: u64) -> String {
    if bytes >= 1_000_000_000 {
        format!("{:.1} GB", bytes as f64 / 1_000_000_000.0)
    } else if bytes >= 1_000_000 {
        format!("{:.1} MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.1} KB", bytes as f64 / 1_000.0)
    } else {
        format!("{} B", bytes)
    }
}

/// Whole mebibytes, rounded down.
pub fn size_in_mb(bytes: u64) -> u64 {
    bytes / MIB
}
