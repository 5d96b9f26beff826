//! Human-readable durations and file sizes for list rows and the info overlay.

/// `M:SS` below an hour, `H:MM:SS` above
pub fn format_duration(duration_ms: u64) -> String {
    let total_seconds = duration_ms / 1000;
    let h = total_seconds / 3600;
    let m = (total_seconds % 3600) / 60;
    let s = total_seconds % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

/// Binary units with one decimal, e.g. `1.5 MB`
pub fn format_file_size(size_bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if size_bytes < 1024 {
        return format!("{} B", size_bytes);
    }
    let mut value = size_bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
