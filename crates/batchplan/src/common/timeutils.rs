use std::time::Duration;

/// Format a duration as a PBS wall-time string, e.g. 4:30:00.
/// The hour field is unpadded; wall times above 99 hours are legal.
pub fn format_wall_time(duration: &Duration) -> String {
    let mut seconds = duration.as_secs();
    let hours = seconds / 3600;
    seconds %= 3600;
    let minutes = seconds / 60;
    seconds %= 60;
    format!("{hours}:{minutes:02}:{seconds:02}")
}

pub fn duration_from_hours(hours: f64) -> Duration {
    Duration::from_secs((hours * 3600.0).round() as u64)
}

pub fn duration_to_hours(duration: &Duration) -> f64 {
    duration.as_secs_f64() / 3600.0
}
