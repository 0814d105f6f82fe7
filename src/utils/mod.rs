pub mod dashmap;

/// Format a `chrono::Duration` in a human-friendly `Nd HH:MM:SS.mmm` form.
pub fn format_duration(duration: &chrono::Duration) -> String {
    let milliseconds = format!("{:0>3}", duration.num_milliseconds() % 1000);
    let seconds = format!("{:0>2}", duration.num_seconds() % 60);
    let minutes = format!("{:0>2}", duration.num_minutes() % 60);
    let hours = format!("{:0>2}", duration.num_hours() % 24);
    let days = duration.num_days().to_string();

    format!("{days}d {hours}:{minutes}:{seconds}.{milliseconds}")
}
