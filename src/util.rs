/// Format remaining seconds as `m:ss`
pub fn format_clock(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

pub fn completion_percentage(answered: usize, total: usize) -> f64 {
    match total {
        positive if positive > 0 => (answered as f64 / total as f64) * 100.0,
        _ => 0.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerUrgency {
    Normal,
    Warning,
    Critical,
}

/// Urgency from the share of time left: under 50% warns, under 25% is critical
pub fn timer_urgency(remaining: u64, total: u64) -> TimerUrgency {
    if total == 0 {
        return TimerUrgency::Critical;
    }
    let left = (remaining as f64 / total as f64) * 100.0;
    if left < 25.0 {
        TimerUrgency::Critical
    } else if left < 50.0 {
        TimerUrgency::Warning
    } else {
        TimerUrgency::Normal
    }
}
