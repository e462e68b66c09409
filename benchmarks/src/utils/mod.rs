//! Small helpers shared by the harness

use std::time::{Duration, Instant};

/// Timer utility for measuring execution time
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }
}

/// Statistical utilities
pub mod stats {
    pub fn mean(values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    pub fn min(values: &[f64]) -> Option<f64> {
        values.iter().copied().min_by(f64::total_cmp)
    }

    pub fn max(values: &[f64]) -> Option<f64> {
        values.iter().copied().max_by(f64::total_cmp)
    }

    pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let len = sorted.len();
        let index = ((len as f64 - 1.0) * p / 100.0).round() as usize;
        Some(sorted[index.min(len - 1)])
    }
}

/// Format utilities
pub mod format {
    use std::time::Duration;

    pub fn duration_human(duration: Duration) -> String {
        let total_secs = duration.as_secs();
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;
        let millis = duration.subsec_millis();

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else if seconds > 0 {
            format!("{}.{:03}s", seconds, millis)
        } else {
            format!("{}ms", duration.as_millis())
        }
    }

    /// `12.34s`, or `N/A` when the value is missing
    pub fn seconds_or_na(value: Option<f64>, decimals: usize) -> String {
        match value {
            Some(v) => format!("{:.*}s", decimals, v),
            None => "N/A".to_string(),
        }
    }

    /// Lowercase, with spaces and hyphens folded to underscores
    pub fn file_safe(name: &str) -> String {
        name.trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect()
    }
}
