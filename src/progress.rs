//! Transfer rate estimation and human-readable formatting.
//!
//! The rate estimator collects bytes-per-second samples over ~1 second
//! windows and averages the recent ones, so the displayed rate and ETA do not
//! jump around with every socket read.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// How many closed 1-second windows contribute to the rolling average.
const SAMPLE_WINDOWS: usize = 5;

/// Rolling transfer-rate estimate fed by chunk sizes.
#[derive(Debug)]
pub struct RateEstimator {
    window_start: Instant,
    window_bytes: u64,
    samples: VecDeque<f64>,
}

impl RateEstimator {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            window_bytes: 0,
            samples: VecDeque::with_capacity(SAMPLE_WINDOWS),
        }
    }

    /// Record a received chunk. Closes the current window once it spans at
    /// least a second.
    pub fn record(&mut self, bytes: u64, now: Instant) {
        self.window_bytes += bytes;
        let elapsed = now.duration_since(self.window_start);
        if elapsed >= Duration::from_secs(1) {
            let rate = self.window_bytes as f64 / elapsed.as_secs_f64();
            if self.samples.len() == SAMPLE_WINDOWS {
                self.samples.pop_front();
            }
            self.samples.push_back(rate);
            self.window_start = now;
            self.window_bytes = 0;
        }
    }

    /// Current estimate in bytes per second, or `None` before the first full
    /// window has closed.
    pub fn rate(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    /// Seconds remaining for `remaining` bytes at the current rate.
    pub fn eta_secs(&self, remaining: u64) -> Option<u64> {
        let rate = self.rate()?;
        if rate <= 0.0 {
            return None;
        }
        Some((remaining as f64 / rate).round() as u64)
    }
}

/// Format a byte count with the closest binary unit, e.g. `1.5MB`.
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0B".into();
    }
    let exp = ((bytes as f64).ln() / 1024f64.ln()) as usize;
    let exp = exp.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exp as i32);
    if exp == 0 {
        format!("{}B", bytes)
    } else {
        format!("{:.2}{}", value, UNITS[exp])
    }
}

/// Rough time-remaining wording, deliberately vague for small values.
pub fn eta_words(secs: u64) -> String {
    match secs {
        0 => "- nevermind, done!".into(),
        1..=4 => "in a moment!".into(),
        5..=9 => "less than 10 seconds".into(),
        10..=19 => "less than 20 seconds".into(),
        20..=39 => "half a minute".into(),
        40..=59 => "less than a minute".into(),
        _ => {
            let mins = secs as f64 / 60.0;
            match mins as u64 {
                1 => "about a minute".into(),
                2..=44 => format!("{} minutes", mins.round() as u64),
                45..=90 => "about an hour".into(),
                91..=1440 => format!("about {} hours", (mins / 60.0).round() as u64),
                1441..=2520 => "about a day".into(),
                2521..=86400 => format!("about {} days", (mins / 1440.0).round() as u64),
                _ => format!("about {} months", (mins / 43200.0).round() as u64),
            }
        }
    }
}

/// Elapsed-time wording for the completion line, e.g. `in 2 minutes, 5 seconds`.
pub fn elapsed_words(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    if total == 0 {
        return "instantly!".into();
    }

    let units = [(86400, "day"), (3600, "hour"), (60, "minute"), (1, "second")];
    let mut remaining = total;
    let mut parts = Vec::new();
    for (span, name) in units {
        let count = remaining / span;
        remaining %= span;
        if count > 0 {
            let plural = if count == 1 { "" } else { "s" };
            parts.push(format!("{} {}{}", count, name, plural));
        }
    }
    format!("in {}", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn rate_averages_over_windows() {
        let start = Instant::now();
        let mut est = RateEstimator::new(start);
        assert!(est.rate().is_none());

        est.record(512, start + Duration::from_millis(400));
        assert!(est.rate().is_none());
        est.record(512, start + Duration::from_secs(1));
        let rate = est.rate().unwrap();
        assert!((rate - 1024.0).abs() < 1.0);

        // A slower second window drags the average down.
        est.record(512, start + Duration::from_secs(2));
        let rate = est.rate().unwrap();
        assert!(rate < 1024.0);
    }

    #[test]
    fn eta_derives_from_rate() {
        let start = Instant::now();
        let mut est = RateEstimator::new(start);
        est.record(1024, start + Duration::from_secs(1));
        assert_eq!(est.eta_secs(10240), Some(10));
    }

    #[test_case(0, "0B")]
    #[test_case(512, "512B")]
    #[test_case(2048, "2.00KB")]
    #[test_case(1_572_864, "1.50MB")]
    #[test_case(1_073_741_824, "1.00GB")]
    fn human_bytes_units(bytes: u64, expected: &str) {
        assert_eq!(human_bytes(bytes), expected);
    }

    #[test_case(2, "in a moment!")]
    #[test_case(25, "half a minute")]
    #[test_case(70, "about a minute")]
    #[test_case(600, "10 minutes")]
    #[test_case(3600, "about an hour")]
    fn eta_wording(secs: u64, expected: &str) {
        assert_eq!(eta_words(secs), expected);
    }

    #[test]
    fn elapsed_wording() {
        assert_eq!(elapsed_words(Duration::from_secs(0)), "instantly!");
        assert_eq!(elapsed_words(Duration::from_secs(1)), "in 1 second");
        assert_eq!(
            elapsed_words(Duration::from_secs(125)),
            "in 2 minutes, 5 seconds"
        );
        assert_eq!(
            elapsed_words(Duration::from_secs(3601)),
            "in 1 hour, 1 second"
        );
    }
}
