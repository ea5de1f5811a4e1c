use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::sample::Sample;
use crate::time::WindowPeriod;

/// Trailing span shown by a chart, always ending at "now".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
pub enum DisplayWindow {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[default]
    #[serde(rename = "24h")]
    TwentyFourHours,
    #[serde(rename = "7d")]
    SevenDays,
}

/// Granularity of the X-axis labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelGranularity {
    HourMinute,
    MonthDay,
}

impl DisplayWindow {
    pub const ALL: [DisplayWindow; 4] = [
        DisplayWindow::OneHour,
        DisplayWindow::SixHours,
        DisplayWindow::TwentyFourHours,
        DisplayWindow::SevenDays,
    ];

    pub fn span(self) -> Duration {
        match self {
            Self::OneHour => Duration::hours(1),
            Self::SixHours => Duration::hours(6),
            Self::TwentyFourHours => Duration::hours(24),
            Self::SevenDays => Duration::days(7),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneHour => "1h",
            Self::SixHours => "6h",
            Self::TwentyFourHours => "24h",
            Self::SevenDays => "7d",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::OneHour => "Last hour",
            Self::SixHours => "Last 6 hours",
            Self::TwentyFourHours => "Last 24 hours",
            Self::SevenDays => "Last 7 days",
        }
    }

    /// Aggregation window requested when fetching data for this span.
    pub fn aggregation_window(self) -> WindowPeriod {
        WindowPeriod::from_duration(match self {
            Self::OneHour => Duration::minutes(1),
            Self::SixHours => Duration::minutes(5),
            Self::TwentyFourHours => Duration::minutes(15),
            Self::SevenDays => Duration::hours(1),
        })
    }

    pub fn label_granularity(self) -> LabelGranularity {
        if self.span() <= Duration::hours(24) {
            LabelGranularity::HourMinute
        } else {
            LabelGranularity::MonthDay
        }
    }

    pub fn cutoff(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.span()
    }

    /// Relative start expression understood by the sensor routes, e.g. `-6h`.
    pub fn start_expression(self) -> String {
        format!("-{}", self.as_str())
    }
}

impl fmt::Display for DisplayWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown display window '{0}' (expected 1h, 6h, 24h or 7d)")]
pub struct UnknownWindow(pub String);

impl FromStr for DisplayWindow {
    type Err = UnknownWindow;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1h" => Ok(Self::OneHour),
            "6h" => Ok(Self::SixHours),
            "24h" | "1d" => Ok(Self::TwentyFourHours),
            "7d" | "1w" => Ok(Self::SevenDays),
            _ => Err(UnknownWindow(raw.to_string())),
        }
    }
}

/// Keeps the samples at or after `now - span`, in ascending time order.
/// Samples later than `now` are kept.
pub fn window_samples(samples: &[Sample], window: DisplayWindow, now: DateTime<Utc>) -> Vec<Sample> {
    let cutoff = window.cutoff(now);
    let mut kept: Vec<Sample> = samples
        .iter()
        .filter(|sample| sample.timestamp >= cutoff)
        .cloned()
        .collect();
    kept.sort_by_key(|sample| sample.timestamp);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::sample::sample_at;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).single().unwrap()
    }

    #[test]
    fn parses_window_labels() {
        assert_eq!("1h".parse::<DisplayWindow>(), Ok(DisplayWindow::OneHour));
        assert_eq!(" 7D ".parse::<DisplayWindow>(), Ok(DisplayWindow::SevenDays));
        assert!("2h".parse::<DisplayWindow>().is_err());
        for window in DisplayWindow::ALL {
            assert_eq!(window.as_str().parse::<DisplayWindow>(), Ok(window));
        }
    }

    #[test]
    fn aggregation_windows_grow_with_span() {
        assert_eq!(DisplayWindow::OneHour.aggregation_window().seconds(), 60);
        assert_eq!(DisplayWindow::SixHours.aggregation_window().seconds(), 300);
        assert_eq!(DisplayWindow::TwentyFourHours.aggregation_window().seconds(), 900);
        assert_eq!(DisplayWindow::SevenDays.aggregation_window().seconds(), 3600);
    }

    #[test]
    fn only_seven_days_uses_month_day_labels() {
        assert_eq!(
            DisplayWindow::TwentyFourHours.label_granularity(),
            LabelGranularity::HourMinute
        );
        assert_eq!(
            DisplayWindow::SevenDays.label_granularity(),
            LabelGranularity::MonthDay
        );
    }

    #[test]
    fn filters_before_cutoff_and_sorts() {
        let samples = vec![
            sample_at(Field::Temperature, now() - Duration::minutes(10), 3.0),
            sample_at(Field::Temperature, now() - Duration::hours(2), 1.0),
            sample_at(Field::Humidity, now() - Duration::minutes(30), 2.0),
            sample_at(Field::Temperature, now() + Duration::minutes(1), 4.0),
        ];
        let kept = window_samples(&samples, DisplayWindow::OneHour, now());
        let values: Vec<f64> = kept.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        let cutoff = DisplayWindow::OneHour.cutoff(now());
        assert!(kept.iter().all(|s| s.timestamp >= cutoff));
        assert!(kept.windows(2).all(|p| p[0].timestamp <= p[1].timestamp));
    }

    #[test]
    fn sample_exactly_at_cutoff_is_kept() {
        let samples = vec![sample_at(Field::Pressure, now() - Duration::hours(6), 1013.0)];
        assert_eq!(window_samples(&samples, DisplayWindow::SixHours, now()).len(), 1);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(window_samples(&[], DisplayWindow::SevenDays, now()).is_empty());
    }
}
