use chrono::{DateTime, Utc};

use crate::chart::window::LabelGranularity;

/// Y-axis / tooltip value with one decimal and the unit suffix.
pub fn format_value(value: f64, unit: &str) -> String {
    if unit == "%" {
        format!("{value:.1}%")
    } else {
        format!("{value:.1} {unit}")
    }
}

pub fn format_axis_time(ts: DateTime<Utc>, granularity: LabelGranularity) -> String {
    match granularity {
        LabelGranularity::HourMinute => ts.format("%H:%M").to_string(),
        LabelGranularity::MonthDay => ts.format("%m/%d").to_string(),
    }
}

pub fn format_tooltip_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn values_carry_one_decimal_and_unit() {
        assert_eq!(format_value(21.456, "°C"), "21.5 °C");
        assert_eq!(format_value(50.0, "%"), "50.0%");
        assert_eq!(format_value(1013.27, "hPa"), "1013.3 hPa");
    }

    #[test]
    fn time_labels_follow_granularity() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 0).single().unwrap();
        assert_eq!(format_axis_time(ts, LabelGranularity::HourMinute), "07:05");
        assert_eq!(format_axis_time(ts, LabelGranularity::MonthDay), "03/09");
        assert_eq!(format_tooltip_time(ts), "2024-03-09 07:05:00 UTC");
    }
}
