use chrono::{DateTime, Duration, Utc};
use std::fmt;

use crate::error::ValidationError;

pub const NOW_LITERAL: &str = "now()";

fn unit_millis(unit: char) -> Option<i64> {
    match unit {
        's' => Some(1_000),
        'm' => Some(60_000),
        'h' => Some(3_600_000),
        'd' => Some(86_400_000),
        'w' => Some(604_800_000),
        _ => None,
    }
}

/// Parses `-?\d+[smhdw]` into signed milliseconds.
fn parse_signed_ms(raw: &str) -> Result<i64, String> {
    let trimmed = raw.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let Some(unit) = body.chars().last() else {
        return Err(format!("'{raw}' is not a duration like -1h or 30m"));
    };
    let digits = &body[..body.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("'{raw}' is not a duration like -1h or 30m"));
    }
    let multiplier = unit_millis(unit)
        .ok_or_else(|| format!("'{raw}' has unknown unit '{unit}' (use s, m, h, d or w)"))?;
    let amount: i64 = digits
        .parse()
        .map_err(|_| format!("'{raw}' is out of range"))?;
    let millis = amount
        .checked_mul(multiplier)
        .ok_or_else(|| format!("'{raw}' is out of range"))?;
    Ok(if negative { -millis } else { millis })
}

/// Length of a relative span expression in milliseconds, ignoring its sign:
/// `-2h` is 7_200_000.
pub fn parse_span_ms(raw: &str) -> Result<i64, String> {
    parse_signed_ms(raw).map(i64::abs)
}

/// A start or end bound as written in a query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeExpr {
    Now,
    Relative(Duration),
    Absolute(DateTime<Utc>),
}

impl TimeExpr {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case(NOW_LITERAL) {
            return Ok(TimeExpr::Now);
        }
        if let Ok(ms) = parse_signed_ms(trimmed) {
            return Duration::try_milliseconds(ms)
                .map(TimeExpr::Relative)
                .ok_or_else(|| format!("'{raw}' is out of range"));
        }
        DateTime::parse_from_rfc3339(trimmed)
            .map(|ts| TimeExpr::Absolute(ts.with_timezone(&Utc)))
            .map_err(|_| {
                format!("'{raw}' must be a relative time (e.g. -1h), now() or an RFC 3339 timestamp")
            })
    }

    /// `None` when a relative offset lands outside the representable range.
    pub fn resolve(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TimeExpr::Now => Some(now),
            TimeExpr::Relative(offset) => now.checked_add_signed(*offset),
            TimeExpr::Absolute(ts) => Some(*ts),
        }
    }
}

/// Aggregation window length (`\d+[smhdw]`, strictly positive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPeriod(Duration);

impl WindowPeriod {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.starts_with('-') {
            return Err(format!("window '{raw}' must not be negative"));
        }
        let ms = parse_signed_ms(trimmed)?;
        if ms == 0 {
            return Err(format!("window '{raw}' must be greater than zero"));
        }
        Ok(Self(Duration::milliseconds(ms)))
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self(duration)
    }

    pub fn duration(&self) -> Duration {
        self.0
    }

    pub fn seconds(&self) -> i64 {
        self.0.num_seconds().max(1)
    }
}

impl fmt::Display for WindowPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0.num_milliseconds();
        for (unit, size) in [('w', 604_800_000), ('d', 86_400_000), ('h', 3_600_000), ('m', 60_000)] {
            if ms % size == 0 {
                return write!(f, "{}{unit}", ms / size);
            }
        }
        write!(f, "{}s", ms / 1_000)
    }
}

/// A validated, unresolved query range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: TimeExpr,
    pub end: TimeExpr,
    pub window: WindowPeriod,
}

/// A range pinned to absolute instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub window: WindowPeriod,
}

impl RangeSpec {
    /// Validates the three query parameters, substituting `defaults` for the
    /// ones that are absent. All problems are reported together.
    pub fn from_params(
        start: Option<&str>,
        end: Option<&str>,
        window: Option<&str>,
        defaults: (&str, &str, &str),
    ) -> Result<Self, ValidationError> {
        let mut errors = ValidationError::default();

        let start = TimeExpr::parse(non_empty(start).unwrap_or(defaults.0))
            .map_err(|msg| errors.push("startTime", msg))
            .ok();
        let end = TimeExpr::parse(non_empty(end).unwrap_or(defaults.1))
            .map_err(|msg| errors.push("endTime", msg))
            .ok();
        let window = WindowPeriod::parse(non_empty(window).unwrap_or(defaults.2))
            .map_err(|msg| errors.push("windowPeriod", msg))
            .ok();

        match (start, end, window) {
            (Some(start), Some(end), Some(window)) if errors.is_empty() => {
                Ok(Self { start, end, window })
            }
            _ => Err(errors),
        }
    }

    pub fn resolve(&self, now: DateTime<Utc>) -> Result<ResolvedRange, ValidationError> {
        let mut errors = ValidationError::default();
        let start = self.start.resolve(now);
        if start.is_none() {
            errors.push("startTime", "startTime is too far from the current time");
        }
        let end = self.end.resolve(now);
        if end.is_none() {
            errors.push("endTime", "endTime is too far from the current time");
        }
        let (Some(start), Some(end)) = (start, end) else {
            return Err(errors);
        };
        if end <= start {
            errors.push("endTime", "endTime must be after startTime");
            return Err(errors);
        }
        Ok(ResolvedRange {
            start,
            end,
            window: self.window,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
