use chrono::{DateTime, Duration, Utc};

use crate::sample::Sample;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Padding {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl Default for Padding {
    fn default() -> Self {
        Self {
            top: 30,
            right: 30,
            bottom: 50,
            left: 50,
        }
    }
}

/// Data extent of the samples being drawn. Degenerate ranges are widened to
/// 1 so a single sample (or a flat line) still maps to finite pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub min_value: f64,
    pub max_value: f64,
    pub min_time: DateTime<Utc>,
    pub max_time: DateTime<Utc>,
}

impl Scale {
    pub fn from_samples(samples: &[Sample]) -> Option<Self> {
        let first = samples.first()?;
        let mut scale = Self {
            min_value: first.value,
            max_value: first.value,
            min_time: first.timestamp,
            max_time: first.timestamp,
        };
        for sample in &samples[1..] {
            scale.min_value = scale.min_value.min(sample.value);
            scale.max_value = scale.max_value.max(sample.value);
            scale.min_time = scale.min_time.min(sample.timestamp);
            scale.max_time = scale.max_time.max(sample.timestamp);
        }
        Some(scale)
    }

    pub fn value_range(&self) -> f64 {
        let range = self.max_value - self.min_value;
        if range == 0.0 || !range.is_finite() {
            1.0
        } else {
            range
        }
    }

    /// Time extent in milliseconds.
    pub fn time_range(&self) -> f64 {
        let range = (self.max_time - self.min_time).num_milliseconds();
        if range == 0 {
            1.0
        } else {
            range as f64
        }
    }

    /// Value at fraction `t` of the axis (0 = bottom, 1 = top).
    pub fn value_at(&self, t: f64) -> f64 {
        self.min_value + self.value_range() * t
    }

    /// Instant at fraction `t` of the axis (0 = left, 1 = right).
    pub fn time_at(&self, t: f64) -> DateTime<Utc> {
        self.min_time + Duration::milliseconds((self.time_range() * t).round() as i64)
    }
}

/// Pixel geometry of one chart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartLayout {
    pub width: u32,
    pub height: u32,
    pub padding: Padding,
}

impl ChartLayout {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            padding: Padding::default(),
        }
    }

    pub fn content_width(&self) -> f64 {
        f64::from(
            self.width
                .saturating_sub(self.padding.left + self.padding.right),
        )
    }

    pub fn content_height(&self) -> f64 {
        f64::from(
            self.height
                .saturating_sub(self.padding.top + self.padding.bottom),
        )
    }

    pub fn left(&self) -> f64 {
        f64::from(self.padding.left)
    }

    pub fn top(&self) -> f64 {
        f64::from(self.padding.top)
    }

    pub fn right(&self) -> f64 {
        self.left() + self.content_width()
    }

    pub fn bottom(&self) -> f64 {
        self.top() + self.content_height()
    }

    pub fn center(&self) -> Point {
        Point::new(f64::from(self.width) / 2.0, f64::from(self.height) / 2.0)
    }

    pub fn x_for(&self, timestamp: DateTime<Utc>, scale: &Scale) -> f64 {
        let offset = (timestamp - scale.min_time).num_milliseconds() as f64;
        self.left() + offset / scale.time_range() * self.content_width()
    }

    pub fn y_for(&self, value: f64, scale: &Scale) -> f64 {
        self.top() + self.content_height()
            - (value - scale.min_value) / scale.value_range() * self.content_height()
    }

    pub fn point_for(&self, sample: &Sample, scale: &Scale) -> Point {
        Point::new(
            self.x_for(sample.timestamp, scale),
            self.y_for(sample.value, scale),
        )
    }
}
