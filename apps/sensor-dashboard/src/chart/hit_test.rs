use serde::Serialize;

use crate::chart::scale::{ChartLayout, Point, Scale};
use crate::sample::Sample;

/// A pointer must be strictly closer than this to select a sample.
pub const HIT_THRESHOLD_PX: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, utoipa::ToSchema)]
pub struct NearestSample {
    pub index: usize,
    pub distance: f64,
}

/// Finds the sample drawn nearest to `pointer`, using the same mapping as the
/// renderer. On equal distances the earliest sample in sequence order wins.
pub fn nearest_sample(
    samples: &[Sample],
    layout: &ChartLayout,
    pointer: Point,
) -> Option<NearestSample> {
    let scale = Scale::from_samples(samples)?;
    let mut best: Option<NearestSample> = None;
    for (index, sample) in samples.iter().enumerate() {
        let distance = layout.point_for(sample, &scale).distance(pointer);
        if best.map_or(true, |current| distance < current.distance) {
            best = Some(NearestSample { index, distance });
        }
    }
    best.filter(|hit| hit.distance < HIT_THRESHOLD_PX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::sample::sample_at;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap() + Duration::minutes(minutes)
    }

    fn samples() -> Vec<Sample> {
        vec![
            sample_at(Field::Temperature, t(0), 10.0),
            sample_at(Field::Temperature, t(30), 30.0),
            sample_at(Field::Temperature, t(60), 20.0),
        ]
    }

    #[test]
    fn pointer_on_a_sample_selects_it() {
        let layout = ChartLayout::new(800, 400);
        let hit = nearest_sample(&samples(), &layout, Point::new(410.0, 30.0)).unwrap();
        assert_eq!(hit.index, 1);
        assert_eq!(hit.distance, 0.0);
    }

    #[test]
    fn pointer_twenty_pixels_away_selects_nothing() {
        let layout = ChartLayout::new(800, 400);
        assert!(nearest_sample(&samples(), &layout, Point::new(410.0, 50.0)).is_none());
    }

    #[test]
    fn threshold_is_exclusive() {
        let layout = ChartLayout::new(800, 400);
        assert!(nearest_sample(&samples(), &layout, Point::new(410.0, 45.0)).is_none());
        let hit = nearest_sample(&samples(), &layout, Point::new(410.0, 44.0)).unwrap();
        assert_eq!(hit.index, 1);
    }

    #[test]
    fn equal_distances_resolve_to_lowest_index() {
        let layout = ChartLayout::new(800, 400);
        let twins = vec![
            sample_at(Field::Humidity, t(0), 50.0),
            sample_at(Field::Humidity, t(0), 50.0),
        ];
        let hit = nearest_sample(&twins, &layout, Point::new(52.0, 350.0)).unwrap();
        assert_eq!(hit.index, 0);
    }

    #[test]
    fn no_samples_no_hit() {
        let layout = ChartLayout::new(800, 400);
        assert!(nearest_sample(&[], &layout, Point::new(0.0, 0.0)).is_none());
    }
}
