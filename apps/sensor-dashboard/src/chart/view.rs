use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

use crate::chart::hit_test::{nearest_sample, NearestSample};
use crate::chart::render::{ChartInput, ChartRenderer};
use crate::chart::scale::{ChartLayout, Point, Scale};
use crate::chart::surface::{render_svg, Surface, SurfaceError};
use crate::chart::window::{window_samples, DisplayWindow};
use crate::field::{Field, FieldMap};
use crate::sample::{Sample, SampleBundle};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_RESIZE_DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewSettings {
    pub refresh_interval: Duration,
    pub resize_debounce: Duration,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            resize_debounce: DEFAULT_RESIZE_DEBOUNCE,
        }
    }
}

/// Holds back resize events until the size has stopped changing for `delay`.
#[derive(Debug, Clone)]
pub struct ResizeDebouncer {
    delay: Duration,
    pending: Option<((u32, u32), Instant)>,
}

impl ResizeDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Records a size and restarts the settle timer.
    pub fn observe(&mut self, size: (u32, u32), now: Instant) {
        self.pending = Some((size, now + self.delay));
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, deadline)| deadline)
    }

    /// Returns the settled size once the deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<(u32, u32)> {
        match self.pending {
            Some((size, deadline)) if now >= deadline => {
                self.pending = None;
                Some(size)
            }
            _ => None,
        }
    }

    /// Waits until the pending size settles. Returns immediately with `None`
    /// if nothing is pending.
    pub async fn settled(&mut self) -> Option<(u32, u32)> {
        loop {
            let deadline = self.deadline()?;
            tokio::time::sleep_until(deadline).await;
            if let Some(size) = self.poll(Instant::now()) {
                return Some(size);
            }
        }
    }
}

/// State of one field's chart. Redraws are requested by data changes,
/// window changes and settled resizes.
#[derive(Debug, Clone)]
pub struct ChartView {
    field: Field,
    window: DisplayWindow,
    size: (u32, u32),
    samples: Vec<Sample>,
    visible: Vec<Sample>,
    debouncer: ResizeDebouncer,
    needs_redraw: bool,
}

impl ChartView {
    pub fn new(field: Field, size: (u32, u32), settings: &ViewSettings) -> Self {
        Self {
            field,
            window: DisplayWindow::default(),
            size,
            samples: Vec::new(),
            visible: Vec::new(),
            debouncer: ResizeDebouncer::new(settings.resize_debounce),
            needs_redraw: true,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn needs_redraw(&self) -> bool {
        self.needs_redraw
    }

    /// Samples drawn by the last redraw.
    pub fn visible(&self) -> &[Sample] {
        &self.visible
    }

    pub fn set_samples(&mut self, samples: Vec<Sample>) {
        self.samples = samples;
        self.needs_redraw = true;
    }

    pub fn set_window(&mut self, window: DisplayWindow) {
        if self.window != window {
            self.window = window;
            self.needs_redraw = true;
        }
    }

    pub fn resize(&mut self, size: (u32, u32), now: Instant) {
        self.debouncer.observe(size, now);
    }

    pub fn invalidate(&mut self) {
        self.needs_redraw = true;
    }

    /// Applies a settled resize, if any. Returns whether a redraw is due.
    pub fn tick(&mut self, now: Instant) -> bool {
        if let Some(size) = self.debouncer.poll(now) {
            if size != self.size {
                self.size = size;
                self.needs_redraw = true;
            }
        }
        self.needs_redraw
    }

    pub fn redraw<S: Surface + ?Sized>(
        &mut self,
        renderer: &ChartRenderer,
        surface: &mut S,
        now: DateTime<Utc>,
        banner: Option<&str>,
    ) -> Result<Option<Scale>, SurfaceError> {
        self.visible = window_samples(&self.samples, self.window, now);
        let input =
            ChartInput::for_field(self.field, &self.visible, self.window).with_banner(banner);
        let scale = renderer.render(surface, &input)?;
        self.needs_redraw = false;
        Ok(scale)
    }

    pub fn redraw_svg(
        &mut self,
        renderer: &ChartRenderer,
        now: DateTime<Utc>,
        banner: Option<&str>,
    ) -> Result<String, SurfaceError> {
        let (width, height) = self.size;
        render_svg(width, height, |surface| {
            self.redraw(renderer, surface, now, banner).map(|_| ())
        })
    }

    /// Tooltip lookup against the samples of the last redraw.
    pub fn hover(&self, pointer: Point) -> Option<(NearestSample, &Sample)> {
        let layout = ChartLayout::new(self.size.0, self.size.1);
        let hit = nearest_sample(&self.visible, &layout, pointer)?;
        self.visible.get(hit.index).map(|sample| (hit, sample))
    }
}

/// Client-side dashboard state: one chart per field, a loading flag and a
/// persistent error banner.
#[derive(Debug, Clone)]
pub struct DashboardView {
    charts: FieldMap<ChartView>,
    loading: bool,
    error: Option<String>,
    last_update: Option<DateTime<Utc>>,
}

impl DashboardView {
    pub fn new(size: (u32, u32), settings: ViewSettings) -> Self {
        Self {
            charts: FieldMap::from_fn(|field| ChartView::new(field, size, &settings)),
            loading: false,
            error: None,
            last_update: None,
        }
    }

    pub fn chart(&self, field: Field) -> &ChartView {
        self.charts.get(field)
    }

    pub fn chart_mut(&mut self, field: Field) -> &mut ChartView {
        self.charts.get_mut(field)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error_banner(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    pub fn begin_fetch(&mut self) {
        self.loading = true;
    }

    /// Replaces every chart's data. The most recently applied bundle wins.
    pub fn apply_bundle(&mut self, bundle: &SampleBundle) {
        self.loading = false;
        self.last_update = Some(bundle.created_at);
        let flat = bundle.flatten();
        for field in Field::ALL {
            let samples = flat.iter().filter(|s| s.field == field).cloned().collect();
            self.charts.get_mut(field).set_samples(samples);
        }
        if !bundle.errors.is_empty() {
            let message = bundle
                .errors
                .iter()
                .map(|(field, err)| format!("{field}: {err}"))
                .collect::<Vec<_>>()
                .join("; ");
            self.error = Some(message);
        }
    }

    pub fn apply_error(&mut self, message: impl Into<String>) {
        self.loading = false;
        self.error = Some(message.into());
        self.invalidate_all();
    }

    pub fn dismiss_error(&mut self) {
        if self.error.take().is_some() {
            self.invalidate_all();
        }
    }

    fn invalidate_all(&mut self) {
        for field in Field::ALL {
            self.charts.get_mut(field).invalidate();
        }
    }

    pub fn set_window(&mut self, window: DisplayWindow) {
        for field in Field::ALL {
            self.charts.get_mut(field).set_window(window);
        }
    }

    pub fn resize(&mut self, size: (u32, u32), now: Instant) {
        for field in Field::ALL {
            self.charts.get_mut(field).resize(size, now);
        }
    }

    /// Fields whose chart is due for a redraw after applying settled resizes.
    pub fn due_redraws(&mut self, now: Instant) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|field| self.charts.get_mut(*field).tick(now))
            .collect()
    }

    /// Earliest moment a pending resize settles.
    pub fn resize_deadline(&self) -> Option<Instant> {
        Field::ALL
            .into_iter()
            .filter_map(|field| self.charts.get(field).debouncer.deadline())
            .min()
    }

    /// Renders only the charts that are due, with the error banner on each.
    pub fn render_due(
        &mut self,
        renderer: &ChartRenderer,
        now: DateTime<Utc>,
        tick: Instant,
    ) -> Result<Vec<(Field, String)>, SurfaceError> {
        let banner = self.error.clone();
        let mut out = Vec::new();
        for field in self.due_redraws(tick) {
            let svg = self
                .charts
                .get_mut(field)
                .redraw_svg(renderer, now, banner.as_deref())?;
            out.push((field, svg));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::surface::RecordingSurface;
    use crate::sample::{sample_at, SampleSeries};
    use crate::time::{ResolvedRange, WindowPeriod};
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 12, 0, 0).single().unwrap()
    }

    fn settings() -> ViewSettings {
        ViewSettings {
            refresh_interval: Duration::from_millis(50),
            resize_debounce: Duration::from_millis(100),
        }
    }

    fn bundle(values: &[f64]) -> SampleBundle {
        let samples = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                sample_at(
                    Field::Temperature,
                    now() - ChronoDuration::minutes(10 * (values.len() - i) as i64),
                    *v,
                )
            })
            .collect();
        let range = ResolvedRange {
            start: now() - ChronoDuration::hours(1),
            end: now(),
            window: WindowPeriod::parse("1m").unwrap(),
        };
        SampleBundle::new(
            FieldMap {
                temperature: SampleSeries::new(samples),
                humidity: SampleSeries::empty(),
                pressure: SampleSeries::empty(),
            },
            &range,
            now(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn resize_waits_for_the_size_to_settle() {
        let mut debouncer = ResizeDebouncer::new(Duration::from_millis(100));
        let start = Instant::now();
        debouncer.observe((400, 300), start);
        debouncer.observe((500, 300), start + Duration::from_millis(60));

        assert_eq!(debouncer.poll(start + Duration::from_millis(120)), None);
        assert_eq!(
            debouncer.poll(start + Duration::from_millis(160)),
            Some((500, 300))
        );
        assert_eq!(debouncer.poll(start + Duration::from_millis(500)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn settled_sleeps_until_deadline() {
        let mut debouncer = ResizeDebouncer::new(Duration::from_millis(100));
        let start = Instant::now();
        debouncer.observe((640, 480), start);
        assert_eq!(debouncer.settled().await, Some((640, 480)));
        assert!(Instant::now() >= start + Duration::from_millis(100));
        assert_eq!(debouncer.settled().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn chart_redraws_on_data_window_and_settled_resize() {
        let mut chart = ChartView::new(Field::Temperature, (800, 400), &settings());
        let renderer = ChartRenderer::default();
        let mut surface = RecordingSurface::new(800, 400);
        chart.redraw(&renderer, &mut surface, now(), None).unwrap();
        assert!(!chart.needs_redraw());

        chart.set_window(DisplayWindow::default());
        assert!(!chart.needs_redraw());
        chart.set_window(DisplayWindow::SevenDays);
        assert!(chart.needs_redraw());
        chart.redraw(&renderer, &mut surface, now(), None).unwrap();

        let start = Instant::now();
        chart.resize((600, 300), start);
        assert!(!chart.tick(start + Duration::from_millis(50)));
        assert!(chart.tick(start + Duration::from_millis(100)));
        assert_eq!(chart.size(), (600, 300));
    }

    #[test]
    fn hover_uses_the_last_drawn_samples() {
        let mut view = DashboardView::new((800, 400), settings());
        view.set_window(DisplayWindow::OneHour);
        view.apply_bundle(&bundle(&[10.0, 30.0]));
        let renderer = ChartRenderer::default();
        let mut surface = RecordingSurface::new(800, 400);
        view.chart_mut(Field::Temperature)
            .redraw(&renderer, &mut surface, now(), None)
            .unwrap();

        let chart = view.chart(Field::Temperature);
        let (hit, sample) = chart.hover(Point::new(770.0, 30.0)).unwrap();
        assert_eq!(hit.index, 1);
        assert_eq!(sample.value, 30.0);
        assert!(chart.hover(Point::new(400.0, 200.0)).is_none());
    }

    #[test]
    fn error_banner_persists_until_dismissed_and_ignores_loading() {
        let mut view = DashboardView::new((800, 400), settings());
        view.begin_fetch();
        view.apply_error("store unreachable");
        assert!(!view.is_loading());

        view.begin_fetch();
        assert!(view.is_loading());
        assert_eq!(view.error_banner(), Some("store unreachable"));

        view.apply_bundle(&bundle(&[20.0]));
        assert_eq!(view.error_banner(), Some("store unreachable"));
        view.dismiss_error();
        assert_eq!(view.error_banner(), None);
    }

    #[test]
    fn last_applied_bundle_wins() {
        let mut view = DashboardView::new((800, 400), settings());
        view.apply_bundle(&bundle(&[1.0, 2.0, 3.0]));
        view.apply_bundle(&bundle(&[9.0]));
        let renderer = ChartRenderer::default();
        let svgs: FieldMap<String> = {
            let mut out = FieldMap::default();
            for (field, svg) in view.render_due(&renderer, now(), Instant::now()).unwrap() {
                *out.get_mut(field) = svg;
            }
            out
        };
        assert_eq!(view.chart(Field::Temperature).visible().len(), 1);
        assert!(svgs.temperature.contains("<svg"));
        assert!(svgs.pressure.contains("No data available"));
    }

    #[tokio::test(start_paused = true)]
    async fn only_due_charts_are_rendered() {
        let mut view = DashboardView::new((800, 400), settings());
        let renderer = ChartRenderer::default();
        let start = Instant::now();
        assert_eq!(view.render_due(&renderer, now(), start).unwrap().len(), 3);
        assert!(view.render_due(&renderer, now(), start).unwrap().is_empty());

        view.resize((640, 320), start);
        assert_eq!(view.resize_deadline(), Some(start + Duration::from_millis(100)));
        assert!(view
            .render_due(&renderer, now(), start + Duration::from_millis(50))
            .unwrap()
            .is_empty());
        let drawn = view
            .render_due(&renderer, now(), start + Duration::from_millis(100))
            .unwrap();
        assert_eq!(drawn.len(), 3);
        assert!(drawn[0].1.contains("width=\"640\""));
        assert_eq!(view.resize_deadline(), None);
        assert_eq!(view.chart(Field::Pressure).size(), (640, 320));

        view.apply_error("store unreachable");
        let drawn = view.render_due(&renderer, now(), start).unwrap();
        assert_eq!(drawn.len(), 3);
        assert!(drawn.iter().all(|(_, svg)| svg.contains("store unreachable")));
        view.dismiss_error();
        assert_eq!(view.render_due(&renderer, now(), start).unwrap().len(), 3);
    }
}
