use crate::chart::format::{format_axis_time, format_value};
use crate::chart::scale::{ChartLayout, Point, Scale};
use crate::chart::surface::{Anchor, Rgb, Surface, SurfaceError, TextSpec};
use crate::chart::window::DisplayWindow;
use crate::field::Field;
use crate::sample::Sample;

pub const GRID_DIVISIONS: u32 = 5;
pub const Y_LABEL_COUNT: u32 = 6;
pub const X_LABEL_COUNT: u32 = 4;
pub const POINT_RADIUS: u32 = 3;
pub const EMPTY_TITLE: &str = "No data available";
pub const EMPTY_SUBTITLE: &str = "for the selected time range";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartStyle {
    pub background: Rgb,
    pub grid: Rgb,
    pub axis: Rgb,
    pub label: Rgb,
    pub muted: Rgb,
    pub banner_fill: Rgb,
    pub banner_text: Rgb,
    pub font_size: f64,
    pub line_width: u32,
}

impl Default for ChartStyle {
    fn default() -> Self {
        Self {
            background: Rgb(255, 255, 255),
            grid: Rgb(229, 231, 235),
            axis: Rgb(107, 114, 128),
            label: Rgb(55, 65, 81),
            muted: Rgb(156, 163, 175),
            banner_fill: Rgb(254, 226, 226),
            banner_text: Rgb(153, 27, 27),
            font_size: 12.0,
            line_width: 2,
        }
    }
}

/// Everything one chart draw needs. `samples` must already be windowed and
/// in ascending time order.
#[derive(Debug, Clone, Copy)]
pub struct ChartInput<'a> {
    pub samples: &'a [Sample],
    pub unit: &'a str,
    pub color: Rgb,
    pub window: DisplayWindow,
    pub banner: Option<&'a str>,
}

impl<'a> ChartInput<'a> {
    pub fn for_field(field: Field, samples: &'a [Sample], window: DisplayWindow) -> Self {
        Self {
            samples,
            unit: field.unit(),
            color: field.color().into(),
            window,
            banner: None,
        }
    }

    pub fn with_banner(mut self, banner: Option<&'a str>) -> Self {
        self.banner = banner;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChartRenderer {
    style: ChartStyle,
}

impl ChartRenderer {
    pub fn new(style: ChartStyle) -> Self {
        Self { style }
    }

    /// Draws one chart. Returns the scale used, or `None` for the empty state.
    pub fn render<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        input: &ChartInput<'_>,
    ) -> Result<Option<Scale>, SurfaceError> {
        let (width, height) = surface.size();
        let layout = ChartLayout::new(width, height);
        surface.clear(self.style.background)?;

        let Some(scale) = Scale::from_samples(input.samples) else {
            self.draw_empty_state(surface, &layout)?;
            self.draw_banner(surface, &layout, input.banner)?;
            return Ok(None);
        };

        self.draw_grid(surface, &layout)?;
        self.draw_axes(surface, &layout, &scale, input)?;

        let points: Vec<Point> = input
            .samples
            .iter()
            .map(|sample| layout.point_for(sample, &scale))
            .collect();
        if points.len() >= 2 {
            surface.polyline(&points, input.color, self.style.line_width)?;
        }
        for point in &points {
            surface.filled_circle(*point, POINT_RADIUS, input.color)?;
        }

        self.draw_banner(surface, &layout, input.banner)?;
        Ok(Some(scale))
    }

    fn text_spec(&self, color: Rgb, anchor: Anchor) -> TextSpec {
        TextSpec {
            size: self.style.font_size,
            color,
            anchor,
        }
    }

    fn draw_empty_state<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        layout: &ChartLayout,
    ) -> Result<(), SurfaceError> {
        let center = layout.center();
        let spec = self.text_spec(self.style.muted, Anchor::Middle);
        surface.text(EMPTY_TITLE, Point::new(center.x, center.y - 10.0), spec)?;
        surface.text(EMPTY_SUBTITLE, Point::new(center.x, center.y + 10.0), spec)
    }

    fn draw_grid<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        layout: &ChartLayout,
    ) -> Result<(), SurfaceError> {
        let divisions = f64::from(GRID_DIVISIONS);
        for i in 0..=GRID_DIVISIONS {
            let y = layout.top() + layout.content_height() * f64::from(i) / divisions;
            surface.line(
                Point::new(layout.left(), y),
                Point::new(layout.right(), y),
                self.style.grid,
                1,
            )?;
        }
        for i in 0..=GRID_DIVISIONS {
            let x = layout.left() + layout.content_width() * f64::from(i) / divisions;
            surface.line(
                Point::new(x, layout.top()),
                Point::new(x, layout.bottom()),
                self.style.grid,
                1,
            )?;
        }
        Ok(())
    }

    fn draw_axes<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        layout: &ChartLayout,
        scale: &Scale,
        input: &ChartInput<'_>,
    ) -> Result<(), SurfaceError> {
        let origin = Point::new(layout.left(), layout.bottom());
        surface.line(
            Point::new(layout.left(), layout.top()),
            origin,
            self.style.axis,
            1,
        )?;
        surface.line(
            origin,
            Point::new(layout.right(), layout.bottom()),
            self.style.axis,
            1,
        )?;

        let y_steps = f64::from(Y_LABEL_COUNT - 1);
        let y_spec = self.text_spec(self.style.label, Anchor::End);
        for i in 0..Y_LABEL_COUNT {
            let t = f64::from(i) / y_steps;
            let y = layout.top() + layout.content_height() * t;
            let value = scale.value_at(1.0 - t);
            surface.text(
                &format_value(value, input.unit),
                Point::new(layout.left() - 8.0, y),
                y_spec,
            )?;
        }

        let x_steps = f64::from(X_LABEL_COUNT - 1);
        let x_spec = self.text_spec(self.style.label, Anchor::Middle);
        let granularity = input.window.label_granularity();
        for i in 0..X_LABEL_COUNT {
            let t = f64::from(i) / x_steps;
            let x = layout.left() + layout.content_width() * t;
            surface.text(
                &format_axis_time(scale.time_at(t), granularity),
                Point::new(x, layout.bottom() + 20.0),
                x_spec,
            )?;
        }
        Ok(())
    }

    fn draw_banner<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        layout: &ChartLayout,
        banner: Option<&str>,
    ) -> Result<(), SurfaceError> {
        let Some(message) = banner.map(str::trim).filter(|m| !m.is_empty()) else {
            return Ok(());
        };
        surface.filled_rect(
            Point::new(0.0, 0.0),
            Point::new(f64::from(layout.width), layout.top() - 4.0),
            self.style.banner_fill,
        )?;
        surface.text(
            message,
            Point::new(layout.left(), (layout.top() - 4.0) / 2.0),
            self.text_spec(self.style.banner_text, Anchor::Start),
        )
    }
}
