use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::chart::scale::Point;

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("drawing failed: {0}")]
    Draw(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl From<(u8, u8, u8)> for Rgb {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self(r, g, b)
    }
}

impl From<Rgb> for RGBColor {
    fn from(color: Rgb) -> Self {
        RGBColor(color.0, color.1, color.2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Start,
    Middle,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextSpec {
    pub size: f64,
    pub color: Rgb,
    pub anchor: Anchor,
}

/// Minimal pixel surface the chart renderer draws onto.
pub trait Surface {
    fn size(&self) -> (u32, u32);

    fn clear(&mut self, color: Rgb) -> Result<(), SurfaceError>;

    fn line(&mut self, from: Point, to: Point, color: Rgb, width: u32) -> Result<(), SurfaceError>;

    fn polyline(&mut self, points: &[Point], color: Rgb, width: u32) -> Result<(), SurfaceError>;

    fn filled_circle(&mut self, center: Point, radius: u32, color: Rgb)
        -> Result<(), SurfaceError>;

    fn filled_rect(&mut self, top_left: Point, bottom_right: Point, color: Rgb)
        -> Result<(), SurfaceError>;

    fn text(&mut self, text: &str, at: Point, spec: TextSpec) -> Result<(), SurfaceError>;
}

fn pixel(point: Point) -> (i32, i32) {
    (point.x.round() as i32, point.y.round() as i32)
}

fn draw_err<E: std::fmt::Display>(err: E) -> SurfaceError {
    SurfaceError::Draw(err.to_string())
}

/// SVG surface backed by plotters, writing into a caller-owned buffer.
pub struct SvgSurface<'a> {
    area: DrawingArea<SVGBackend<'a>, Shift>,
    size: (u32, u32),
}

impl<'a> SvgSurface<'a> {
    pub fn new(buffer: &'a mut String, width: u32, height: u32) -> Self {
        let area = SVGBackend::with_string(buffer, (width, height)).into_drawing_area();
        Self {
            area,
            size: (width, height),
        }
    }

    pub fn finish(self) -> Result<(), SurfaceError> {
        self.area.present().map_err(draw_err)
    }
}

impl Surface for SvgSurface<'_> {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn clear(&mut self, color: Rgb) -> Result<(), SurfaceError> {
        self.area.fill(&RGBColor::from(color)).map_err(draw_err)
    }

    fn line(&mut self, from: Point, to: Point, color: Rgb, width: u32) -> Result<(), SurfaceError> {
        self.polyline(&[from, to], color, width)
    }

    fn polyline(&mut self, points: &[Point], color: Rgb, width: u32) -> Result<(), SurfaceError> {
        let coords: Vec<(i32, i32)> = points.iter().copied().map(pixel).collect();
        self.area
            .draw(&PathElement::new(
                coords,
                RGBColor::from(color).stroke_width(width),
            ))
            .map_err(draw_err)
    }

    fn filled_circle(
        &mut self,
        center: Point,
        radius: u32,
        color: Rgb,
    ) -> Result<(), SurfaceError> {
        self.area
            .draw(&Circle::new(
                pixel(center),
                radius,
                RGBColor::from(color).filled(),
            ))
            .map_err(draw_err)
    }

    fn filled_rect(
        &mut self,
        top_left: Point,
        bottom_right: Point,
        color: Rgb,
    ) -> Result<(), SurfaceError> {
        self.area
            .draw(&Rectangle::new(
                [pixel(top_left), pixel(bottom_right)],
                RGBColor::from(color).filled(),
            ))
            .map_err(draw_err)
    }

    fn text(&mut self, text: &str, at: Point, spec: TextSpec) -> Result<(), SurfaceError> {
        let h_pos = match spec.anchor {
            Anchor::Start => HPos::Left,
            Anchor::Middle => HPos::Center,
            Anchor::End => HPos::Right,
        };
        let style = ("sans-serif", spec.size)
            .into_font()
            .color(&RGBColor::from(spec.color))
            .pos(Pos::new(h_pos, VPos::Center));
        self.area
            .draw(&Text::new(text.to_string(), pixel(at), style))
            .map_err(draw_err)
    }
}

/// Renders with `draw` onto a fresh SVG document and returns its markup.
pub fn render_svg<F>(width: u32, height: u32, draw: F) -> Result<String, SurfaceError>
where
    F: FnOnce(&mut SvgSurface<'_>) -> Result<(), SurfaceError>,
{
    let mut buffer = String::new();
    {
        let mut surface = SvgSurface::new(&mut buffer, width, height);
        draw(&mut surface)?;
        surface.finish()?;
    }
    Ok(buffer)
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Clear(Rgb),
    Line { from: Point, to: Point, color: Rgb },
    Polyline { points: Vec<Point>, color: Rgb },
    Circle { center: Point, radius: u32, color: Rgb },
    Rect { top_left: Point, bottom_right: Point, color: Rgb },
    Text { text: String, at: Point },
}

/// Captures draw calls instead of producing pixels.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    width: u32,
    height: u32,
    pub ops: Vec<DrawOp>,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ops: Vec::new(),
        }
    }

    pub fn texts(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&DrawOp) -> bool) -> usize {
        self.ops.iter().filter(|op| predicate(op)).count()
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self, color: Rgb) -> Result<(), SurfaceError> {
        self.ops.push(DrawOp::Clear(color));
        Ok(())
    }

    fn line(&mut self, from: Point, to: Point, color: Rgb, _width: u32) -> Result<(), SurfaceError> {
        self.ops.push(DrawOp::Line { from, to, color });
        Ok(())
    }

    fn polyline(&mut self, points: &[Point], color: Rgb, _width: u32) -> Result<(), SurfaceError> {
        self.ops.push(DrawOp::Polyline {
            points: points.to_vec(),
            color,
        });
        Ok(())
    }

    fn filled_circle(
        &mut self,
        center: Point,
        radius: u32,
        color: Rgb,
    ) -> Result<(), SurfaceError> {
        self.ops.push(DrawOp::Circle {
            center,
            radius,
            color,
        });
        Ok(())
    }

    fn filled_rect(
        &mut self,
        top_left: Point,
        bottom_right: Point,
        color: Rgb,
    ) -> Result<(), SurfaceError> {
        self.ops.push(DrawOp::Rect {
            top_left,
            bottom_right,
            color,
        });
        Ok(())
    }

    fn text(&mut self, text: &str, at: Point, _spec: TextSpec) -> Result<(), SurfaceError> {
        self.ops.push(DrawOp::Text {
            text: text.to_string(),
            at,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn svg_surface_emits_markup() {
        let svg = render_svg(200, 100, |surface| {
            surface.clear(Rgb(255, 255, 255))?;
            surface.line(
                Point::new(0.0, 0.0),
                Point::new(200.0, 100.0),
                Rgb(0, 0, 0),
                1,
            )?;
            surface.filled_circle(Point::new(50.0, 50.0), 3, Rgb(255, 0, 0))?;
            surface.text(
                "hello",
                Point::new(10.0, 10.0),
                TextSpec {
                    size: 12.0,
                    color: Rgb(0, 0, 0),
                    anchor: Anchor::Start,
                },
            )
        })
        .unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("<circle"));
        assert!(svg.contains("hello"));
    }

    #[test]
    fn recording_surface_keeps_call_order() {
        let mut surface = RecordingSurface::new(10, 10);
        surface.clear(Rgb(1, 2, 3)).unwrap();
        surface
            .filled_circle(Point::new(1.0, 1.0), 3, Rgb(0, 0, 0))
            .unwrap();
        assert_eq!(surface.ops.len(), 2);
        assert_eq!(surface.ops[0], DrawOp::Clear(Rgb(1, 2, 3)));
        assert_eq!(surface.count(|op| matches!(op, DrawOp::Circle { .. })), 1);
    }
}
