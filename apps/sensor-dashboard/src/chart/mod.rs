//! Windowing, layout and drawing of per-field sensor charts.

pub mod format;
pub mod hit_test;
pub mod render;
pub mod scale;
pub mod surface;
pub mod view;
pub mod window;

pub use hit_test::{nearest_sample, NearestSample, HIT_THRESHOLD_PX};
pub use render::{ChartInput, ChartRenderer, ChartStyle};
pub use scale::{ChartLayout, Padding, Point, Scale};
pub use surface::{render_svg, RecordingSurface, Surface, SurfaceError, SvgSurface};
pub use view::{ChartView, DashboardView, ResizeDebouncer, ViewSettings};
pub use window::{window_samples, DisplayWindow};
