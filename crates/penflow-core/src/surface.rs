//! Seam to the rendering and interaction collaborator.

use crate::pen::Pen;
use kurbo::{Rect, Size};

/// Paint target driven by the engine. Requests are fire-and-forget: the
/// implementation schedules actual painting and may coalesce them.
pub trait Surface {
    /// Request a repaint; `full` repaints everything instead of dirty pens.
    fn render(&mut self, _full: bool) {}

    /// Resize the surface. `None` keeps the current extent.
    fn resize(&mut self, _width: Option<f64>, _height: Option<f64>) {}

    fn size(&self) -> Size {
        Size::ZERO
    }

    /// Mark a world rect as needing repaint.
    fn invalidate(&mut self, _rect: Rect) {}

    /// The pen's `image` changed.
    fn load_image(&mut self, _pen: &Pen) {}

    /// Open a URL in a target context.
    fn open_url(&mut self, _url: &str, _target: &str) {}
}

/// Surface that ignores every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSurface;

impl Surface for NullSurface {}

/// Surface that records requests. Useful for hosts without a display and
/// for tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingSurface {
    pub size: Size,
    pub renders: usize,
    pub full_renders: usize,
    pub invalidated: Vec<Rect>,
    pub images: Vec<String>,
    pub opened: Vec<(String, String)>,
}

impl Surface for RecordingSurface {
    fn render(&mut self, full: bool) {
        self.renders += 1;
        if full {
            self.full_renders += 1;
        }
    }

    fn resize(&mut self, width: Option<f64>, height: Option<f64>) {
        self.size = Size::new(
            width.unwrap_or(self.size.width),
            height.unwrap_or(self.size.height),
        );
    }

    fn size(&self) -> Size {
        self.size
    }

    fn invalidate(&mut self, rect: Rect) {
        self.invalidated.push(rect);
    }

    fn load_image(&mut self, pen: &Pen) {
        self.images.push(pen.id.clone());
    }

    fn open_url(&mut self, url: &str, target: &str) {
        self.opened.push((url.to_string(), target.to_string()));
    }
}
