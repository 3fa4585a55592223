//! Drawing surface and render geometry.
//!
//! The surface is a plain RGBA buffer plus the size it is displayed at.
//! Pixel size depends only on the page and the oversampling factor; zoom
//! changes the display size. Oversampling keeps text crisp when the host
//! scales the surface up.

use image::{Rgba, RgbaImage};

/// Background used when clearing the surface (opaque white, no alpha channel
/// visible to the host)
pub const CLEAR_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Default oversampling factor
pub const DEFAULT_OVERSAMPLE: f32 = 2.0;

/// Output geometry of one render
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderGeometry {
    /// Page size at zoom 1.0
    pub natural_width: f32,
    pub natural_height: f32,
    /// Pixels per display unit in the surface buffer
    pub oversample: f32,
    pub zoom: f32,
}

impl RenderGeometry {
    pub fn new(page_size: (f32, f32), zoom: f32, oversample: f32) -> Self {
        Self {
            natural_width: page_size.0.max(0.0),
            natural_height: page_size.1.max(0.0),
            oversample,
            zoom,
        }
    }

    /// Surface buffer size in pixels (at least 1x1)
    pub fn pixel_size(&self) -> (u32, u32) {
        let w = (self.natural_width * self.oversample).round().max(1.0) as u32;
        let h = (self.natural_height * self.oversample).round().max(1.0) as u32;
        (w, h)
    }

    /// Size the host should display the surface at
    pub fn display_size(&self) -> (f32, f32) {
        (self.natural_width * self.zoom, self.natural_height * self.zoom)
    }
}

/// Single mutable raster target, exclusively owned by the render scheduler
#[derive(Clone, Debug)]
pub struct Surface {
    pixels: RgbaImage,
    display_size: (f32, f32),
    /// (page, zoom) of the last successful paint
    painted: Option<(u32, f32)>,
}

impl Default for Surface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface {
    /// Empty 1x1 surface; sized on first render
    pub fn new() -> Self {
        Self {
            pixels: RgbaImage::from_pixel(1, 1, CLEAR_COLOR),
            display_size: (0.0, 0.0),
            painted: None,
        }
    }

    /// Clear contents and resize to `geometry`. Marks the surface unpainted.
    pub fn prepare(&mut self, geometry: &RenderGeometry) {
        let (w, h) = geometry.pixel_size();
        if self.pixels.dimensions() == (w, h) {
            for px in self.pixels.pixels_mut() {
                *px = CLEAR_COLOR;
            }
        } else {
            self.pixels = RgbaImage::from_pixel(w, h, CLEAR_COLOR);
        }
        self.display_size = geometry.display_size();
        self.painted = None;
    }

    pub(crate) fn mark_painted(&mut self, page: u32, zoom: f32) {
        self.painted = Some((page, zoom));
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut RgbaImage {
        &mut self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn display_size(&self) -> (f32, f32) {
        self.display_size
    }

    /// Page and zoom currently shown, None if the last render failed or
    /// nothing was painted yet
    pub fn painted(&self) -> Option<(u32, f32)> {
        self.painted
    }
}
