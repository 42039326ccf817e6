//! Affine georeferencing for rasters

/// North-up affine transformation between cell indices and map coordinates.
///
/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height
/// ```
///
/// `pixel_height` is negative for the usual top-down row order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Cell size in X
    pub pixel_width: f64,
    /// Cell size in Y (usually negative)
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Map coordinates of the centre of cell (col, row)
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Cell size (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Same origin, cells `factor` times larger
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            pixel_width: self.pixel_width * factor,
            pixel_height: self.pixel_height * factor,
            ..*self
        }
    }

    /// Bounding box (min_x, min_y, max_x, max_y) of a `width` x `height` grid
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let x1 = self.origin_x + width as f64 * self.pixel_width;
        let y1 = self.origin_y + height as f64 * self.pixel_height;
        (
            self.origin_x.min(x1),
            self.origin_y.min(y1),
            self.origin_x.max(x1),
            self.origin_y.max(y1),
        )
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}
