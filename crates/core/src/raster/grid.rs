//! Main Raster type

use crate::error::{Error, Result};
use crate::raster::GeoTransform;
use ndarray::Array2;

/// A georeferenced single-band grid of `f64` cells.
///
/// Masked cells are stored as NaN; an optional explicit nodata value is
/// folded into NaN on construction via [`Raster::mask_nodata`].
#[derive(Debug, Clone)]
pub struct Raster {
    /// Raster data stored in row-major order (row, col)
    data: Array2<f64>,
    /// Affine transformation
    transform: GeoTransform,
}

impl Raster {
    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            data: Array2::from_elem((rows, cols), value),
            transform: GeoTransform::default(),
        }
    }

    /// Create a raster from row-major data
    pub fn from_vec(data: Vec<f64>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<f64>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
        }
    }

    /// Create a raster sharing this raster's georeferencing with new data
    pub fn with_data(&self, data: Array2<f64>) -> Result<Self> {
        if data.dim() != self.shape() {
            let (er, ec) = self.shape();
            let (ar, ac) = data.dim();
            return Err(Error::SizeMismatch { er, ec, ar, ac });
        }
        Ok(Self {
            data,
            transform: self.transform,
        })
    }

    /// Builder-style georeferencing
    pub fn with_transform(mut self, transform: GeoTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Replace cells equal to `nodata` by NaN
    pub fn mask_nodata(&mut self, nodata: f64) {
        self.data.mapv_inplace(|v| {
            if (v - nodata).abs() < f64::EPSILON * 100.0 {
                f64::NAN
            } else {
                v
            }
        });
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.data.get((row, col)).copied()
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        match self.data.get_mut((row, col)) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(Error::InvalidParameter {
                name: "cell",
                value: format!("({}, {})", row, col),
                reason: format!("outside {}x{} raster", self.rows(), self.cols()),
            }),
        }
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    // Metadata

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Cell size in CRS units (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    /// Geographic coordinates of the centre of cell (row, col)
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    // Resampling

    /// Aggregate `factor` x `factor` blocks into their NaN-skipping mean.
    ///
    /// Partial blocks at the right and bottom edges are kept. A block with no
    /// valid cell stays NaN.
    pub fn block_mean(&self, factor: usize) -> Raster {
        if factor <= 1 {
            return self.clone();
        }
        let (rows, cols) = self.shape();
        let out_rows = rows.div_ceil(factor);
        let out_cols = cols.div_ceil(factor);

        let mut out = Array2::from_elem((out_rows, out_cols), f64::NAN);
        for ((orow, ocol), cell) in out.indexed_iter_mut() {
            let mut sum = 0.0;
            let mut n = 0usize;
            for row in (orow * factor)..((orow + 1) * factor).min(rows) {
                for col in (ocol * factor)..((ocol + 1) * factor).min(cols) {
                    let v = self.data[(row, col)];
                    if !v.is_nan() {
                        sum += v;
                        n += 1;
                    }
                }
            }
            if n > 0 {
                *cell = sum / n as f64;
            }
        }

        Raster {
            data: out,
            transform: self.transform.scaled(factor as f64),
        }
    }

    // Statistics

    /// Calculate basic statistics (min, max, mean, count of valid cells)
    pub fn statistics(&self) -> RasterStatistics {
        let mut min: Option<f64> = None;
        let mut max: Option<f64> = None;
        let mut sum = 0.0;
        let mut count = 0usize;

        for &value in self.data.iter() {
            if value.is_nan() {
                continue;
            }
            min = Some(min.map_or(value, |m| m.min(value)));
            max = Some(max.map_or(value, |m| m.max(value)));
            sum += value;
            count += 1;
        }

        RasterStatistics {
            min,
            max,
            mean: (count > 0).then(|| sum / count as f64),
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone)]
pub struct RasterStatistics {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_raster_access() {
        let mut raster = Raster::filled(10, 10, 0.0);
        raster.set(5, 5, 42.0).unwrap();
        assert_eq!(raster.get(5, 5), Some(42.0));
        assert!(raster.set(10, 0, 1.0).is_err());
    }

    #[test]
    fn test_statistics_skip_nan() {
        let raster = Raster::from_vec(vec![1.0, f64::NAN, 3.0, 5.0], 2, 2).unwrap();
        let stats = raster.statistics();
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(5.0));
        assert_relative_eq!(stats.mean.unwrap(), 3.0);
        assert_eq!(stats.valid_count, 3);
        assert_eq!(stats.nodata_count, 1);
    }

    #[test]
    fn test_block_mean_partial_blocks() {
        let raster = Raster::from_vec((0..9).map(|v| v as f64).collect(), 3, 3)
            .unwrap()
            .with_transform(GeoTransform::new(0.0, 3.0, 1.0, -1.0));
        let coarse = raster.block_mean(2);
        assert_eq!(coarse.shape(), (2, 2));
        // (0 + 1 + 3 + 4) / 4
        assert_relative_eq!(coarse.get(0, 0).unwrap(), 2.0);
        // (8) alone in the corner block
        assert_relative_eq!(coarse.get(1, 1).unwrap(), 8.0);
        assert_relative_eq!(coarse.cell_size(), 2.0);
    }

    #[test]
    fn test_mask_nodata() {
        let mut raster = Raster::from_vec(vec![-9999.0, 1.0], 1, 2).unwrap();
        raster.mask_nodata(-9999.0);
        assert!(raster.get(0, 0).unwrap().is_nan());
        assert_eq!(raster.get(0, 1), Some(1.0));
    }
}
