//! Otsu's automatic threshold
//!
//! Global bi-level threshold maximizing the between-class variance of a
//! histogram. The histogram is fetched from the backend once per image; the
//! scan itself is pure and bit-reproducible.
//!
//! Reference:
//! Otsu, N. (1979). A threshold selection method from gray-level histograms.
//! *IEEE Transactions on Systems, Man, and Cybernetics*, 9(1), 62-66.

use geoclaim_core::backend::{HistogramSummary, RasterBackend, MAX_HISTOGRAM_BUCKETS};
use geoclaim_core::expr::Image;
use geoclaim_core::{Algorithm, Aoi, Error, Result};
use tracing::debug;

/// Otsu threshold over a histogram summary
#[derive(Debug, Clone, Default)]
pub struct OtsuThreshold;

impl Algorithm for OtsuThreshold {
    type Input = HistogramSummary;
    type Output = f64;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "OtsuThreshold"
    }

    fn description(&self) -> &'static str {
        "Histogram threshold maximizing between-class variance (Otsu 1979)"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        otsu_threshold(&input, "histogram")
    }
}

/// Threshold value of a histogram whose buckets are in ascending order.
///
/// Ties keep the first maximizing bucket. When no split separates two
/// non-empty classes the first bucket's value is returned.
///
/// # Arguments
/// * `histogram` - Bucket means and counts
/// * `band` - Band name, used in the error when the histogram is unusable
pub fn otsu_threshold(histogram: &HistogramSummary, band: &str) -> Result<f64> {
    histogram.validate(band)?;

    let bins = &histogram.bucket_means;
    let total = histogram.total() as f64;
    let sum_total: f64 = bins
        .iter()
        .zip(&histogram.counts)
        .map(|(&b, &c)| b * c as f64)
        .sum();
    let total_mean = sum_total / total;

    let mut weight_bg = 0.0;
    let mut sum_bg = 0.0;
    let mut max_between = -1.0;
    let mut threshold = bins[0];

    for (&bin, &count) in bins.iter().zip(&histogram.counts) {
        let count = count as f64;
        weight_bg += count;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }

        sum_bg += bin * count;
        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (total_mean * total - sum_bg) / weight_fg;
        let between = weight_bg * weight_fg * (mean_bg - mean_fg).powi(2);

        if between > max_between {
            max_between = between;
            threshold = bin;
        }
    }

    Ok(threshold)
}

/// Threshold `image` over the AOI at `scale` and return `image > t`,
/// named `<band>_mask`.
///
/// Materializes exactly one histogram.
pub fn otsu_mask(backend: &dyn RasterBackend, image: &Image, aoi: &Aoi, scale: f64) -> Result<Image> {
    let histogram = backend
        .histogram(image, aoi, scale, MAX_HISTOGRAM_BUCKETS)?
        .ok_or_else(|| Error::EmptyHistogram {
            band: image.name().to_string(),
            reason: "no valid pixels in the area of interest".to_string(),
        })?;
    let threshold = otsu_threshold(&histogram, image.name())?;
    debug!(
        "otsu threshold for {}: {} over {} buckets",
        image.name(),
        threshold,
        histogram.counts.len()
    );
    Ok(image
        .gt(threshold)
        .rename(&format!("{}_mask", image.name())))
}
