//! Pre/post change images
//!
//! - Index delta: `post - pre`, tagged `delta_<name>`
//! - RGB delta: mean absolute change over the resolved RGB triple

use super::indices::{resolve_rgb, spectral_index, SpectralIndex};
use geoclaim_core::backend::Composite;
use geoclaim_core::expr::Image;
use geoclaim_core::Result;

/// Name tag of the RGB change image
pub const RGB_DELTA: &str = "RGB_DELTA";

/// `post - pre`, tagged `delta_<name>`
pub fn delta(pre: &Image, post: &Image, name: &str) -> Image {
    post.subtract(pre).rename(&format!("delta_{}", name))
}

/// Delta of a spectral index computed on both composites
pub fn index_delta(pre: &Composite, post: &Composite, index: SpectralIndex) -> Result<Image> {
    let pre_index = spectral_index(pre, index)?;
    let post_index = spectral_index(post, index)?;
    Ok(delta(&pre_index, &post_index, index.name()))
}

/// `mean(|post_rgb - pre_rgb|)` across the three RGB bands, tagged `RGB_DELTA`.
///
/// The triple is resolved on the pre-event composite and selected from both.
pub fn rgb_delta(pre: &Composite, post: &Composite) -> Result<Image> {
    let triple = resolve_rgb(pre)?;
    let diffs = triple
        .iter()
        .map(|band| Ok(post.select(band)?.subtract(&pre.select(band)?).abs()))
        .collect::<Result<Vec<_>>>()?;
    Ok(Image::mean_of(&diffs).rename(RGB_DELTA))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoclaim_core::{DateWindow, Error};

    fn composite(id: &str, bands: &[&str]) -> Composite {
        Composite::new(
            id.into(),
            "TEST".into(),
            DateWindow::parse("2024-01-01", "2024-01-10").unwrap(),
            bands.iter().map(|b| b.to_string()).collect(),
        )
    }

    #[test]
    fn test_index_delta_tag() {
        let bands = ["B3", "B8", "B11", "B12"];
        let d = index_delta(&composite("pre", &bands), &composite("post", &bands), SpectralIndex::Nbr)
            .unwrap();
        assert_eq!(d.name(), "delta_NBR");
        assert_eq!(
            d.fingerprint(),
            "sub(nd(post:B8,post:B12),nd(pre:B8,pre:B12))"
        );
    }

    #[test]
    fn test_rgb_delta() {
        let bands = ["B2", "B3", "B4"];
        let d = rgb_delta(&composite("pre", &bands), &composite("post", &bands)).unwrap();
        assert_eq!(d.name(), RGB_DELTA);
        assert_eq!(
            d.fingerprint(),
            "mean(abs(sub(post:B4,pre:B4)),abs(sub(post:B3,pre:B3)),abs(sub(post:B2,pre:B2)))"
        );
    }

    #[test]
    fn test_rgb_delta_requires_triple() {
        let pre = composite("pre", &["B8", "B11"]);
        assert!(matches!(
            rgb_delta(&pre, &pre),
            Err(Error::UnresolvedBand { .. })
        ));
    }
}
