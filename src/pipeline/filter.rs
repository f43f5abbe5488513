//! Relevance filter: skip pictures that are too small relative to their page.
//!
//! Logos, bullets and decorative icons rarely deserve a description, and each
//! one costs a full VLM round trip. Comparing the picture's bounding-box area
//! to the page area is a cheap proxy for "is this a real figure".

use crate::document::{Document, PictureItem};
use tracing::debug;

/// Decides per picture whether it meets the configured area threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceFilter {
    threshold: f64,
}

impl RelevanceFilter {
    /// `threshold` is the minimum fraction (0–1) of the page the picture
    /// must cover.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// `true` when the picture should be described.
    ///
    /// Pictures without provenance, on an unknown page, or on a page with
    /// zero area cannot be evaluated and are always accepted. The boundary
    /// is inclusive: a picture covering exactly `threshold` is described.
    pub fn should_describe(&self, picture: &PictureItem, doc: &Document) -> bool {
        let Some(prov) = picture.provenance() else {
            return true;
        };
        let Some(page) = doc.page(prov.page_no) else {
            return true;
        };

        let page_area = page.size.area();
        if page_area <= 0.0 {
            return true;
        }

        let area_fraction = prov.bbox.area() / page_area;
        let keep = area_fraction >= self.threshold;
        if !keep {
            debug!(
                "Skipping {}: covers {:.4} of page {} (threshold {})",
                picture.self_ref, area_fraction, prov.page_no, self.threshold
            );
        }
        keep
    }
}
