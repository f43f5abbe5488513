//! Document model read and annotated by the description stage.
//!
//! The parser that produces a [`Document`] lives outside this crate. What
//! reaches us is already flattened: `items` holds every node in reading
//! order (text fragments, tables, groups and pictures interleaved), and
//! `pages` maps a 1-indexed page number to its geometry.
//!
//! The stage never adds, removes or reorders items. The only mutation is
//! appending a [`PictureDescriptionData`] to a picture's `annotations`.

use crate::error::PicDescError;
use crate::pipeline::encode;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

// ── Geometry ─────────────────────────────────────────────────────────────

/// Coordinate origin for bounding boxes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordOrigin {
    /// Origin at bottom-left (PDF coordinate system).
    #[serde(rename = "BOTTOMLEFT")]
    BottomLeft,
    /// Origin at top-left (most image formats).
    #[default]
    #[serde(rename = "TOPLEFT")]
    TopLeft,
}

/// Width/height pair in points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Bounding box in page coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub l: f64,
    pub t: f64,
    pub r: f64,
    pub b: f64,
    #[serde(default)]
    pub coord_origin: CoordOrigin,
}

impl BoundingBox {
    pub const fn new(l: f64, t: f64, r: f64, b: f64, coord_origin: CoordOrigin) -> Self {
        Self {
            l,
            t,
            r,
            b,
            coord_origin,
        }
    }

    pub fn width(&self) -> f64 {
        self.r - self.l
    }

    /// Height regardless of origin (`|t - b|`).
    pub fn height(&self) -> f64 {
        (self.t - self.b).abs()
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }
}

/// Geometry of one page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    pub size: Size,
    pub page_no: usize,
}

/// Where an item came from: page number (1-indexed) and bounding box.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceItem {
    pub page_no: usize,
    pub bbox: BoundingBox,
}

// ── Items ────────────────────────────────────────────────────────────────

/// A generated picture description and the backend that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PictureDescriptionData {
    pub text: String,
    pub provenance: String,
}

/// A rendered picture bitmap embedded as a `data:` URI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub mimetype: String,
    #[serde(default)]
    pub dpi: u32,
    #[serde(default)]
    pub size: Size,
    pub uri: String,
}

impl ImageRef {
    /// Embed a rendered bitmap as a PNG data URI.
    pub fn from_image(img: &DynamicImage, dpi: u32) -> Result<Self, PicDescError> {
        Ok(Self {
            mimetype: "image/png".to_string(),
            dpi,
            size: Size::new(img.width() as f64, img.height() as f64),
            uri: encode::to_data_uri(img)?,
        })
    }

    /// Decode the embedded bitmap.
    pub fn load(&self) -> Result<DynamicImage, PicDescError> {
        encode::decode_data_uri(&self.uri)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextItem {
    pub self_ref: String,
    #[serde(default)]
    pub label: String,
    pub text: String,
    #[serde(default)]
    pub prov: Vec<ProvenanceItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableItem {
    pub self_ref: String,
    #[serde(default)]
    pub prov: Vec<ProvenanceItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupItem {
    pub self_ref: String,
    #[serde(default)]
    pub name: String,
}

/// A picture node. Identity is `self_ref`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PictureItem {
    pub self_ref: String,
    /// Pictures carry at most one provenance record; only the first is read.
    #[serde(default)]
    pub prov: Vec<ProvenanceItem>,
    #[serde(default)]
    pub annotations: Vec<PictureDescriptionData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
}

impl PictureItem {
    pub fn new(self_ref: impl Into<String>) -> Self {
        Self {
            self_ref: self_ref.into(),
            prov: Vec::new(),
            annotations: Vec::new(),
            image: None,
        }
    }

    pub fn with_prov(mut self, prov: ProvenanceItem) -> Self {
        self.prov.push(prov);
        self
    }

    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.image = Some(image);
        self
    }

    pub fn provenance(&self) -> Option<&ProvenanceItem> {
        self.prov.first()
    }
}

/// One node of the flattened document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocItem {
    Text(TextItem),
    Picture(PictureItem),
    Table(TableItem),
    Group(GroupItem),
}

impl DocItem {
    /// Convenience constructor for a plain paragraph.
    pub fn text(self_ref: impl Into<String>, text: impl Into<String>) -> Self {
        DocItem::Text(TextItem {
            self_ref: self_ref.into(),
            label: "text".to_string(),
            text: text.into(),
            prov: Vec::new(),
        })
    }

    pub fn self_ref(&self) -> &str {
        match self {
            DocItem::Text(t) => &t.self_ref,
            DocItem::Picture(p) => &p.self_ref,
            DocItem::Table(t) => &t.self_ref,
            DocItem::Group(g) => &g.self_ref,
        }
    }

    /// Text of text-bearing nodes; `None` for pictures, tables and groups.
    pub fn text_value(&self) -> Option<&str> {
        match self {
            DocItem::Text(t) => Some(&t.text),
            _ => None,
        }
    }

    pub fn as_picture(&self) -> Option<&PictureItem> {
        match self {
            DocItem::Picture(p) => Some(p),
            _ => None,
        }
    }
}

// ── Document ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub items: Vec<DocItem>,
    /// Page geometry keyed by 1-indexed page number.
    #[serde(default)]
    pub pages: BTreeMap<usize, PageInfo>,
}

impl Document {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn push(&mut self, item: DocItem) -> &mut Self {
        self.items.push(item);
        self
    }

    pub fn add_page(&mut self, page_no: usize, size: Size) -> &mut Self {
        self.pages.insert(page_no, PageInfo { size, page_no });
        self
    }

    /// All items in reading order.
    pub fn iterate_items(&self) -> impl Iterator<Item = &DocItem> {
        self.items.iter()
    }

    pub fn pictures(&self) -> impl Iterator<Item = &PictureItem> {
        self.items.iter().filter_map(DocItem::as_picture)
    }

    pub fn picture(&self, self_ref: &str) -> Option<&PictureItem> {
        self.pictures().find(|p| p.self_ref == self_ref)
    }

    pub fn page(&self, page_no: usize) -> Option<&PageInfo> {
        self.pages.get(&page_no)
    }

    /// Write a processed picture back into the document by identity.
    ///
    /// Returns `false` when no picture with that `self_ref` exists.
    pub fn replace_picture(&mut self, picture: PictureItem) -> bool {
        for item in &mut self.items {
            if let DocItem::Picture(existing) = item {
                if existing.self_ref == picture.self_ref {
                    *existing = picture;
                    return true;
                }
            }
        }
        false
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PicDescError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| PicDescError::DocumentLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let doc = Self::from_json_str(&raw).map_err(|e| PicDescError::DocumentLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!(
            "Loaded document '{}': {} items, {} pages",
            doc.name,
            doc.items.len(),
            doc.pages.len()
        );
        Ok(doc)
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<(), PicDescError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PicDescError::Internal(format!("serialise document: {e}")))?;
        std::fs::write(path, json).map_err(|source| PicDescError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        })
    }
}
