//! Subset of the `DoclingDocument` JSON schema that the response shaper reads.
//!
//! Unknown fields are ignored so newer Docling releases keep parsing.

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoclingDocument {
    #[serde(default)]
    pub body: Option<NodeItem>,
    #[serde(default)]
    pub groups: Vec<NodeItem>,
    #[serde(default)]
    pub texts: Vec<TextItem>,
    #[serde(default)]
    pub tables: Vec<TableItem>,
    #[serde(default)]
    pub pictures: Vec<PictureItem>,
    /// Keyed by page number as a string (`"1"`, `"2"`, ...).
    #[serde(default)]
    pub pages: BTreeMap<String, PageItem>,
}

/// `{"$ref": "#/texts/3"}`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RefItem {
    #[serde(rename = "$ref")]
    pub cref: String,
}

/// Parent of running headers, footers and other page furniture.
pub const FURNITURE_REF: &str = "#/furniture";

/// Resolved target of a [`RefItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ItemRef {
    Text(usize),
    Table(usize),
    Picture(usize),
    Group(usize),
    Body,
}

impl RefItem {
    pub fn resolve(&self) -> Option<ItemRef> {
        let path = self.cref.strip_prefix("#/")?;
        if path == "body" {
            return Some(ItemRef::Body);
        }
        let (kind, index) = path.split_once('/')?;
        let index: usize = index.parse().ok()?;
        match kind {
            "texts" => Some(ItemRef::Text(index)),
            "tables" => Some(ItemRef::Table(index)),
            "pictures" => Some(ItemRef::Picture(index)),
            "groups" => Some(ItemRef::Group(index)),
            _ => None,
        }
    }
}

/// Body and group nodes: containers that only order their children.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeItem {
    #[serde(default)]
    pub children: Vec<RefItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvenanceItem {
    pub page_no: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextItem {
    /// `None` only for hand-built documents; Docling always sets it.
    #[serde(default)]
    pub parent: Option<RefItem>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub prov: Vec<ProvenanceItem>,
    #[serde(default)]
    pub children: Vec<RefItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableItem {
    /// `None` only for hand-built documents; Docling always sets it.
    #[serde(default)]
    pub parent: Option<RefItem>,
    /// Captions, footnotes and text found inside the item.
    #[serde(default)]
    pub children: Vec<RefItem>,
    #[serde(default)]
    pub prov: Vec<ProvenanceItem>,
    #[serde(default)]
    pub captions: Vec<RefItem>,
    #[serde(default)]
    pub data: TableData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableData {
    #[serde(default)]
    pub table_cells: Vec<TableCell>,
    #[serde(default)]
    pub num_rows: usize,
    #[serde(default)]
    pub num_cols: usize,
    #[serde(default)]
    pub grid: Vec<Vec<TableCell>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableCell {
    #[serde(default)]
    pub text: String,
    #[serde(default = "one")]
    pub row_span: usize,
    #[serde(default = "one")]
    pub col_span: usize,
    #[serde(default)]
    pub start_row_offset_idx: usize,
    #[serde(default)]
    pub end_row_offset_idx: usize,
    #[serde(default)]
    pub start_col_offset_idx: usize,
    #[serde(default)]
    pub end_col_offset_idx: usize,
}

fn one() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct PictureItem {
    /// `None` only for hand-built documents; Docling always sets it.
    #[serde(default)]
    pub parent: Option<RefItem>,
    /// Captions, footnotes and text found inside the item.
    #[serde(default)]
    pub children: Vec<RefItem>,
    #[serde(default)]
    pub prov: Vec<ProvenanceItem>,
    #[serde(default)]
    pub captions: Vec<RefItem>,
    #[serde(default)]
    pub annotations: Vec<PictureAnnotation>,
    #[serde(default)]
    pub image: Option<ImageRef>,
}

/// Picture annotations are a tagged family in Docling; only descriptions
/// produced by the vision model matter here, the rest collapse into `Other`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PictureAnnotation {
    Description {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageRef {
    #[serde(default)]
    pub mimetype: Option<String>,
    /// A `data:` URI when images are embedded, otherwise a path relative to
    /// the converter's output directory.
    pub uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageItem {
    pub size: Size,
    #[serde(default)]
    pub page_no: Option<u32>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// First provenance page, or 1 when the converter recorded none.
pub fn page_of(prov: &[ProvenanceItem]) -> u32 {
    prov.first().map(|p| p.page_no).unwrap_or(1)
}
