use serde::{Deserialize, Serialize};

/// US Letter in PDF points, reported when the converter gives no page sizes.
pub const DEFAULT_PAGE_SIZE: PageSize = PageSize {
    width: 612.0,
    height: 792.0,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversionResponse {
    pub document: DocumentBody,
    pub status: ConversionStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Seconds spent in the converter and shaping.
    pub processing_time: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConversionStatus {
    Success,
    Fallback,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentBody {
    pub filename: String,
    pub text: String,
    pub elements: Vec<Element>,
    pub pages: Vec<PageInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    Text {
        content: String,
        label: String,
        page: u32,
    },
    Table {
        rows: Vec<Vec<String>>,
        page: u32,
    },
    Image {
        url: Option<String>,
        caption: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        descriptions: Vec<String>,
        page: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageInfo {
    pub page: u32,
    pub size: PageSize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl DocumentBody {
    /// Canned document returned when the converter cannot produce one.
    pub fn placeholder(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            text: format!(
                "Content of '{}' could not be extracted: document conversion is unavailable.",
                filename
            ),
            elements: Vec::new(),
            pages: vec![PageInfo {
                page: 1,
                size: DEFAULT_PAGE_SIZE,
            }],
        }
    }
}
