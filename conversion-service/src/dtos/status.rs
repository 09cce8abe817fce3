use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub converter: ConverterStatus,
    pub upload: UploadLimits,
    pub defaults: DefaultFlags,
    pub fallback: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ConverterStatus {
    pub backend: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadLimits {
    pub allowed_extensions: Vec<String>,
    pub max_bytes: usize,
}

#[derive(Debug, Serialize)]
pub struct DefaultFlags {
    pub do_ocr: bool,
    pub do_table_structure: bool,
    pub do_picture_description: bool,
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub endpoints: Vec<&'static str>,
}
