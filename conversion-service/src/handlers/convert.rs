use crate::converters::ConversionOptions;
use crate::services::UploadedFile;
use crate::startup::AppState;
use axum::{
    extract::{multipart::Field, Multipart, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use bytes::BytesMut;
use service_core::error::AppError;
use service_core::observability::extract_request_id;

/// Optional switches sent alongside the file; unset ones use the configured defaults.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormFlags {
    pub do_ocr: Option<bool>,
    pub do_table_structure: Option<bool>,
    pub do_picture_description: Option<bool>,
}

/// `POST /convert` and `POST /v1/convert/form`.
pub async fn convert_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let max_bytes = state.config.upload.max_bytes;
    let mut file: Option<UploadedFile> = None;
    let mut flags = FormFlags::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::BadRequest(anyhow::anyhow!("Failed to read multipart field: {}", e))
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|n| !n.trim().is_empty())
                    .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing filename")))?;
                let data = read_limited(field, max_bytes).await?;
                file = Some(UploadedFile {
                    file_name,
                    data: data.freeze(),
                });
            }
            "do_ocr" => flags.do_ocr = Some(parse_flag(&name, &field_text(field).await?)?),
            "do_table_structure" => {
                flags.do_table_structure = Some(parse_flag(&name, &field_text(field).await?)?)
            }
            "do_picture_description" | "generate_images" => {
                flags.do_picture_description = Some(parse_flag(&name, &field_text(field).await?)?)
            }
            _ => tracing::debug!(field = %name, "Ignoring unknown form field"),
        }
    }

    let file =
        file.ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("No file uploaded")))?;

    let defaults = &state.config.defaults;
    let options = ConversionOptions {
        do_ocr: flags.do_ocr.unwrap_or(defaults.do_ocr),
        do_table_structure: flags.do_table_structure.unwrap_or(defaults.do_table_structure),
        do_picture_description: flags
            .do_picture_description
            .unwrap_or(defaults.do_picture_description),
        request_id: extract_request_id(&headers),
    };

    let response = state.conversion.convert(file, options).await?;
    Ok(Json(response))
}

/// Read a file field, rejecting it as soon as it grows past `max_bytes`.
async fn read_limited(mut field: Field<'_>, max_bytes: usize) -> Result<BytesMut, AppError> {
    let mut data = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(|e| {
        AppError::BadRequest(anyhow::anyhow!("Failed to read file bytes: {}", e))
    })? {
        if data.len() + chunk.len() > max_bytes {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "File too large (max {} bytes)",
                max_bytes
            )));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn field_text(field: Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Failed to read form field: {}", e)))
}

pub fn parse_flag(name: &str, value: &str) -> Result<bool, AppError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(AppError::BadRequest(anyhow::anyhow!(
            "Invalid value '{}' for '{}': expected true or false",
            other,
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_values() {
        for truthy in ["true", "TRUE", " 1 ", "yes", "on"] {
            assert!(parse_flag("do_ocr", truthy).unwrap());
        }
        for falsy in ["false", "0", "No", "off"] {
            assert!(!parse_flag("do_ocr", falsy).unwrap());
        }
        assert!(matches!(
            parse_flag("do_ocr", "maybe"),
            Err(AppError::BadRequest(_))
        ));
    }
}
