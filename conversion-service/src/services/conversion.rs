use crate::config::{FallbackMode, UploadConfig};
use crate::converters::{ConversionError, ConversionOptions, ConvertedDocument, Converter};
use crate::dtos::{ConversionResponse, ConversionStatus, DocumentBody};
use crate::services::metrics::{record_conversion, record_vlm_retry};
use crate::services::{shape_document, ImageStore};
use bytes::Bytes;
use service_core::error::AppError;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;

/// A document received on the upload form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Bytes,
}

/// Validate, convert and shape one upload.
#[derive(Clone)]
pub struct ConversionService {
    converter: Arc<dyn Converter>,
    images: Arc<ImageStore>,
    upload: UploadConfig,
    fallback: FallbackMode,
}

impl ConversionService {
    pub fn new(
        converter: Arc<dyn Converter>,
        images: Arc<ImageStore>,
        upload: UploadConfig,
        fallback: FallbackMode,
    ) -> Self {
        Self {
            converter,
            images,
            upload,
            fallback,
        }
    }

    pub fn converter(&self) -> &Arc<dyn Converter> {
        &self.converter
    }

    pub async fn convert(
        &self,
        file: UploadedFile,
        options: ConversionOptions,
    ) -> Result<ConversionResponse, AppError> {
        let started = Instant::now();
        let extension = validate_upload(&self.upload, &file.file_name, file.data.len())?;

        tracing::info!(
            filename = %file.file_name,
            size = file.data.len(),
            backend = %self.converter.name(),
            "Document conversion started"
        );

        // Removed when dropped, whichever way this function returns.
        let temp = self.write_temp_file(&file, &extension).await?;

        let mut errors = Vec::new();
        let outcome = self.run_converter(temp.path(), &options, &mut errors).await;

        let response = match outcome {
            Ok(converted) => {
                let document = shape_document(&converted, &file.file_name, &self.images).await;
                record_conversion(self.converter.name(), "success", started.elapsed());
                tracing::info!(
                    filename = %file.file_name,
                    elements = document.elements.len(),
                    pages = document.pages.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Document conversion completed"
                );
                ConversionResponse {
                    document,
                    status: ConversionStatus::Success,
                    errors,
                    processing_time: started.elapsed().as_secs_f64(),
                }
            }
            Err(e) => match self.fallback {
                FallbackMode::Placeholder => {
                    tracing::warn!(
                        filename = %file.file_name,
                        error = %e,
                        "Conversion failed, returning placeholder document"
                    );
                    record_conversion(self.converter.name(), "fallback", started.elapsed());
                    errors.push(e.to_string());
                    ConversionResponse {
                        document: DocumentBody::placeholder(&file.file_name),
                        status: ConversionStatus::Fallback,
                        errors,
                        processing_time: started.elapsed().as_secs_f64(),
                    }
                }
                FallbackMode::Error => {
                    tracing::error!(
                        filename = %file.file_name,
                        error = %e,
                        "Conversion failed"
                    );
                    record_conversion(self.converter.name(), "error", started.elapsed());
                    return Err(AppError::ProcessingError(e.to_string()));
                }
            },
        };

        Ok(response)
    }

    async fn write_temp_file(
        &self,
        file: &UploadedFile,
        extension: &str,
    ) -> Result<NamedTempFile, AppError> {
        let suffix = format!(".{}", extension);
        let mut builder = tempfile::Builder::new();
        builder.prefix("upload-").suffix(&suffix);

        let temp = match &self.upload.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create temporary upload file");
            AppError::from(e)
        })?;

        tokio::fs::write(temp.path(), &file.data).await?;
        Ok(temp)
    }

    /// Convert once, and once more without picture description if that was
    /// requested and the first attempt failed.
    async fn run_converter(
        &self,
        input: &Path,
        options: &ConversionOptions,
        errors: &mut Vec<String>,
    ) -> Result<ConvertedDocument, ConversionError> {
        match self.converter.convert(input, options).await {
            Ok(converted) => Ok(converted),
            Err(e) if options.do_picture_description && e.is_retryable() => {
                tracing::warn!(
                    error = %e,
                    "Conversion with picture description failed, retrying without it"
                );
                record_vlm_retry(self.converter.name());
                errors.push(format!("picture description disabled after error: {}", e));

                let retry = ConversionOptions {
                    do_picture_description: false,
                    ..options.clone()
                };
                self.converter.convert(input, &retry).await
            }
            Err(e) => Err(e),
        }
    }
}

/// Check the upload against the allow-list and size ceiling.
///
/// Returns the lowercase extension used as the temp file suffix.
pub fn validate_upload(
    config: &UploadConfig,
    file_name: &str,
    size: usize,
) -> Result<String, AppError> {
    if file_name.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("Missing filename")));
    }

    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "File '{}' has no extension; allowed: {}",
                file_name,
                config.allowed_extensions.join(", ")
            ))
        })?;

    if !config.allowed_extensions.iter().any(|e| *e == extension) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Unsupported file type '.{}'; allowed: {}",
            extension,
            config.allowed_extensions.join(", ")
        )));
    }

    if size == 0 {
        return Err(AppError::BadRequest(anyhow::anyhow!("Uploaded file is empty")));
    }

    if size > config.max_bytes {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "File too large ({} bytes, max {} bytes)",
            size,
            config.max_bytes
        )));
    }

    Ok(extension)
}
