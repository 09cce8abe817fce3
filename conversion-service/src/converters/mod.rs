//! Document converter abstractions and implementations.
//!
//! The service never parses documents itself: a [`Converter`] hands the
//! uploaded file to Docling (as a local CLI or a Docling Serve sidecar) and
//! returns its `DoclingDocument`.

pub mod disabled;
pub mod docling_cli;
pub mod docling_serve;
pub mod executor;

use crate::config::{ConversionConfig, ConverterBackend};
use crate::models::DoclingDocument;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;

pub use disabled::DisabledConverter;
pub use docling_cli::DoclingCliConverter;
pub use docling_serve::DoclingServeConverter;
pub use executor::CommandExecutor;

/// Error type for converter operations.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Converter not configured: {0}")]
    NotConfigured(String),

    #[error("Converter unavailable: {0}")]
    Unavailable(String),

    #[error("Conversion timed out after {0} seconds")]
    Timeout(u64),

    #[error("Conversion failed: {0}")]
    Failed(String),

    #[error("Converter returned invalid output: {0}")]
    InvalidOutput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConversionError {
    /// Whether running the conversion again with lighter options could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ConversionError::NotConfigured(_) | ConversionError::Unavailable(_)
        )
    }
}

/// Pipeline switches forwarded to Docling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOptions {
    pub do_ocr: bool,
    pub do_table_structure: bool,
    /// Ask the vision-language model to describe pictures.
    pub do_picture_description: bool,
    /// Propagated to sidecar calls for log correlation.
    pub request_id: Option<String>,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            do_ocr: true,
            do_table_structure: true,
            do_picture_description: false,
            request_id: None,
        }
    }
}

/// A converted document plus the scratch directory its referenced files live in.
///
/// The directory is deleted when this value is dropped, so image paths stay
/// valid only while it is alive.
#[derive(Debug)]
pub struct ConvertedDocument {
    pub document: DoclingDocument,
    workdir: Option<TempDir>,
}

impl ConvertedDocument {
    pub fn new(document: DoclingDocument) -> Self {
        Self {
            document,
            workdir: None,
        }
    }

    pub fn with_workdir(document: DoclingDocument, workdir: TempDir) -> Self {
        Self {
            document,
            workdir: Some(workdir),
        }
    }

    /// Directory that relative image URIs resolve against.
    pub fn base_dir(&self) -> Option<&Path> {
        self.workdir.as_ref().map(|d| d.path())
    }
}

/// Trait for document conversion backends.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Backend name reported by `/status` and used as a metrics label.
    fn name(&self) -> &str;

    /// Convert the file at `input` into a Docling document.
    async fn convert(
        &self,
        input: &Path,
        options: &ConversionOptions,
    ) -> Result<ConvertedDocument, ConversionError>;

    /// Health check.
    async fn health_check(&self) -> Result<(), ConversionError>;
}

/// Build the converter selected by `CONVERTER_BACKEND`.
pub fn build_converter(config: &ConversionConfig) -> Result<Arc<dyn Converter>, ConversionError> {
    let timeout = Duration::from_secs(config.converter.timeout_secs);

    let converter: Arc<dyn Converter> = match config.converter.backend {
        ConverterBackend::DoclingCli => Arc::new(DoclingCliConverter::new(
            &config.converter.docling_bin,
            CommandExecutor::new(timeout),
            config.upload.temp_dir.clone(),
        )?),
        ConverterBackend::DoclingServe => Arc::new(DoclingServeConverter::new(
            &config.converter.serve_url,
            timeout,
        )?),
        ConverterBackend::Disabled => Arc::new(DisabledConverter),
    };

    tracing::info!(backend = %converter.name(), "Initialized document converter");

    Ok(converter)
}
