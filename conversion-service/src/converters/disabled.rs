use super::{ConversionError, ConversionOptions, ConvertedDocument, Converter};
use async_trait::async_trait;
use std::path::Path;

/// Stand-in used when no Docling installation is configured.
pub struct DisabledConverter;

#[async_trait]
impl Converter for DisabledConverter {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn convert(
        &self,
        _input: &Path,
        _options: &ConversionOptions,
    ) -> Result<ConvertedDocument, ConversionError> {
        Err(ConversionError::NotConfigured(
            "document conversion is disabled (CONVERTER_BACKEND=disabled)".to_string(),
        ))
    }

    async fn health_check(&self) -> Result<(), ConversionError> {
        Err(ConversionError::NotConfigured(
            "document conversion is disabled".to_string(),
        ))
    }
}
