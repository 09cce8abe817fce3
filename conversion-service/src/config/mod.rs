use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;

/// 25 MiB, the ceiling the hosted deployment enforces.
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ConversionConfig {
    pub common: core_config::Config,
    pub converter: ConverterConfig,
    pub upload: UploadConfig,
    pub images: ImageConfig,
    pub defaults: FlagDefaults,
    pub fallback: FallbackMode,
}

#[derive(Debug, Clone)]
pub struct ConverterConfig {
    pub backend: ConverterBackend,
    pub docling_bin: String,
    pub serve_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_bytes: usize,
    /// Lowercase, without the leading dot.
    pub allowed_extensions: Vec<String>,
    /// Scratch directory for uploads; `None` uses the system temp dir.
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub dir: PathBuf,
    /// Prefix for image URLs, e.g. `https://docs.example.com`. Empty keeps them relative.
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct FlagDefaults {
    pub do_ocr: bool,
    pub do_table_structure: bool,
    pub do_picture_description: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterBackend {
    DoclingCli,
    DoclingServe,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackMode {
    /// Answer 200 with a canned document when conversion fails.
    Placeholder,
    /// Answer 500 with the converter's error text.
    Error,
}

impl ConversionConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env, APP__ prefix and PORT)
        let common_config = core_config::Config::load()?;

        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(ConversionConfig {
            common: common_config,
            converter: ConverterConfig {
                backend: get_env("CONVERTER_BACKEND", Some("docling-cli"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
                docling_bin: get_env("DOCLING_BIN", Some("docling"), is_prod)?,
                serve_url: get_env("DOCLING_SERVE_URL", Some("http://localhost:5001"), is_prod)?,
                timeout_secs: parse_env("CONVERTER_TIMEOUT_SECS", 300, is_prod)?,
            },
            upload: UploadConfig {
                max_bytes: parse_env("UPLOAD_MAX_BYTES", DEFAULT_MAX_UPLOAD_BYTES, is_prod)?,
                allowed_extensions: parse_extensions(&get_env(
                    "UPLOAD_ALLOWED_EXTENSIONS",
                    Some("pdf,docx,doc,txt"),
                    is_prod,
                )?),
                temp_dir: env::var("UPLOAD_TEMP_DIR").ok().map(PathBuf::from),
            },
            images: ImageConfig {
                dir: PathBuf::from(get_env("IMAGES_DIR", Some("storage/images"), is_prod)?),
                public_base_url: env::var("PUBLIC_BASE_URL")
                    .unwrap_or_default()
                    .trim_end_matches('/')
                    .to_string(),
            },
            defaults: FlagDefaults {
                do_ocr: parse_env("DEFAULT_DO_OCR", true, is_prod)?,
                do_table_structure: parse_env("DEFAULT_DO_TABLE_STRUCTURE", true, is_prod)?,
                do_picture_description: parse_env(
                    "DEFAULT_DO_PICTURE_DESCRIPTION",
                    false,
                    is_prod,
                )?,
            },
            fallback: get_env("CONVERSION_FALLBACK", Some("placeholder"), is_prod)?
                .parse()
                .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
        })
    }
}

impl ConverterBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConverterBackend::DoclingCli => "docling-cli",
            ConverterBackend::DoclingServe => "docling-serve",
            ConverterBackend::Disabled => "disabled",
        }
    }
}

impl std::str::FromStr for ConverterBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "docling-cli" | "cli" => Ok(ConverterBackend::DoclingCli),
            "docling-serve" | "serve" => Ok(ConverterBackend::DoclingServe),
            "disabled" | "none" => Ok(ConverterBackend::Disabled),
            _ => Err(format!("Invalid converter backend: {}", s)),
        }
    }
}

impl FallbackMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackMode::Placeholder => "placeholder",
            FallbackMode::Error => "error",
        }
    }
}

impl std::str::FromStr for FallbackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "placeholder" => Ok(FallbackMode::Placeholder),
            "error" => Ok(FallbackMode::Error),
            _ => Err(format!("Invalid conversion fallback mode: {}", s)),
        }
    }
}

fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

fn parse_env<T>(key: &str, default: T, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr + ToString,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key, Some(&default.to_string()), is_prod)?;
    raw.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e))
    })
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod && default.is_none() {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}
