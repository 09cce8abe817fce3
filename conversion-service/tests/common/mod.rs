#![allow(dead_code)]

use async_trait::async_trait;
use conversion_service::config::{
    ConversionConfig, ConverterBackend, ConverterConfig, FallbackMode, FlagDefaults, ImageConfig,
    UploadConfig,
};
use conversion_service::converters::{
    ConversionError, ConversionOptions, ConvertedDocument, Converter, DisabledConverter,
};
use conversion_service::models::DoclingDocument;
use conversion_service::services::init_metrics;
use conversion_service::startup::Application;
use service_core::config::Config as CoreConfig;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const MAX_UPLOAD_BYTES: usize = 64 * 1024;

pub fn fixture_document() -> DoclingDocument {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/docling_document.json");
    let raw = std::fs::read_to_string(path).expect("Failed to read fixture");
    serde_json::from_str(&raw).expect("Fixture is not a valid DoclingDocument")
}

/// Returns the fixture document and records every call it receives.
pub struct FixtureConverter {
    pub calls: Mutex<Vec<ConversionOptions>>,
    /// Fail while picture description is requested, like a crashing VLM.
    pub fail_with_vlm: bool,
}

impl FixtureConverter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail_with_vlm: false,
        })
    }

    pub fn failing_with_vlm() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail_with_vlm: true,
        })
    }

    pub fn calls(&self) -> Vec<ConversionOptions> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Converter for FixtureConverter {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn convert(
        &self,
        input: &Path,
        options: &ConversionOptions,
    ) -> Result<ConvertedDocument, ConversionError> {
        assert!(input.exists(), "upload must be on disk during conversion");
        self.calls.lock().unwrap().push(options.clone());
        if self.fail_with_vlm && options.do_picture_description {
            return Err(ConversionError::Failed(
                "picture description model crashed".to_string(),
            ));
        }
        Ok(ConvertedDocument::new(fixture_document()))
    }

    async fn health_check(&self) -> Result<(), ConversionError> {
        Ok(())
    }
}

/// Fails every conversion the way a broken Docling install does.
pub struct FailingConverter;

#[async_trait]
impl Converter for FailingConverter {
    fn name(&self) -> &str {
        "failing"
    }

    async fn convert(
        &self,
        _input: &Path,
        _options: &ConversionOptions,
    ) -> Result<ConvertedDocument, ConversionError> {
        Err(ConversionError::Failed(
            "docling exited with status 1: corrupt xref table".to_string(),
        ))
    }

    async fn health_check(&self) -> Result<(), ConversionError> {
        Err(ConversionError::Unavailable("docling not installed".to_string()))
    }
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub images_dir: PathBuf,
    pub client: reqwest::Client,
    _root: TempDir,
}

pub fn test_config(root: &Path) -> ConversionConfig {
    ConversionConfig {
        common: CoreConfig { port: 0 }, // Random port for testing
        converter: ConverterConfig {
            backend: ConverterBackend::Disabled,
            docling_bin: "docling".to_string(),
            serve_url: "http://127.0.0.1:5001".to_string(),
            timeout_secs: 30,
        },
        upload: UploadConfig {
            max_bytes: MAX_UPLOAD_BYTES,
            allowed_extensions: ["pdf", "docx", "doc", "txt"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            temp_dir: Some(root.join("uploads")),
        },
        images: ImageConfig {
            dir: root.join("images"),
            public_base_url: String::new(),
        },
        defaults: FlagDefaults {
            do_ocr: true,
            do_table_structure: true,
            do_picture_description: false,
        },
        fallback: FallbackMode::Placeholder,
    }
}

impl TestApp {
    /// Spawn with the disabled converter and placeholder fallback.
    pub async fn spawn() -> Self {
        Self::spawn_with(Arc::new(DisabledConverter), |_| {}).await
    }

    pub async fn spawn_with(
        converter: Arc<dyn Converter>,
        customize: impl FnOnce(&mut ConversionConfig),
    ) -> Self {
        init_metrics();

        let root = tempfile::tempdir().expect("Failed to create test directory");
        let mut config = test_config(root.path());
        customize(&mut config);

        let upload_dir = config
            .upload
            .temp_dir
            .clone()
            .expect("Tests always use a dedicated upload directory");
        let images_dir = config.images.dir.clone();

        let app = Application::build_with_converter(config, converter)
            .await
            .expect("Failed to build test application");
        let port = app.port();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let address = format!("http://127.0.0.1:{}", port);
        let client = reqwest::Client::new();

        // Wait for the server to accept connections
        for _ in 0..50 {
            if client
                .get(format!("{}/health", address))
                .send()
                .await
                .is_ok()
            {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        TestApp {
            address,
            port,
            upload_dir,
            images_dir,
            client,
            _root: root,
        }
    }

    pub async fn post_file(
        &self,
        path: &str,
        file_name: &str,
        bytes: Vec<u8>,
        fields: &[(&str, &str)],
    ) -> reqwest::Response {
        let mut form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string()),
        );
        for (name, value) in fields {
            form = form.text(name.to_string(), value.to_string());
        }

        self.client
            .post(format!("{}{}", self.address, path))
            .multipart(form)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub fn upload_dir_is_empty(&self) -> bool {
        std::fs::read_dir(&self.upload_dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }
}
