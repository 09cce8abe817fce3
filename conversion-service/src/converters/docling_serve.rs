use super::{ConversionError, ConversionOptions, ConvertedDocument, Converter};
use crate::models::DoclingDocument;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::multipart;
use serde::Deserialize;
use service_core::observability::inject_trace_headers;
use std::path::Path;
use std::time::Duration;

const CONVERT_FILE_PATH: &str = "/v1/convert/file";
const HEALTH_PATH: &str = "/health";
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Converts documents through a Docling Serve sidecar.
pub struct DoclingServeConverter {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ServeResponse {
    document: ServeDocument,
    status: String,
    #[serde(default)]
    errors: Vec<ServeError>,
}

#[derive(Debug, Deserialize)]
struct ServeDocument {
    #[serde(default)]
    json_content: Option<DoclingDocument>,
}

#[derive(Debug, Deserialize)]
struct ServeError {
    #[serde(default)]
    error_message: String,
}

impl DoclingServeConverter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConversionError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ConversionError::NotConfigured(
                "DOCLING_SERVE_URL is empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConversionError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    fn map_request_error(&self, err: reqwest::Error) -> ConversionError {
        if err.is_timeout() {
            ConversionError::Timeout(self.timeout.as_secs())
        } else if err.is_connect() {
            ConversionError::Unavailable(format!("docling-serve at {}: {}", self.base_url, err))
        } else {
            ConversionError::Failed(err.to_string())
        }
    }
}

fn form_for(file_name: String, data: Vec<u8>, options: &ConversionOptions) -> multipart::Form {
    multipart::Form::new()
        .part("files", multipart::Part::bytes(data).file_name(file_name))
        .text("to_formats", "json")
        .text("image_export_mode", "embedded")
        .text("include_images", "true")
        .text("do_ocr", options.do_ocr.to_string())
        .text("do_table_structure", options.do_table_structure.to_string())
        .text("do_picture_description", options.do_picture_description.to_string())
}

fn into_document(response: ServeResponse) -> Result<DoclingDocument, ConversionError> {
    let errors = response
        .errors
        .iter()
        .map(|e| e.error_message.as_str())
        .filter(|m| !m.is_empty())
        .collect::<Vec<_>>()
        .join("; ");

    match response.status.as_str() {
        "success" | "partial_success" => {}
        other => {
            return Err(ConversionError::Failed(format!(
                "docling-serve status '{}': {}",
                other, errors
            )))
        }
    }

    if !errors.is_empty() {
        tracing::warn!(errors = %errors, "docling-serve reported partial success");
    }

    response.document.json_content.ok_or_else(|| {
        ConversionError::InvalidOutput("docling-serve response has no json_content".to_string())
    })
}

#[async_trait]
impl Converter for DoclingServeConverter {
    fn name(&self) -> &str {
        "docling-serve"
    }

    async fn convert(
        &self,
        input: &Path,
        options: &ConversionOptions,
    ) -> Result<ConvertedDocument, ConversionError> {
        let data = tokio::fs::read(input).await?;
        let file_name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let mut headers = HeaderMap::new();
        inject_trace_headers(&mut headers, options.request_id.as_deref());

        let url = format!("{}{}", self.base_url, CONVERT_FILE_PATH);
        tracing::info!(
            url = %url,
            size = data.len(),
            do_ocr = options.do_ocr,
            do_table_structure = options.do_table_structure,
            do_picture_description = options.do_picture_description,
            "Sending document to docling-serve"
        );

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .multipart(form_for(file_name, data, options))
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConversionError::Failed(format!(
                "docling-serve returned {}: {}",
                status, body
            )));
        }

        let payload: ServeResponse = response
            .json()
            .await
            .map_err(|e| ConversionError::InvalidOutput(e.to_string()))?;

        Ok(ConvertedDocument::new(into_document(payload)?))
    }

    async fn health_check(&self) -> Result<(), ConversionError> {
        let url = format!("{}{}", self.base_url, HEALTH_PATH);
        let response = self
            .client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ConversionError::Unavailable(format!(
                "docling-serve health returned {}",
                response.status()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn parse(value: serde_json::Value) -> ServeResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn success_yields_json_content() {
        let response = parse(json!({
            "document": {
                "filename": "a.pdf",
                "md_content": null,
                "json_content": {"texts": [{"label": "title", "text": "Report"}]}
            },
            "status": "success",
            "errors": [],
            "processing_time": 1.2
        }));

        let doc = into_document(response).unwrap();
        assert_eq!(doc.texts[0].text, "Report");
    }

    #[test]
    fn failure_status_collects_error_messages() {
        let response = parse(json!({
            "document": {"json_content": null},
            "status": "failure",
            "errors": [{"component_type": "pipeline", "module_name": "ocr", "error_message": "OCR engine crashed"}]
        }));

        match into_document(response) {
            Err(ConversionError::Failed(msg)) => assert!(msg.contains("OCR engine crashed")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn missing_json_content_is_invalid_output() {
        let response = parse(json!({"document": {}, "status": "success"}));
        assert!(matches!(
            into_document(response),
            Err(ConversionError::InvalidOutput(_))
        ));
    }

    #[test]
    fn empty_url_is_not_configured() {
        assert!(matches!(
            DoclingServeConverter::new(" ", Duration::from_secs(1)),
            Err(ConversionError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_sidecar_is_unavailable() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let converter =
            DoclingServeConverter::new(&format!("http://127.0.0.1:{}", port), Duration::from_secs(2))
                .unwrap();
        let err = converter.health_check().await.unwrap_err();
        assert!(matches!(err, ConversionError::Unavailable(_)));
    }

    #[tokio::test]
    async fn converts_through_sidecar_with_request_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/convert/file"))
            .and(header("x-request-id", "req-7"))
            .and(body_string_contains("name=\"files\""))
            .and(body_string_contains("embedded"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "document": {"json_content": {"texts": [{"label": "text", "text": "Hello"}]}},
                "status": "success",
                "errors": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("upload-x.pdf");
        std::fs::write(&input, b"%PDF-1.4").unwrap();

        let converter = DoclingServeConverter::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let options = ConversionOptions {
            request_id: Some("req-7".to_string()),
            ..ConversionOptions::default()
        };
        let converted = converter.convert(&input, &options).await.unwrap();

        assert_eq!(converted.document.texts[0].text, "Hello");
        assert!(converted.base_dir().is_none());
    }

    #[tokio::test]
    async fn sidecar_http_error_is_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/convert/file"))
            .respond_with(ResponseTemplate::new(422).set_body_string("unsupported format"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("upload-x.doc");
        std::fs::write(&input, b"legacy").unwrap();

        let converter = DoclingServeConverter::new(&server.uri(), Duration::from_secs(5)).unwrap();
        assert!(converter.health_check().await.is_ok());

        match converter
            .convert(&input, &ConversionOptions::default())
            .await
        {
            Err(ConversionError::Failed(msg)) => {
                assert!(msg.contains("422"));
                assert!(msg.contains("unsupported format"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
