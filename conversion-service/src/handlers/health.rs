use crate::dtos::status::{ConverterStatus, DefaultFlags, UploadLimits};
use crate::dtos::{ServiceInfo, StatusResponse};
use crate::services::get_metrics;
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::time::Duration;

pub const SERVICE_NAME: &str = "conversion-service";

const CONVERTER_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Liveness only; never touches the converter.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Reports whether the converter is reachable plus the active upload limits.
///
/// Always answers 200; an unreachable converter shows up as `available: false`.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let converter = state.conversion.converter();

    let probe = tokio::time::timeout(CONVERTER_PROBE_TIMEOUT, converter.health_check()).await;
    let error = match probe {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some(format!(
            "Health check timed out after {} seconds",
            CONVERTER_PROBE_TIMEOUT.as_secs()
        )),
    };

    if let Some(error) = &error {
        tracing::warn!(backend = %converter.name(), error = %error, "Converter health check failed");
    }

    let config = &state.config;
    Json(StatusResponse {
        status: if error.is_none() { "ready" } else { "degraded" },
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        converter: ConverterStatus {
            backend: converter.name().to_string(),
            available: error.is_none(),
            error,
        },
        upload: UploadLimits {
            allowed_extensions: config.upload.allowed_extensions.clone(),
            max_bytes: config.upload.max_bytes,
        },
        defaults: DefaultFlags {
            do_ocr: config.defaults.do_ocr,
            do_table_structure: config.defaults.do_table_structure,
            do_picture_description: config.defaults.do_picture_description,
        },
        fallback: config.fallback.as_str(),
    })
}

pub async fn service_info() -> impl IntoResponse {
    Json(ServiceInfo {
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        endpoints: vec![
            "POST /convert",
            "POST /v1/convert/form",
            "GET /images/{name}",
            "GET /health",
            "GET /status",
            "GET /v1/status",
            "GET /metrics",
        ],
    })
}

pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}
