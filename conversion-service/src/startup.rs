use crate::config::ConversionConfig;
use crate::converters::{build_converter, Converter};
use crate::handlers;
use crate::services::{ConversionService, ImageStore};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and the flag fields on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: ConversionConfig,
    pub conversion: ConversionService,
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build with the converter selected by configuration.
    pub async fn build(config: ConversionConfig) -> Result<Self, AppError> {
        let converter = build_converter(&config).map_err(|e| {
            tracing::error!("Failed to initialize converter: {}", e);
            AppError::ConfigError(anyhow::anyhow!(e))
        })?;
        Self::build_with_converter(config, converter).await
    }

    pub async fn build_with_converter(
        config: ConversionConfig,
        converter: Arc<dyn Converter>,
    ) -> Result<Self, AppError> {
        let images = Arc::new(
            ImageStore::new(&config.images.dir, config.images.public_base_url.clone())
                .await
                .map_err(|e| {
                    tracing::error!(
                        "Failed to initialize image directory at {}: {}",
                        config.images.dir.display(),
                        e
                    );
                    e
                })?,
        );

        if let Some(dir) = &config.upload.temp_dir {
            tokio::fs::create_dir_all(dir).await?;
        }

        let backend = converter.name().to_string();
        let state = AppState {
            config: config.clone(),
            conversion: ConversionService::new(
                converter,
                images.clone(),
                config.upload.clone(),
                config.fallback,
            ),
        };

        let router = Router::new()
            .route("/", get(handlers::service_info))
            .route("/health", get(handlers::health_check))
            .route("/status", get(handlers::status))
            .route("/v1/status", get(handlers::status))
            .route("/metrics", get(handlers::metrics_endpoint))
            .route("/convert", post(handlers::convert_document))
            .route("/v1/convert/form", post(handlers::convert_document))
            .nest_service("/images", ServeDir::new(images.dir()))
            .route_layer(middleware::from_fn(metrics_middleware))
            .layer(DefaultBodyLimit::max(
                config.upload.max_bytes + MULTIPART_OVERHEAD_BYTES,
            ))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port,
            backend = %backend,
            fallback = %config.fallback.as_str(),
            "Listening on {}",
            port
        );

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router).await
    }

    /// Serve until `signal` resolves, letting in-flight conversions finish.
    pub async fn run_with_graceful_shutdown<F>(self, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(signal)
            .await
    }
}
