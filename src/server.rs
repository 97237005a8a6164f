//! HTTP服务：路由、中间件与优雅退出

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
};
use medicare_ai::context::AppContext;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::routes::{analysis, chat, health, research};

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|origin| origin.trim() == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

pub fn build_router(context: AppContext) -> Router {
    let server = &context.settings().server;
    let body_limit = DefaultBodyLimit::max(server.max_upload_bytes);
    let cors = cors_layer(&server.cors_origins);

    Router::new()
        .route("/", get(health::health))
        .route("/health", get(health::health))
        .route("/chat", post(chat::chat))
        .route("/analyze", post(analysis::analyze_upload))
        .route("/analyze/text", post(analysis::analyze_text))
        .route("/analyze/image", post(analysis::analyze_image))
        .route(
            "/research",
            get(research::research_get).post(research::research_post),
        )
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

/// 启动HTTP服务，收到Ctrl-C后优雅退出
pub async fn serve(context: AppContext) -> Result<()> {
    let bind_address = context.settings().bind_address();
    let router = build_router(context);

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!(address = %bind_address, "Medicare AI listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("HTTP server error")?;

    info!("Medicare AI shut down");
    Ok(())
}
