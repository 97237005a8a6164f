use axum::{Json, extract::State};
use medicare_ai::HealthCheckResponse;
use medicare_ai::context::AppContext;

/// GET / 与 GET /health
pub async fn health(State(context): State<AppContext>) -> Json<HealthCheckResponse> {
    Json(context.health())
}

#[cfg(test)]
mod tests {
    use crate::routes::testing::{body_json, context, context_with};
    use crate::server::build_router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use medicare_ai::config::Settings;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_reports_services() {
        for uri in ["/", "/health"] {
            let response = build_router(context())
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let body = body_json(response).await;
            assert_eq!(body["status"], "healthy");
            assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
            assert_eq!(body["services"][0]["name"], "gemini");
            assert_eq!(body["services"][0]["model"], "stub-model");
        }
    }

    #[tokio::test]
    async fn test_health_includes_cache_stats() {
        let context = medicare_ai::context::AppContext::from_settings(Settings::default()).unwrap();
        let response = build_router(context)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["cache"]["totalOperations"], 0);
        assert_eq!(body["cache"]["hitRate"], 0.0);
    }

    #[tokio::test]
    async fn test_health_degraded_without_search() {
        let response = build_router(context_with(Settings::default(), false))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["services"][1]["configured"], false);
    }
}
