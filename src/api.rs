use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::aggregate::Aggregator;
use crate::filters::{parse_filters, ValidationError};
use crate::rate_limit::{self, FixedWindowLimiter};

const SERVICE_NAME: &str = "Multi-API Integration Backend";

#[derive(Clone)]
pub struct AppState {
    aggregator: Arc<Aggregator>,
    limiter: Arc<FixedWindowLimiter>,
}

impl AppState {
    pub fn new(aggregator: Arc<Aggregator>, limiter: Arc<FixedWindowLimiter>) -> Self {
        Self {
            aggregator,
            limiter,
        }
    }
}

/// Public routes plus the rate-limited `/api` surface.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(api_health))
        .route("/aggregated-data", get(aggregated_data))
        .route_layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            rate_limit::enforce,
        ));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api", api)
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// ISO 8601 with milliseconds and a `Z` suffix.
fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Serialize)]
struct Success<T> {
    success: bool,
    data: T,
    timestamp: String,
}

#[derive(Serialize)]
struct Failure {
    success: bool,
    message: String,
    timestamp: String,
}

fn failure(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(Failure {
            success: false,
            message,
            timestamp: now_iso(),
        }),
    )
        .into_response()
}

async fn aggregated_data(
    State(state): State<AppState>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Response {
    let parsed = query
        .map_err(|e| ValidationError::MalformedQuery(e.body_text()))
        .and_then(|Query(params)| parse_filters(&params));
    let request = match parsed {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(error = %e, "rejected filters");
            return failure(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    match state.aggregator.aggregate(&request).await {
        Ok(data) => (
            StatusCode::OK,
            Json(Success {
                success: true,
                data,
                timestamp: now_iso(),
            }),
        )
            .into_response(),
        Err(e) => failure(StatusCode::BAD_GATEWAY, format!("Aggregation failed: {e}")),
    }
}

#[derive(Serialize)]
struct Liveness {
    status: &'static str,
    timestamp: String,
}

async fn health() -> Json<Liveness> {
    Json(Liveness {
        status: "UP",
        timestamp: now_iso(),
    })
}

#[derive(Serialize)]
struct ApiHealth {
    status: &'static str,
    timestamp: String,
    service: &'static str,
}

async fn api_health() -> Json<ApiHealth> {
    tracing::debug!("health check endpoint hit");
    Json(ApiHealth {
        status: "OK",
        timestamp: now_iso(),
        service: SERVICE_NAME,
    })
}

#[derive(Serialize)]
struct ServiceInfo {
    message: &'static str,
    version: &'static str,
    endpoints: [&'static str; 3],
}

async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        endpoints: [
            "GET /api/health",
            "GET /api/aggregated-data (supports price filtering)",
            "GET /metrics",
        ],
    })
}
