use std::sync::Arc;

use agentbridge_core::Pipeline;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{admin, handlers};

// Shared by every handler. The pipeline owns the directory, the provider
// and the HTTP client; none of it is mutated per request.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/api/agents", get(handlers::list_agents))
        .route("/api/agents/{name}", get(handlers::get_agent))
        .route("/api/generate-query", post(handlers::generate_query))
        .route("/api/execute-query", post(handlers::execute_query))
        .route("/api/get-response", post(handlers::get_response))
        .route("/api/complete-query", post(handlers::complete_query))
        .route("/api/admin/agents", get(admin::list).post(admin::create))
        .route(
            "/api/admin/agents/{name}",
            get(admin::get).put(admin::update).delete(admin::delete),
        )
        .layer(cors(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
