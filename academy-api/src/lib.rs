use axum::{
    http::Method,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod graphql;
pub mod middleware;
pub mod state;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let schema = graphql::create_schema(state.clone());

    let api = Router::new()
        .route("/graphql", post(graphql::graphql_handler))
        .layer(Extension(schema))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::identity_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::rate_limit_middleware))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "academy-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
