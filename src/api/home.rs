use crate::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

pub fn routes() -> Router<AppState> {
	Router::new()
		.route("/", get(index))
		.route("/health", get(health))
		.route("/env", get(env))
}

async fn index(State(state): State<AppState>) -> impl IntoResponse {
	format!(
		"This server is running {} (v{})",
		state.config.app.name,
		env!("CARGO_PKG_VERSION")
	)
}

async fn health() -> impl IntoResponse {
	Json(json!({"status": "ok"}))
}

/// Summary of the running configuration.
async fn env(State(state): State<AppState>) -> impl IntoResponse {
	Json(state.config.summary())
}
