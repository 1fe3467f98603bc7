use crate::backend::plugin::Payload;
use crate::backend::{DispatchError, TaskRequest, TaskResult};
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{debug, instrument};

/// HTTP Router for plugin discovery and task dispatch.
pub fn routes() -> Router<AppState> {
	Router::new()
		.route("/plugins", get(list_plugins))
		.route("/plugins/reload", post(reload_plugins))
		.route("/plugins/diagnostics", get(diagnostics))
		.route("/plugins/{name}/{task}", post(run_task))
}

/// Errors returned by the plugin endpoints as `{"detail": "..."}`.
#[derive(Debug)]
enum ApiError {
	Dispatch(DispatchError),
	InvalidBody(JsonRejection),
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let (status, detail) = match self {
			Self::Dispatch(err @ DispatchError::PluginNotFound { .. }) => {
				(StatusCode::NOT_FOUND, err.to_string())
			}
			Self::Dispatch(ref err @ DispatchError::Infer { ref plugin, .. }) => {
				debug!(plugin.name = %plugin, "Responding with inference failure");
				(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
			}
			Self::InvalidBody(rejection) => (rejection.status(), rejection.body_text()),
		};
		(status, Json(json!({ "detail": detail }))).into_response()
	}
}

impl From<DispatchError> for ApiError {
	fn from(err: DispatchError) -> Self {
		Self::Dispatch(err)
	}
}

#[instrument(skip_all)]
async fn list_plugins(State(state): State<AppState>) -> impl IntoResponse {
	let plugins = state.dispatcher.plugins().await;
	Json(json!({
		"count": plugins.len(),
		"plugins": plugins,
	}))
}

#[instrument(skip_all)]
async fn reload_plugins(State(state): State<AppState>) -> impl IntoResponse {
	Json(state.dispatcher.reload().await)
}

async fn diagnostics(State(state): State<AppState>) -> impl IntoResponse {
	Json(json!({ "failures": state.dispatcher.failures().await }))
}

#[instrument(skip(state, payload))]
async fn run_task(
	State(state): State<AppState>,
	Path((name, task)): Path<(String, String)>,
	payload: Result<Json<Payload>, JsonRejection>,
) -> Result<Json<TaskResult>, ApiError> {
	let Json(payload) = payload.map_err(ApiError::InvalidBody)?;

	let result = state
		.dispatcher
		.dispatch(TaskRequest {
			plugin_name: name,
			task,
			payload,
		})
		.await?;

	Ok(Json(result))
}
