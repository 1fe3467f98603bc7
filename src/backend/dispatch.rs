//! Routing of tasks to resident plugins.

use crate::backend::plugin::{
	panic_message, DiscoveryReport, LoadFailure, MetadataIndex, Payload, PluginRegistry,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{error, instrument, warn};

/// A task addressed to a plugin.
#[derive(Debug, Clone)]
pub struct TaskRequest {
	pub plugin_name: String,
	pub task: String,
	pub payload: Payload,
}

/// The unmodified result of a successful task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
	#[serde(rename = "plugin")]
	pub plugin_name: String,
	pub result: Value,
}

#[derive(Debug, Error)]
pub enum DispatchError {
	#[error("Plugin '{name}' not found")]
	PluginNotFound { name: String },

	/// The plugin failed or panicked while executing the task. The plugin
	/// stays resident.
	#[error("Infer error: {message}")]
	Infer { plugin: String, message: String },
}

/// Dispatches tasks to the plugins of a registry.
///
/// Discovery runs lazily on first use and only once per dispatcher, unless
/// a reload is requested. Tasks run on the blocking thread pool without any
/// registry lock held, so slow plugins do not hold up other plugins. There is
/// no timeout: a plugin that never returns keeps its request pending.
pub struct Dispatcher {
	registry: Arc<PluginRegistry>,
	discovered: OnceCell<()>,
}

impl Dispatcher {
	pub fn new(registry: Arc<PluginRegistry>) -> Self {
		Self {
			registry,
			discovered: OnceCell::new(),
		}
	}

	pub fn registry(&self) -> &PluginRegistry {
		&self.registry
	}

	/// Run the initial discovery pass if it has not run yet.
	pub async fn ensure_discovered(&self) {
		self.discovered
			.get_or_init(|| async {
				self.run_discovery(false).await;
			})
			.await;
	}

	/// Drop all plugins and discover them again.
	pub async fn reload(&self) -> DiscoveryReport {
		let report = self.run_discovery(true).await;
		// A reload counts as the initial discovery
		let _ = self.discovered.set(());
		report
	}

	async fn run_discovery(&self, reload: bool) -> DiscoveryReport {
		let registry = Arc::clone(&self.registry);
		match tokio::task::spawn_blocking(move || registry.discover(reload)).await {
			Ok(report) => report,
			Err(err) => {
				error!("Plugin discovery aborted: {err}");
				DiscoveryReport::default()
			}
		}
	}

	/// Metadata of all resident plugins.
	pub async fn plugins(&self) -> MetadataIndex {
		self.ensure_discovered().await;
		self.registry.all_metadata()
	}

	/// Failures of the most recent discovery pass.
	pub async fn failures(&self) -> Vec<LoadFailure> {
		self.ensure_discovered().await;
		self.registry.last_failures()
	}

	/// Run a task on the named plugin.
	///
	/// The task name always replaces a `task` key supplied in the payload.
	#[instrument(skip_all, fields(plugin.name = %request.plugin_name, task = %request.task))]
	pub async fn dispatch(&self, request: TaskRequest) -> Result<TaskResult, DispatchError> {
		self.ensure_discovered().await;

		let TaskRequest {
			plugin_name,
			task,
			payload,
		} = request;

		let plugin = self
			.registry
			.get(&plugin_name)
			.ok_or_else(|| DispatchError::PluginNotFound {
				name: plugin_name.clone(),
			})?;

		let payload = task_payload(task, payload);
		let outcome = tokio::task::spawn_blocking(move || plugin.infer(payload)).await;

		match outcome {
			Ok(Ok(result)) => Ok(TaskResult {
				plugin_name,
				result,
			}),
			Ok(Err(err)) => {
				warn!("Plugin task failed: {err}");
				Err(DispatchError::Infer {
					plugin: plugin_name,
					message: err.to_string(),
				})
			}
			Err(err) => {
				let message = if err.is_panic() {
					format!("Plugin panicked: {}", panic_message(&*err.into_panic()))
				} else {
					err.to_string()
				};
				error!("Plugin task aborted: {message}");
				Err(DispatchError::Infer {
					plugin: plugin_name,
					message,
				})
			}
		}
	}
}

/// `{"task": task}` followed by the caller's payload without its own `task` key.
fn task_payload(task: String, payload: Payload) -> Payload {
	let mut merged = Payload::with_capacity(payload.len() + 1);
	merged.insert(String::from("task"), Value::String(task));
	merged.extend(payload.into_iter().filter(|(key, _)| key != "task"));
	merged
}
