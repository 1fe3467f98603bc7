//! Plugins compiled into the server.
//!
//! They are referenced from a plugin directory through a `plugin.builtin`
//! unit file, see [`BuiltinLoader`](super::BuiltinLoader).

use crate::backend::plugin::{Payload, Plugin, PluginError};
use serde_json::{json, Value};
use tracing::debug;

/// Echo plugin, mostly useful for smoke tests of a deployment.
///
/// Supported tasks:
/// * `ping` - returns the payload without the injected `task` key
#[derive(Debug, Default)]
pub struct EchoPlugin {
	name: String,
	loaded: bool,
}

impl Plugin for EchoPlugin {
	fn set_name(&mut self, name: &str) {
		name.clone_into(&mut self.name);
	}

	fn load(&mut self) -> Result<(), PluginError> {
		debug!(plugin.name = %self.name, "Echo plugin ready");
		self.loaded = true;
		Ok(())
	}

	fn infer(&self, mut payload: Payload) -> Result<Value, PluginError> {
		if !self.loaded {
			return Err(PluginError::failed(format!(
				"Plugin {} not loaded",
				self.name
			)));
		}

		match payload.remove("task") {
			Some(Value::String(task)) if task == "ping" => Ok(json!({
				"task": task,
				"payload_received": payload,
			})),
			Some(Value::String(task)) => Err(PluginError::failed(format!(
				"Unsupported task '{task}'"
			))),
			_ => Err(PluginError::failed("Missing task")),
		}
	}
}
