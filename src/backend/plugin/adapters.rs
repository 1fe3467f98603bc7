//! Adapter that wraps a plugin box loaded from a shared library.

use crate::backend::plugin::{Payload, Plugin, PluginError};
use abi_stable::std_types::RString;
use neuroserve_plugin_api::InferencePluginBox;

/// Adapter that wraps an `InferencePluginBox` to implement [`Plugin`].
///
/// Payloads and results cross the FFI boundary as JSON strings.
pub struct LibraryPlugin {
	plugin: InferencePluginBox,
}

impl LibraryPlugin {
	pub fn new(plugin: InferencePluginBox) -> Self {
		Self { plugin }
	}
}

impl Plugin for LibraryPlugin {
	fn set_name(&mut self, name: &str) {
		self.plugin.set_name(RString::from(name));
	}

	fn load(&mut self) -> Result<(), PluginError> {
		self.plugin.load().into_result().map_err(PluginError::from)
	}

	fn infer(&self, payload: Payload) -> Result<serde_json::Value, PluginError> {
		let payload_json = serde_json::to_string(&payload)?;
		let result = self
			.plugin
			.infer(RString::from(payload_json))
			.into_result()?;
		Ok(serde_json::from_str(result.as_str())?)
	}
}
