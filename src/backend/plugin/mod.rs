//! Plugin loading and registry infrastructure.
//!
//! A plugin is a directory below the plugin root that contains a unit file
//! (a shared library built against `neuroserve-plugin-api`, or a reference to
//! a compiled-in plugin) and optionally a `manifest.json`.

mod adapters;
pub mod builtin;
mod loader;
mod manifest;
mod registry;
#[cfg(test)]
pub(crate) mod testing;

pub use adapters::LibraryPlugin;
pub use builtin::EchoPlugin;
pub use loader::{BuiltinLoader, LibraryLoader, LoadedUnit, LoaderChain, UnitLoadError, UnitLoader};
pub use manifest::{plugin_metadata, Metadata};
pub use registry::{DiscoveryReport, LoadFailure, MetadataIndex, PluginRegistry};

use neuroserve_plugin_api::FfiError;
use thiserror::Error;

/// JSON object handed to [`Plugin::infer`]. Always contains a `task` key.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// The capability contract every plugin fulfils.
///
/// The registry calls `set_name` and `load` once after construction; only
/// `infer` is called afterwards, possibly concurrently.
pub trait Plugin: Send + Sync {
	/// Assign the name derived from the plugin directory.
	fn set_name(&mut self, name: &str);

	/// One-time initialization hook.
	fn load(&mut self) -> Result<(), PluginError>;

	/// Execute a single task.
	fn infer(&self, payload: Payload) -> Result<serde_json::Value, PluginError>;
}

/// Error raised by a plugin during construction, `load` or `infer`.
#[derive(Debug, Error)]
pub enum PluginError {
	#[error("{0}")]
	Failed(String),

	#[error("{0}")]
	Ffi(String),

	#[error("Invalid JSON crossing the plugin boundary: {0}")]
	Json(#[from] serde_json::Error),
}

impl PluginError {
	pub fn failed(message: impl Into<String>) -> Self {
		Self::Failed(message.into())
	}
}

impl From<FfiError> for PluginError {
	fn from(error: FfiError) -> Self {
		Self::Ffi(error.message.into_string())
	}
}

/// Renders a panic payload caught with `catch_unwind`.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
	payload
		.downcast_ref::<&str>()
		.map(|s| (*s).to_owned())
		.or_else(|| payload.downcast_ref::<String>().cloned())
		.unwrap_or_else(|| String::from("unknown panic"))
}
