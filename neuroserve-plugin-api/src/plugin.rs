//! Inference plugin trait definition.

use abi_stable::{
	sabi_trait,
	std_types::{RBox, RString},
};

use crate::types::FfiResult;

/// FFI-safe inference plugin trait.
///
/// The host calls `set_name` and then `load` exactly once after construction.
/// Only `infer` is called per request, possibly from several threads at once.
#[sabi_trait]
pub trait InferencePlugin: Send + Sync {
	/// Assign the name the host registered this plugin under.
	fn set_name(&mut self, name: RString);

	/// One-time initialization, e.g. acquiring model resources.
	///
	/// An error here keeps the plugin out of the registry.
	fn load(&mut self) -> FfiResult<()>;

	/// Execute one task.
	///
	/// # Arguments
	/// * `payload_json` - A JSON object with at least a `task` string key
	///
	/// # Returns
	/// The task result serialized as JSON, or an error.
	#[sabi(last_prefix_field)]
	fn infer(&self, payload_json: RString) -> FfiResult<RString>;
}

/// Boxed inference plugin as handed to the host.
pub type InferencePluginBox = InferencePlugin_TO<'static, RBox<()>>;
