//! NeuroServe Plugin API
//!
//! This crate defines the FFI-safe plugin interface for NeuroServe.
//! Plugin authors should depend on this crate, implement [`InferencePlugin`]
//! and export it with [`declare_plugin!`]. The resulting `cdylib` is placed in
//! `<plugin root>/<name>/plugin.<so|dylib|dll>`.
//!
//! # Example
//!
//! ```ignore
//! use neuroserve_plugin_api::prelude::*;
//!
//! #[derive(Default)]
//! struct MyPlugin {
//!     name: String,
//! }
//!
//! impl InferencePlugin for MyPlugin {
//!     fn set_name(&mut self, name: RString) {
//!         self.name = name.into();
//!     }
//!
//!     fn load(&mut self) -> FfiResult<()> {
//!         RResult::ROk(())
//!     }
//!
//!     fn infer(&self, payload_json: RString) -> FfiResult<RString> {
//!         let payload = match decode_payload(&payload_json) {
//!             Ok(payload) => payload,
//!             Err(err) => return RResult::RErr(err),
//!         };
//!         encode_result(&payload)
//!     }
//! }
//!
//! declare_plugin! {
//!     version: env!("CARGO_PKG_VERSION"),
//!     create: || InferencePlugin_TO::from_value(
//!         MyPlugin::default(),
//!         abi_stable::sabi_trait::TD_Opaque,
//!     ),
//! }
//! ```

#![allow(clippy::module_name_repetitions)]

use abi_stable::{
	library::RootModule,
	package_version_strings,
	sabi_types::VersionStrings,
	std_types::{ROption, RString},
	StableAbi,
};

pub mod plugin;
pub mod types;

pub use plugin::{InferencePlugin, InferencePluginBox, InferencePlugin_TO};
pub use types::*;

/// Prelude module for convenient imports.
pub mod prelude {
	pub use crate::plugin::{InferencePlugin, InferencePluginBox, InferencePlugin_TO};
	pub use crate::types::*;
	pub use crate::{PluginModule, PluginModuleRef};

	pub use abi_stable::std_types::{RBox, ROption, RResult, RString, RVec};
}

/// Root module that plugins must export.
///
/// The host opens the library, checks the layout of this module and then
/// calls `create_plugin` to obtain a fresh plugin instance.
#[repr(C)]
#[derive(StableAbi)]
#[sabi(kind(Prefix(prefix_ref = PluginModuleRef)))]
#[sabi(missing_field(panic))]
pub struct PluginModule {
	/// Returns the plugin version.
	#[sabi(last_prefix_field)]
	pub plugin_version: extern "C" fn() -> RString,

	/// Construct a new plugin instance.
	///
	/// Libraries built without this entry point are not plugins; the host
	/// sees `None` from the accessor and skips the directory.
	#[sabi(missing_field(option))]
	pub create_plugin: extern "C" fn() -> ROption<InferencePluginBox>,
}

impl RootModule for PluginModuleRef {
	abi_stable::declare_root_module_statics! {PluginModuleRef}

	const BASE_NAME: &'static str = "neuroserve_plugin";
	const NAME: &'static str = "neuroserve_plugin";
	const VERSION_STRINGS: VersionStrings = package_version_strings!();
}

/// Helper macro for declaring a plugin.
///
/// This macro generates the required `get_root_module` function that
/// the host application uses to load the plugin.
///
/// # Example
///
/// ```ignore
/// declare_plugin! {
///     version: "0.1.0",
///     create: || InferencePlugin_TO::from_value(MyPlugin::default(), TD_Opaque),
/// }
/// ```
#[macro_export]
macro_rules! declare_plugin {
	(
        version: $version:expr,
        create: $create:expr $(,)?
    ) => {
		/// Plugin entry point.
		///
		/// This function is called by the host application to get the plugin module.
		#[::abi_stable::export_root_module]
		pub fn get_root_module() -> $crate::PluginModuleRef {
			use ::abi_stable::prefix_type::PrefixTypeTrait;

			extern "C" fn plugin_version() -> ::abi_stable::std_types::RString {
				::abi_stable::std_types::RString::from($version)
			}

			extern "C" fn create_plugin(
			) -> ::abi_stable::std_types::ROption<$crate::InferencePluginBox> {
				let create_fn: fn() -> $crate::InferencePluginBox = $create;
				::abi_stable::std_types::ROption::RSome(create_fn())
			}

			$crate::PluginModule {
				plugin_version,
				create_plugin,
			}
			.leak_into_prefix()
		}
	};
}
