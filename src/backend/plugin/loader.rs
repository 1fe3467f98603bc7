//! Turning a plugin directory into a plugin constructor.

use crate::backend::plugin::{EchoPlugin, LibraryPlugin, Plugin, PluginError};
use abi_stable::library::{lib_header_from_path, LibraryError};
use neuroserve_plugin_api::PluginModuleRef;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Zero-argument constructor producing a fresh plugin instance.
pub type PluginConstructor = Box<dyn FnOnce() -> Result<Box<dyn Plugin>, PluginError> + Send>;

/// A plugin unit that was found and loaded, but not yet constructed.
pub struct LoadedUnit {
	/// Synthetic namespace the unit is bound to, `plugins.<directory name>`.
	pub namespace: String,
	pub constructor: PluginConstructor,
}

impl std::fmt::Debug for LoadedUnit {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LoadedUnit")
			.field("namespace", &self.namespace)
			.finish_non_exhaustive()
	}
}

/// Loads the code unit of a plugin directory.
///
/// `Ok(None)` means the directory is not a plugin: there is no unit file, or
/// the unit does not export a constructor.
pub trait UnitLoader: Send + Sync {
	fn load_unit(&self, directory: &Path) -> Result<Option<LoadedUnit>, UnitLoadError>;
}

/// Errors that can occur when loading a plugin unit.
#[derive(Debug, Error)]
pub enum UnitLoadError {
	#[error("Failed to load plugin library at {path}: {source}")]
	LoadFailed { path: String, source: LibraryError },

	#[error("Failed to initialize plugin module at {path}: {source}")]
	InitFailed { path: String, source: LibraryError },

	#[error("Failed to read unit file at {path}: {source}")]
	Unreadable {
		path: String,
		source: std::io::Error,
	},
}

fn namespace(directory: &Path) -> String {
	let name = directory
		.file_name()
		.map(|name| name.to_string_lossy())
		.unwrap_or_default();
	format!("plugins.{name}")
}

/// Loads plugins from shared libraries built against `neuroserve-plugin-api`.
///
/// The unit file is `plugin.so`, `plugin.dylib` or `plugin.dll` depending on
/// the platform. Every library is opened with its own symbol scope, so
/// plugins exporting equally named symbols do not collide.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibraryLoader;

impl LibraryLoader {
	pub fn unit_path(directory: &Path) -> PathBuf {
		directory.join(format!("plugin.{}", std::env::consts::DLL_EXTENSION))
	}
}

impl UnitLoader for LibraryLoader {
	fn load_unit(&self, directory: &Path) -> Result<Option<LoadedUnit>, UnitLoadError> {
		let path = Self::unit_path(directory);
		if !path.exists() {
			return Ok(None);
		}

		// Load the library
		let header = match lib_header_from_path(&path) {
			Ok(header) => header,
			Err(LibraryError::GetSymbolError { .. }) => {
				debug!(path = %path.display(), "Library exports no plugin root module");
				return Ok(None);
			}
			Err(source) => {
				return Err(UnitLoadError::LoadFailed {
					path: path.display().to_string(),
					source,
				})
			}
		};

		// Get the root module
		let module = header
			.init_root_module::<PluginModuleRef>()
			.map_err(|source| UnitLoadError::InitFailed {
				path: path.display().to_string(),
				source,
			})?;

		let Some(create_plugin) = module.create_plugin() else {
			debug!(path = %path.display(), "Plugin module exports no constructor");
			return Ok(None);
		};

		debug!(
			path = %path.display(),
			plugin.version = %(module.plugin_version())(),
			"Opened plugin library"
		);

		Ok(Some(LoadedUnit {
			namespace: namespace(directory),
			constructor: Box::new(move || {
				create_plugin()
					.into_option()
					.map(|inner| Box::new(LibraryPlugin::new(inner)) as Box<dyn Plugin>)
					.ok_or_else(|| PluginError::failed("Plugin constructor returned no instance"))
			}),
		}))
	}
}

/// Constructor of a compiled-in plugin.
pub type BuiltinConstructor =
	Arc<dyn Fn() -> Result<Box<dyn Plugin>, PluginError> + Send + Sync>;

/// Loads plugins that are compiled into the server.
///
/// The unit file `plugin.builtin` contains the name a constructor was
/// registered under. Several directories may refer to the same constructor,
/// each getting its own instance.
#[derive(Clone, Default)]
pub struct BuiltinLoader {
	constructors: HashMap<String, BuiltinConstructor>,
}

impl BuiltinLoader {
	pub const UNIT_FILE: &'static str = "plugin.builtin";

	pub fn new() -> Self {
		Self::default()
	}

	/// A loader with all plugins shipped with the server.
	pub fn with_defaults() -> Self {
		Self::new().register("echo", || Ok(Box::new(EchoPlugin::default())))
	}

	#[must_use]
	pub fn register<F>(mut self, symbol: impl Into<String>, constructor: F) -> Self
	where
		F: Fn() -> Result<Box<dyn Plugin>, PluginError> + Send + Sync + 'static,
	{
		self.constructors
			.insert(symbol.into(), Arc::new(constructor));
		self
	}
}

impl UnitLoader for BuiltinLoader {
	fn load_unit(&self, directory: &Path) -> Result<Option<LoadedUnit>, UnitLoadError> {
		let path = directory.join(Self::UNIT_FILE);
		if !path.exists() {
			return Ok(None);
		}

		let content =
			std::fs::read_to_string(&path).map_err(|source| UnitLoadError::Unreadable {
				path: path.display().to_string(),
				source,
			})?;
		let symbol = content.trim();

		let Some(constructor) = self.constructors.get(symbol).cloned() else {
			debug!(path = %path.display(), symbol, "No builtin plugin registered under this name");
			return Ok(None);
		};

		Ok(Some(LoadedUnit {
			namespace: namespace(directory),
			constructor: Box::new(move || constructor()),
		}))
	}
}

/// Tries several loaders in order; the first one that finds a unit wins.
#[derive(Clone, Default)]
pub struct LoaderChain {
	loaders: Vec<Arc<dyn UnitLoader>>,
}

impl LoaderChain {
	pub fn new(loaders: Vec<Arc<dyn UnitLoader>>) -> Self {
		Self { loaders }
	}
}

impl UnitLoader for LoaderChain {
	fn load_unit(&self, directory: &Path) -> Result<Option<LoadedUnit>, UnitLoadError> {
		for loader in &self.loaders {
			if let Some(unit) = loader.load_unit(directory)? {
				return Ok(Some(unit));
			}
		}
		Ok(None)
	}
}
