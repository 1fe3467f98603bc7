//! Plugin registry for discovering and managing plugins.

use crate::backend::plugin::{
	panic_message, plugin_metadata, LoadedUnit, Metadata, Payload, Plugin, PluginError,
	UnitLoadError, UnitLoader,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, error, field, info, info_span, warn};

/// Directory names that are never plugins.
const RESERVED_DIRECTORIES: &[&str] = &["__pycache__", "target"];

/// Metadata of all resident plugins, keyed by plugin name.
pub type MetadataIndex = BTreeMap<String, Metadata>;

/// A constructed and initialized plugin.
pub struct PluginInstance {
	name: String,
	namespace: String,
	plugin: Box<dyn Plugin>,
}

impl PluginInstance {
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	pub fn infer(&self, payload: Payload) -> Result<serde_json::Value, PluginError> {
		self.plugin.infer(payload)
	}
}

impl std::fmt::Debug for PluginInstance {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PluginInstance")
			.field("name", &self.name)
			.field("namespace", &self.namespace)
			.finish_non_exhaustive()
	}
}

/// Errors that keep a plugin out of the registry.
#[derive(Debug, Error)]
pub enum LoadError {
	#[error(transparent)]
	Unit(#[from] UnitLoadError),

	#[error("Plugin construction failed: {0}")]
	Construct(PluginError),

	#[error("Plugin load hook failed: {0}")]
	Initialize(PluginError),

	#[error("Plugin panicked while loading: {0}")]
	Panicked(String),
}

/// A plugin directory that failed to load during a discovery pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadFailure {
	pub plugin: String,
	pub directory: PathBuf,
	pub error: String,
}

/// Outcome of a single discovery pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryReport {
	/// Plugins loaded by this pass.
	pub loaded: Vec<String>,
	/// Plugins that were resident before this pass and left untouched.
	pub already_loaded: Vec<String>,
	/// Directories without a plugin unit.
	pub skipped: Vec<String>,
	pub failures: Vec<LoadFailure>,
}

#[derive(Default)]
struct RegistryState {
	plugins: BTreeMap<String, Arc<PluginInstance>>,
	/// Keyed identically to `plugins`.
	metadata: MetadataIndex,
	/// Failures of the most recent discovery pass.
	failures: Vec<LoadFailure>,
}

/// Registry of resident plugins, populated by scanning a plugin root.
///
/// Lookups take a read lock only. Discovery passes are serialized, and a
/// plugin is inserted into both maps under a single write lock.
pub struct PluginRegistry {
	root: PathBuf,
	loader: Arc<dyn UnitLoader>,
	state: RwLock<RegistryState>,
	discovery: Mutex<()>,
}

impl PluginRegistry {
	/// Create a new empty plugin registry for the given plugin root.
	pub fn new(root: impl Into<PathBuf>, loader: Arc<dyn UnitLoader>) -> Self {
		Self {
			root: root.into(),
			loader,
			state: RwLock::default(),
			discovery: Mutex::new(()),
		}
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Scan the plugin root and load every plugin that is not resident yet.
	///
	/// With `reload` set, all resident plugins are dropped first and every
	/// directory is loaded from scratch. Failing plugins are reported and
	/// skipped; they never abort the pass.
	pub fn discover(&self, reload: bool) -> DiscoveryReport {
		let _pass = self
			.discovery
			.lock()
			.unwrap_or_else(PoisonError::into_inner);

		if reload {
			let mut state = self.write();
			state.plugins.clear();
			state.metadata.clear();
			info!("Cleared plugin registry for reload");
		}

		let mut report = DiscoveryReport::default();
		let candidates = match self.candidates() {
			Ok(candidates) => candidates,
			Err(error) => {
				warn!(root = %self.root.display(), "Cannot read plugin directory: {error}");
				self.write().failures.clear();
				return report;
			}
		};

		for (name, directory) in candidates {
			if self.read().plugins.contains_key(&name) {
				report.already_loaded.push(name);
				continue;
			}

			match self.load_plugin(&name, &directory) {
				Ok(Some(instance)) => {
					let metadata = plugin_metadata(&name, &directory);
					let mut state = self.write();
					state.plugins.insert(name.clone(), Arc::new(instance));
					state.metadata.insert(name.clone(), metadata);
					report.loaded.push(name);
				}
				Ok(None) => {
					debug!(plugin.name = %name, "Directory contains no plugin unit");
					report.skipped.push(name);
				}
				Err(error) => {
					error!(
						plugin.name = %name,
						directory = %directory.display(),
						"Failed to load plugin: {error}"
					);
					report.failures.push(LoadFailure {
						plugin: name,
						directory,
						error: error.to_string(),
					});
				}
			}
		}

		let mut state = self.write();
		state.failures.clone_from(&report.failures);
		info!(
			plugins.loaded = report.loaded.len(),
			plugins.failed = report.failures.len(),
			plugins.resident = state.plugins.len(),
			"Plugin discovery finished"
		);
		drop(state);

		report
	}

	/// Immediate subdirectories of the root that may hold a plugin, sorted by name.
	fn candidates(&self) -> std::io::Result<Vec<(String, PathBuf)>> {
		let mut candidates = Vec::new();
		for entry in std::fs::read_dir(&self.root)? {
			let entry = match entry {
				Ok(entry) => entry,
				Err(error) => {
					warn!(root = %self.root.display(), "Skipping unreadable entry: {error}");
					continue;
				}
			};

			let path = entry.path();
			if !path.is_dir() {
				continue;
			}

			let Ok(name) = entry.file_name().into_string() else {
				warn!(directory = %path.display(), "Skipping directory with a non UTF-8 name");
				continue;
			};

			if name.starts_with('.') || RESERVED_DIRECTORIES.contains(&name.as_str()) {
				continue;
			}

			candidates.push((name, path));
		}

		candidates.sort_by(|(a, _), (b, _)| a.cmp(b));
		Ok(candidates)
	}

	/// Load, construct and initialize the plugin in `directory`.
	///
	/// Returns `Ok(None)` if the directory holds no plugin unit.
	fn load_plugin(
		&self,
		name: &str,
		directory: &Path,
	) -> Result<Option<PluginInstance>, LoadError> {
		let span = info_span!("plugin", plugin.name = %name, plugin.namespace = field::Empty);
		let _entered = span.enter();

		catch_unwind(AssertUnwindSafe(|| -> Result<Option<PluginInstance>, LoadError> {
			let Some(LoadedUnit {
				namespace,
				constructor,
			}) = self.loader.load_unit(directory)?
			else {
				return Ok(None);
			};
			span.record("plugin.namespace", namespace.as_str());

			let mut plugin = constructor().map_err(LoadError::Construct)?;
			plugin.set_name(name);
			plugin.load().map_err(LoadError::Initialize)?;

			info!(plugin.name = %name, plugin.namespace = %namespace, "Loaded plugin");
			Ok(Some(PluginInstance {
				name: name.to_owned(),
				namespace,
				plugin,
			}))
		}))
		.unwrap_or_else(|payload| Err(LoadError::Panicked(panic_message(&*payload))))
	}

	/// Get a resident plugin by name.
	pub fn get(&self, name: &str) -> Option<Arc<PluginInstance>> {
		self.read().plugins.get(name).cloned()
	}

	/// Snapshot of the metadata of all resident plugins.
	pub fn all_metadata(&self) -> MetadataIndex {
		self.read().metadata.clone()
	}

	/// Failures of the most recent discovery pass.
	pub fn last_failures(&self) -> Vec<LoadFailure> {
		self.read().failures.clone()
	}

	pub fn len(&self) -> usize {
		self.read().plugins.len()
	}

	pub fn is_empty(&self) -> bool {
		self.read().plugins.is_empty()
	}

	fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
		self.state.read().unwrap_or_else(PoisonError::into_inner)
	}

	fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
		self.state.write().unwrap_or_else(PoisonError::into_inner)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backend::plugin::testing::{add_manifest, add_plugin, loader, Counters};
	use serde_json::json;
	use tempfile::TempDir;

	fn registry(counters: &Arc<Counters>) -> (TempDir, PluginRegistry) {
		let root = tempfile::tempdir().unwrap();
		let registry = PluginRegistry::new(root.path(), Arc::new(loader(counters)));
		(root, registry)
	}

	fn ping() -> Payload {
		let mut payload = Payload::new();
		payload.insert(String::from("task"), json!("ping"));
		payload
	}

	#[test]
	fn directories_without_unit_are_not_plugins() {
		let counters = Arc::default();
		let (root, registry) = registry(&counters);
		std::fs::create_dir(root.path().join("empty")).unwrap();
		let with_manifest = root.path().join("manifest-only");
		std::fs::create_dir(&with_manifest).unwrap();
		add_manifest(&with_manifest, r#"{"version": "1"}"#);

		let report = registry.discover(false);

		assert!(registry.is_empty());
		assert!(report.failures.is_empty());
		assert_eq!(report.skipped, ["empty", "manifest-only"]);
	}

	#[test]
	fn second_discovery_does_not_reload() {
		let counters = Arc::default();
		let (root, registry) = registry(&counters);
		add_plugin(root.path(), "alpha", "counting");

		let first = registry.discover(false);
		assert_eq!(first.loaded, ["alpha"]);
		let resident = registry.get("alpha").unwrap();

		let second = registry.discover(false);
		assert!(second.loaded.is_empty());
		assert_eq!(second.already_loaded, ["alpha"]);
		assert_eq!(registry.len(), 1);
		assert_eq!(counters.constructs(), 1);
		assert_eq!(counters.loads(), 1);
		assert!(Arc::ptr_eq(&resident, &registry.get("alpha").unwrap()));
	}

	#[test]
	fn reload_rebuilds_and_retries_failed_plugins() {
		let counters: Arc<Counters> = Arc::default();
		let (root, registry) = registry(&counters);
		add_plugin(root.path(), "alpha", "counting");
		add_plugin(root.path(), "flaky", "flaky");
		counters.fail_load.store(true, std::sync::atomic::Ordering::SeqCst);

		let report = registry.discover(false);
		assert_eq!(report.loaded, ["alpha"]);
		assert_eq!(report.failures.len(), 1);
		assert!(registry.get("flaky").is_none());
		let before = registry.get("alpha").unwrap();

		counters.fail_load.store(false, std::sync::atomic::Ordering::SeqCst);
		let report = registry.discover(true);

		assert_eq!(report.loaded, ["alpha", "flaky"]);
		assert!(report.failures.is_empty());
		assert!(registry.last_failures().is_empty());
		assert!(!Arc::ptr_eq(&before, &registry.get("alpha").unwrap()));
		assert_eq!(counters.constructs(), 4);
	}

	#[test]
	fn failed_plugin_is_retried_by_next_pass() {
		let counters: Arc<Counters> = Arc::default();
		let (root, registry) = registry(&counters);
		add_plugin(root.path(), "flaky", "flaky");
		counters.fail_load.store(true, std::sync::atomic::Ordering::SeqCst);

		registry.discover(false);
		assert!(registry.get("flaky").is_none());

		counters.fail_load.store(false, std::sync::atomic::Ordering::SeqCst);
		let report = registry.discover(false);
		assert_eq!(report.loaded, ["flaky"]);
		assert_eq!(counters.loads(), 2);
	}

	#[test]
	fn broken_plugins_do_not_affect_others() {
		let counters = Arc::default();
		let (root, registry) = registry(&counters);
		add_plugin(root.path(), "a-construct", "broken-construct");
		add_plugin(root.path(), "b-good", "counting");
		add_plugin(root.path(), "c-panics", "panicking");
		add_plugin(root.path(), "d-load", "broken-load");
		// Unit file that cannot be read
		std::fs::create_dir_all(root.path().join("e-unreadable/plugin.builtin")).unwrap();

		let report = registry.discover(false);

		assert_eq!(report.loaded, ["b-good"]);
		assert_eq!(registry.all_metadata().keys().collect::<Vec<_>>(), ["b-good"]);
		let failed: Vec<&str> = report
			.failures
			.iter()
			.map(|failure| failure.plugin.as_str())
			.collect();
		assert_eq!(failed, ["a-construct", "c-panics", "d-load", "e-unreadable"]);
		assert!(report.failures[1].error.contains("constructor panicked"));
		assert_eq!(registry.last_failures(), report.failures);
	}

	#[test]
	fn hidden_and_reserved_entries_are_ignored() {
		let counters = Arc::default();
		let (root, registry) = registry(&counters);
		add_plugin(root.path(), ".hidden", "counting");
		add_plugin(root.path(), "__pycache__", "counting");
		std::fs::write(root.path().join("stray.txt"), "not a directory").unwrap();

		let report = registry.discover(false);

		assert!(registry.is_empty());
		assert!(report.skipped.is_empty());
		assert_eq!(counters.constructs(), 0);
	}

	#[test]
	fn metadata_merges_manifest_under_directory_name() {
		let counters = Arc::default();
		let (root, registry) = registry(&counters);
		let vision = add_plugin(root.path(), "vision", "counting");
		add_manifest(&vision, r#"{"name": "renamed", "version": "1.2.0"}"#);
		let broken = add_plugin(root.path(), "broken-manifest", "counting");
		add_manifest(&broken, "{ definitely not json");

		registry.discover(false);

		let metadata = registry.all_metadata();
		assert_eq!(
			serde_json::Value::Object(metadata["vision"].clone()),
			json!({"name": "vision", "version": "1.2.0"})
		);
		assert_eq!(
			serde_json::Value::Object(metadata["broken-manifest"].clone()),
			json!({"name": "broken-manifest"})
		);
	}

	#[test]
	fn discovery_order_is_lexicographic() {
		let counters = Arc::default();
		let (root, registry) = registry(&counters);
		for name in ["zeta", "alpha", "mid"] {
			add_plugin(root.path(), name, "counting");
		}

		let report = registry.discover(false);
		assert_eq!(report.loaded, ["alpha", "mid", "zeta"]);
	}

	#[test]
	fn plugin_receives_its_directory_name() {
		let counters = Arc::default();
		let (root, registry) = registry(&counters);
		add_plugin(root.path(), "speech", "counting");
		registry.discover(false);

		let plugin = registry.get("speech").unwrap();
		assert_eq!(plugin.name(), "speech");
		assert_eq!(plugin.namespace(), "plugins.speech");
		assert_eq!(plugin.infer(ping()).unwrap()["plugin"], "speech");
	}

	#[test]
	fn missing_root_yields_empty_registry() {
		let counters = Arc::default();
		let registry = PluginRegistry::new(
			"/nonexistent/neuroserve/plugins",
			Arc::new(loader(&counters)),
		);

		let report = registry.discover(false);
		assert!(registry.is_empty());
		assert!(report.loaded.is_empty());
		assert!(report.failures.is_empty());
	}

	#[test]
	fn concurrent_discovery_loads_each_plugin_once() {
		let counters = Arc::default();
		let (root, registry) = registry(&counters);
		for name in ["one", "two", "three"] {
			add_plugin(root.path(), name, "counting");
		}

		std::thread::scope(|scope| {
			for _ in 0..4 {
				scope.spawn(|| registry.discover(false));
			}
		});

		assert_eq!(registry.len(), 3);
		assert_eq!(counters.loads(), 3);
		assert_eq!(registry.all_metadata().len(), 3);
	}
}
