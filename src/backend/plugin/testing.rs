//! Test fixtures shared by the registry, dispatcher and route tests.

use crate::backend::plugin::manifest::MANIFEST_FILE;
use crate::backend::plugin::{BuiltinLoader, EchoPlugin, Payload, Plugin, PluginError};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

#[derive(Debug)]
pub struct Counters {
	pub constructs: AtomicUsize,
	pub loads: AtomicUsize,
	pub infers: AtomicUsize,
	/// Makes `flaky` plugins fail their `load` hook while set.
	pub fail_load: AtomicBool,
	/// Two `infer` calls with `"rendezvous": true` block until both arrived.
	pub rendezvous: Barrier,
}

impl Default for Counters {
	fn default() -> Self {
		Self {
			constructs: AtomicUsize::new(0),
			loads: AtomicUsize::new(0),
			infers: AtomicUsize::new(0),
			fail_load: AtomicBool::new(false),
			rendezvous: Barrier::new(2),
		}
	}
}

impl Counters {
	pub fn constructs(&self) -> usize {
		self.constructs.load(Ordering::SeqCst)
	}

	pub fn loads(&self) -> usize {
		self.loads.load(Ordering::SeqCst)
	}

	pub fn infers(&self) -> usize {
		self.infers.load(Ordering::SeqCst)
	}
}

/// Records every lifecycle call. `infer` fails on `"fail": true`, panics on
/// `"panic": true` and otherwise returns its name and payload.
pub struct CountingPlugin {
	name: String,
	counters: Arc<Counters>,
	load_mode: LoadMode,
}

#[derive(Clone, Copy)]
enum LoadMode {
	Succeed,
	/// Fails while [`Counters::fail_load`] is set.
	Flaky,
	Fail,
}

impl CountingPlugin {
	fn new(counters: &Arc<Counters>, load_mode: LoadMode) -> Box<dyn Plugin> {
		counters.constructs.fetch_add(1, Ordering::SeqCst);
		Box::new(Self {
			name: String::new(),
			counters: Arc::clone(counters),
			load_mode,
		})
	}
}

impl Plugin for CountingPlugin {
	fn set_name(&mut self, name: &str) {
		name.clone_into(&mut self.name);
	}

	fn load(&mut self) -> Result<(), PluginError> {
		self.counters.loads.fetch_add(1, Ordering::SeqCst);
		let fail = match self.load_mode {
			LoadMode::Succeed => false,
			LoadMode::Flaky => self.counters.fail_load.load(Ordering::SeqCst),
			LoadMode::Fail => true,
		};
		if fail {
			return Err(PluginError::failed("model weights unavailable"));
		}
		Ok(())
	}

	fn infer(&self, payload: Payload) -> Result<Value, PluginError> {
		self.counters.infers.fetch_add(1, Ordering::SeqCst);
		let flag = |key: &str| payload.get(key) == Some(&Value::Bool(true));
		if flag("rendezvous") {
			self.counters.rendezvous.wait();
		}
		if flag("panic") {
			panic!("infer panicked");
		}
		if flag("fail") {
			return Err(PluginError::failed("requested failure"));
		}
		Ok(json!({
			"plugin": self.name,
			"payload": payload,
		}))
	}
}

/// Builtin loader with the test symbols `counting`, `flaky`, `broken-construct`,
/// `broken-load`, `panicking` and `echo`.
pub fn loader(counters: &Arc<Counters>) -> BuiltinLoader {
	let counting = Arc::clone(counters);
	let flaky = Arc::clone(counters);
	let broken_load = Arc::clone(counters);

	BuiltinLoader::new()
		.register("counting", move || Ok(CountingPlugin::new(&counting, LoadMode::Succeed)))
		.register("flaky", move || Ok(CountingPlugin::new(&flaky, LoadMode::Flaky)))
		.register("broken-construct", || {
			Err(PluginError::failed("constructor exploded"))
		})
		.register("broken-load", move || Ok(CountingPlugin::new(&broken_load, LoadMode::Fail)))
		.register("panicking", || -> Result<Box<dyn Plugin>, PluginError> {
			panic!("constructor panicked")
		})
		.register("echo", || Ok(Box::new(EchoPlugin::default())))
}

/// Creates `<root>/<name>/plugin.builtin` pointing at `symbol`.
pub fn add_plugin(root: &Path, name: &str, symbol: &str) -> PathBuf {
	let dir = root.join(name);
	std::fs::create_dir_all(&dir).unwrap();
	std::fs::write(dir.join(BuiltinLoader::UNIT_FILE), symbol).unwrap();
	dir
}

pub fn add_manifest(dir: &Path, content: &str) {
	std::fs::write(dir.join(MANIFEST_FILE), content).unwrap();
}
