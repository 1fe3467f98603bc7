//! Example plugin demonstrating how to implement a NeuroServe plugin.
//!
//! Build it with `cargo build --release` in this directory and copy the
//! resulting library to `plugins/<name>/plugin.so` (or `.dylib`/`.dll`).
//!
//! Supported tasks:
//! * `ping` - echoes the payload back without the injected `task` key

use abi_stable::std_types::{RResult, RString};
use neuroserve_plugin_api::{
	declare_plugin, decode_payload, encode_result, FfiError, FfiErrorCode, FfiResult,
	InferencePlugin, InferencePlugin_TO, Payload,
};
use serde::Serialize;

#[derive(Default)]
struct EchoPlugin {
	name: String,
	loaded: bool,
}

#[derive(Serialize)]
struct PingResponse {
	task: String,
	payload_received: Payload,
}

impl InferencePlugin for EchoPlugin {
	fn set_name(&mut self, name: RString) {
		self.name = name.into_string();
	}

	fn load(&mut self) -> FfiResult<()> {
		// A real plugin would load model weights here
		self.loaded = true;
		RResult::ROk(())
	}

	fn infer(&self, payload_json: RString) -> FfiResult<RString> {
		if !self.loaded {
			return RResult::RErr(FfiError::internal(format!(
				"Plugin {} not loaded",
				self.name
			)));
		}

		let mut payload = match decode_payload(&payload_json) {
			Ok(payload) => payload,
			Err(err) => return RResult::RErr(err),
		};

		let task = match payload.remove("task") {
			Some(serde_json::Value::String(task)) => task,
			_ => return RResult::RErr(FfiError::invalid_request("Missing task")),
		};

		match task.as_str() {
			"ping" => encode_result(&PingResponse {
				task,
				payload_received: payload,
			}),
			other => RResult::RErr(FfiError::new(
				FfiErrorCode::NotImplemented,
				format!("Unsupported task '{other}'"),
			)),
		}
	}
}

declare_plugin! {
	version: env!("CARGO_PKG_VERSION"),
	create: || InferencePlugin_TO::from_value(EchoPlugin::default(), abi_stable::sabi_trait::TD_Opaque),
}
