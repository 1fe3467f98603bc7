//! FFI-safe type definitions for the plugin API.
//!
//! Payloads and results cross the boundary as JSON strings.

use abi_stable::{
	std_types::{RResult, RString},
	StableAbi,
};
use serde::Serialize;

/// FFI-safe error type for plugin operations.
#[repr(C)]
#[derive(StableAbi, Clone, Debug)]
pub struct FfiError {
	pub code: FfiErrorCode,
	pub message: RString,
}

impl FfiError {
	pub fn new(code: FfiErrorCode, message: impl Into<String>) -> Self {
		Self {
			code,
			message: RString::from(message.into()),
		}
	}

	pub fn invalid_request(message: impl Into<String>) -> Self {
		Self::new(FfiErrorCode::InvalidRequest, message)
	}

	pub fn backend(message: impl Into<String>) -> Self {
		Self::new(FfiErrorCode::Backend, message)
	}

	pub fn internal(message: impl Into<String>) -> Self {
		Self::new(FfiErrorCode::Internal, message)
	}
}

impl std::fmt::Display for FfiError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:?}: {}", self.code, self.message)
	}
}

impl std::error::Error for FfiError {}

/// Error codes for plugin operations.
#[repr(C)]
#[derive(StableAbi, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FfiErrorCode {
	/// Invalid task or payload
	InvalidRequest,
	/// Inference backend error (model, device, etc.)
	Backend,
	/// Internal plugin error
	Internal,
	/// Task not implemented by this plugin
	NotImplemented,
}

/// FFI-safe result type.
pub type FfiResult<T> = RResult<T, FfiError>;

/// JSON object passed to `infer`.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Parse the payload handed to `infer`.
pub fn decode_payload(payload_json: &RString) -> Result<Payload, FfiError> {
	serde_json::from_str(payload_json.as_str())
		.map_err(|e| FfiError::invalid_request(format!("Failed to parse payload: {e}")))
}

/// Serialize a task result for the host.
pub fn encode_result<T: Serialize>(value: &T) -> FfiResult<RString> {
	match serde_json::to_string(value) {
		Ok(json) => RResult::ROk(RString::from(json)),
		Err(e) => RResult::RErr(FfiError::internal(format!(
			"Failed to serialize result: {e}"
		))),
	}
}
