//! Inference backends: the plugin runtime and the task dispatcher on top of it.

pub mod dispatch;
pub mod plugin;

pub use dispatch::{DispatchError, Dispatcher, TaskRequest, TaskResult};
