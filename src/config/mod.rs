use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Deserializer};
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_CONFIG: &str = include_str!("defaults.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
	pub app: ApplicationConfig,
	pub telemetry: TelemetryConfig,
	pub server: ServerConfig,
	pub plugins: PluginsConfig,
}

impl AppConfig {
	/// Loads the configuration from the embedded defaults, an optional `config.toml`
	/// in the working directory and `NEUROSERVE_`-prefixed environment variables.
	///
	/// Nested keys are separated by a double underscore, e.g.
	/// `NEUROSERVE_SERVER__HTTP__PORT=9000`.
	pub fn new() -> Result<Self, ConfigError> {
		Self::builder()
			.add_source(File::with_name("config.toml").required(false))
			.add_source(
				Environment::with_prefix("NEUROSERVE")
					.prefix_separator("_")
					.separator("__")
					.try_parsing(true),
			)
			.build()?
			.try_deserialize()
	}

	fn builder() -> ConfigBuilder<config::builder::DefaultState> {
		Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
	}

	/// The embedded defaults without any file or environment overrides.
	#[cfg(test)]
	pub fn defaults() -> Self {
		Self::builder()
			.build()
			.and_then(Config::try_deserialize)
			.expect("embedded defaults are valid")
	}

	/// Short overview of the running configuration, served on `/env`.
	pub fn summary(&self) -> serde_json::Value {
		serde_json::json!({
			"app": self.app.name,
			"env": self.app.env,
			"host": self.server.http.interface.to_string(),
			"port": self.server.http.port,
			"plugins": {
				"directory": self.plugins.directory.display().to_string(),
				"eager": self.plugins.eager,
			},
			"logs": {
				"level": self.telemetry.level.to_string(),
				"sentry": self.telemetry.sentry.is_some(),
			},
		})
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationConfig {
	/// Display name of the service.
	pub name: String,
	/// Deployment environment (development, staging, production).
	pub env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
	/// Default log level. `RUST_LOG` takes precedence when set.
	#[serde(deserialize_with = "deserialize_level")]
	pub level: tracing::Level,
	/// Sentry DSN. Sentry stays disabled when unset.
	pub sentry: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
	pub http: HttpServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
	pub interface: IpAddr,
	pub port: u16,
	/// Maximum accepted request body size in bytes.
	pub max_upload_size: usize,
	/// Request timeout in seconds. Requests are not timed out when unset.
	pub request_timeout: Option<u64>,
	pub graceful_shutdown: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginsConfig {
	/// Root directory scanned for plugin directories.
	pub directory: PathBuf,
	/// Run discovery at startup instead of on the first request.
	pub eager: bool,
}

fn deserialize_level<'de, D>(deserializer: D) -> Result<tracing::Level, D::Error>
where
	D: Deserializer<'de>,
{
	let value = String::deserialize(deserializer)?;
	tracing::Level::from_str(&value).map_err(serde::de::Error::custom)
}
