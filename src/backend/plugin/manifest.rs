//! Reading of the optional `manifest.json` next to a plugin unit.

use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Well-known manifest file name inside a plugin directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Insertion-ordered plugin metadata.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum ManifestError {
	#[error("Failed to read manifest: {0}")]
	Io(#[from] std::io::Error),

	#[error("Failed to parse manifest: {0}")]
	Parse(#[from] serde_json::Error),

	#[error("Manifest is not a JSON object")]
	NotAnObject,
}

/// Reads the manifest of a plugin directory.
///
/// Returns an empty map when the manifest is missing or unreadable, so a
/// broken manifest never keeps a plugin from being discovered.
pub fn read_manifest(directory: &Path) -> Metadata {
	let path = directory.join(MANIFEST_FILE);
	if !path.is_file() {
		return Metadata::new();
	}

	match parse_manifest(&path) {
		Ok(manifest) => manifest,
		Err(error) => {
			warn!(manifest = %path.display(), "Ignoring unreadable manifest: {error}");
			Metadata::new()
		}
	}
}

fn parse_manifest(path: &Path) -> Result<Metadata, ManifestError> {
	let content = std::fs::read_to_string(path)?;
	match serde_json::from_str(&content)? {
		serde_json::Value::Object(manifest) => Ok(manifest),
		_ => Err(ManifestError::NotAnObject),
	}
}

/// Builds the metadata for a discovered plugin: `{"name": name}` followed by
/// the manifest entries. The derived name always wins over a manifest `name`.
pub fn plugin_metadata(name: &str, directory: &Path) -> Metadata {
	let mut metadata = Metadata::new();
	metadata.insert(String::from("name"), name.into());
	metadata.extend(
		read_manifest(directory)
			.into_iter()
			.filter(|(key, _)| key != "name"),
	);
	metadata
}
