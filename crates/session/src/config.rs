//! Session configuration.
//!
//! Written in TOML; every key is optional:
//!
//! ```toml
//! scheduling = "asynchronous"      # or "synchronous"
//! worker-thread-name = "scribe-worker"
//! offset-encoding = "utf-16"       # "utf-8" | "utf-16" | "utf-32"
//! fallback-flags = ["-Wall"]
//! ```

use std::path::{Path, PathBuf};

use scribe_worker::SchedulerMode;
use serde::Deserialize;
use thiserror::Error;

use crate::position::OffsetEncoding;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or an unknown value.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},
}

/// Tunables of a [`crate::SessionManager`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct SessionConfig {
	/// Inline or single-worker scheduling.
	pub scheduling: SchedulerMode,
	/// Name of the worker thread in asynchronous mode.
	pub worker_thread_name: String,
	/// Column unit of positions exchanged with callers.
	pub offset_encoding: OffsetEncoding,
	/// Extra flags for files the compilation database does not know.
	pub fallback_flags: Vec<String>,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			scheduling: SchedulerMode::Asynchronous,
			worker_thread_name: "scribe-worker".to_string(),
			offset_encoding: OffsetEncoding::Utf16,
			fallback_flags: Vec::new(),
		}
	}
}

impl SessionConfig {
	/// Default configuration with inline scheduling, for deterministic tests.
	pub fn synchronous() -> Self {
		Self {
			scheduling: SchedulerMode::Synchronous,
			..Self::default()
		}
	}

	/// Parses TOML text.
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(text)?)
	}

	/// Reads and parses a TOML file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&text)
	}
}
