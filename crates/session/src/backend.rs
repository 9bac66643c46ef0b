//! Contracts for the language backend that builds, completes and formats documents.
//!
//! The session core never looks inside a build unit; it only stores units per path,
//! hands them back to the backend, and converts their char-offset findings into
//! protocol diagnostics.

use std::ops::Range;
use std::path::Path;

use lsp_types::{CompletionItem, DiagnosticSeverity};
use ropey::Rope;

use crate::compile::CompileCommand;
use crate::draft::Draft;
use crate::fs::FileSystem;

/// A text replacement, in char offsets of the text it was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
	/// Replaced char range.
	pub range: Range<usize>,
	/// Inserted text.
	pub text: String,
}

impl Replacement {
	/// Creates a replacement.
	pub fn new(range: Range<usize>, text: impl Into<String>) -> Self {
		Self { range, text: text.into() }
	}

	/// Creates a deletion of `range`.
	pub fn delete(range: Range<usize>) -> Self {
		Self::new(range, String::new())
	}
}

/// A problem reported by a build, in char offsets of the built draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
	/// Affected char range.
	pub range: Range<usize>,
	/// Severity.
	pub severity: DiagnosticSeverity,
	/// Human-readable message.
	pub message: String,
	/// Suggested fixes.
	pub fixes: Vec<Replacement>,
}

/// The backend could not produce a usable build unit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BuildError {
	message: String,
}

impl BuildError {
	/// Creates a build error.
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}

	/// Returns the failure message.
	pub fn message(&self) -> &str {
		&self.message
	}
}

/// Everything a build task hands to [`LanguageBackend::build`].
pub struct BuildInput<'a> {
	/// Document path.
	pub path: &'a Path,
	/// Draft snapshot being built.
	pub draft: &'a Draft,
	/// Compile command resolved for `path`.
	pub command: &'a CompileCommand,
	/// Filesystem view for this build.
	pub fs: &'a dyn FileSystem,
}

/// A built model of one document at one version.
pub trait BuildUnit: Send + Sync + 'static {
	/// Problems found while building.
	fn findings(&self) -> Vec<Finding>;

	/// Textual dump of the unit, for debugging and tests.
	fn dump(&self) -> String;
}

/// The external language engine.
///
/// `build` and `complete` only ever run on the session worker; `format` runs on
/// caller threads against an immutable draft snapshot.
pub trait LanguageBackend: Send + Sync + 'static {
	/// Unit type produced by [`Self::build`].
	type Unit: BuildUnit;

	/// Builds a unit for a draft.
	fn build(&self, input: BuildInput<'_>) -> Result<Self::Unit, BuildError>;

	/// Completion candidates at char `offset` of `draft`.
	///
	/// `unit` may have been built from an older version than `draft`.
	fn complete(&self, unit: &Self::Unit, draft: &Draft, offset: usize) -> Vec<CompletionItem>;

	/// Formatting replacements for the char `range` of `text`.
	fn format(&self, path: &Path, text: &Rope, range: Range<usize>) -> Vec<Replacement>;
}
