//! Session core of a source-editing backend.
//!
//! [`SessionManager`] tracks open documents, serializes their builds onto one
//! worker through [`scribe_worker::RequestScheduler`], and reports versioned
//! results to a [`DiagnosticsConsumer`]. Parsing, completion and formatting come
//! from a [`LanguageBackend`]; [`PlainTextBackend`] is a small complete one.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use scribe_session::{LatestDiagnostics, PlainTextBackend, SessionManager};
//!
//! let latest = Arc::new(LatestDiagnostics::new());
//! let session = SessionManager::builder(PlainTextBackend, latest.clone()).build()?;
//! session.add_document("/notes/todo.txt", "buy milk \n");
//! session.flush()?;
//! assert_eq!(latest.total_warning_count(), 1);
//! # Ok::<(), scribe_session::Error>(())
//! ```
#![warn(missing_docs)]

use std::path::PathBuf;

pub use lsp_types;
pub use scribe_worker::{ScheduleError, SchedulerMode};

mod backend;
mod compile;
mod config;
mod diagnostics;
mod draft;
mod fs;
mod manager;
pub mod plaintext;
pub mod position;
mod units;

pub use backend::{BuildError, BuildInput, BuildUnit, Finding, LanguageBackend, Replacement};
pub use compile::{CompilationDatabase, CompileCommand, CompileDbError, FixedCompilationDatabase, JsonCompilationDatabase};
pub use config::{ConfigError, SessionConfig};
pub use diagnostics::{
	BuildOutcome, ChannelDiagnosticsConsumer, DiagnosticWithFixes, DiagnosticsConsumer, DiagnosticsReport,
	DiagnosticsReportReceiver, DiagnosticsReportSender, LatestDiagnostics,
};
pub use draft::{DocVersion, Draft, DraftStore};
pub use fs::{FileSystem, FileSystemProvider, InMemoryFileSystem, RealFileSystem, RealFileSystemProvider};
pub use manager::{SessionManager, SessionManagerBuilder};
pub use plaintext::{PlainTextBackend, PlainTextUnit};
pub use position::{OffsetEncoding, PositionError};
pub use units::UnitStore;

/// Errors returned by [`SessionManager`] operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The path has no active document.
	#[error("document is not tracked: {}", .0.display())]
	NotTracked(PathBuf),
	/// A position or range does not address the document text.
	#[error("invalid position: {0}")]
	InvalidPosition(#[from] PositionError),
	/// The document is tracked but no build unit is installed for it.
	#[error("no build unit for {}", .0.display())]
	NoUnit(PathBuf),
	/// The worker dropped or failed the request.
	#[error(transparent)]
	Schedule(#[from] ScheduleError),
	/// The worker thread could not be started.
	#[error("failed to start worker: {0}")]
	Io(#[from] std::io::Error),
	/// Configuration could not be loaded.
	#[error(transparent)]
	Config(#[from] ConfigError),
}

/// Result type for session operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
