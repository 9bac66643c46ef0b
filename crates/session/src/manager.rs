//! Document session manager.
//!
//! # Purpose
//!
//! - Track open documents, turn edits and requests into serialized background work,
//!   and report build results to a [`DiagnosticsConsumer`].
//! - Give single-writer semantics over per-path build units to any number of caller
//!   threads without blocking callers longer than a request needs.
//!
//! # Mental model
//!
//! - [`DraftStore`] holds the latest text per path; every edit publishes a new
//!   immutable [`Draft`].
//! - [`UnitStore`] holds the latest build unit per path. Only the worker writes it.
//! - [`RequestScheduler`] runs build, cleanup, completion and dump tasks one at a time.
//! - The [`LanguageBackend`] builds units, completes and formats. The
//!   [`CompilationDatabase`] and [`FileSystemProvider`] are consulted once per build.
//!
//! # Key types
//!
//! | Type | Meaning | Constraints | Constructed / mutated in |
//! |---|---|---|---|
//! | [`SessionManager`] | Caller-facing API | Owns the scheduler; drop joins the worker | [`SessionManagerBuilder::build`] |
//! | [`Draft`] | Text snapshot at one [`DocVersion`] | Never mutated after publish | [`SessionManager::add_document`] |
//! | [`DiagnosticsReport`] | Result of one build task | Tagged with the draft version it was built from | worker build task |
//!
//! # Invariants
//!
//! - At most one draft and one unit per path.
//! - Completion, format and dump operations require a tracked path and fail with
//!   [`Error::NotTracked`] otherwise, before anything is scheduled.
//! - Every build task delivers exactly one report, tagged with its draft version.
//! - A unit built from an older draft never replaces a newer one, and a released path
//!   never gets a unit back from work that predates the removal.
//!
//! # Concurrency and ordering
//!
//! - Builds (add, reparse) go to the front of the queue, cleanups to the back.
//!   A fresher build may overtake an older queued one, so reports can arrive out
//!   of version order; consumers keep the highest version per path
//!   ([`crate::LatestDiagnostics`]).
//! - Completion runs on the worker at the front of the queue; the caller blocks.
//! - AST dump runs on the worker at the back of the queue, so it observes every task
//!   queued before it; the caller blocks.
//! - Formatting runs on the caller thread against the draft snapshot.
//! - Drafts are published on the caller thread before the build is queued.
//!
//! # Failure modes and recovery
//!
//! - Backend build failure, or a panic while building or reading findings: reported as [`BuildOutcome::Failed`] with no
//!   diagnostics; the previous unit, if any, stays installed.
//! - Panic inside a task: contained by the scheduler; a blocked caller gets
//!   [`crate::ScheduleError::Panicked`].
//! - Shutdown: queued tasks are dropped; blocked callers get [`crate::ScheduleError::Stopped`];
//!   later requests are ignored.

use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lsp_types::{CompletionItem, Diagnostic, Position, TextEdit};
use ropey::Rope;
use scribe_worker::{RequestScheduler, SchedulerMode, TaskClass, panic_message};
use tracing::{debug, debug_span, warn};

use crate::backend::{BuildError, BuildInput, BuildUnit, Finding, LanguageBackend, Replacement};
use crate::compile::{CompilationDatabase, CompileCommand};
use crate::config::SessionConfig;
use crate::diagnostics::{BuildOutcome, DiagnosticWithFixes, DiagnosticsConsumer, DiagnosticsReport};
use crate::draft::{DocVersion, Draft, DraftStore};
use crate::fs::{FileSystemProvider, RealFileSystemProvider};
use crate::position::{OffsetEncoding, PositionError, offsets_to_range, position_to_offset, range_to_offsets};
use crate::units::UnitStore;
use crate::{Error, Result};

/// Source name stamped on diagnostics.
const DIAGNOSTIC_SOURCE: &str = "scribe";

/// State shared between caller threads and the worker.
struct Shared<B: LanguageBackend> {
	drafts: DraftStore,
	units: UnitStore<B::Unit>,
	backend: B,
	compilation_db: Option<Box<dyn CompilationDatabase>>,
	fs_provider: Box<dyn FileSystemProvider>,
	consumer: Arc<dyn DiagnosticsConsumer>,
	encoding: OffsetEncoding,
	fallback_flags: Vec<String>,
}

/// Builder for [`SessionManager`].
pub struct SessionManagerBuilder<B: LanguageBackend> {
	backend: B,
	consumer: Arc<dyn DiagnosticsConsumer>,
	compilation_db: Option<Box<dyn CompilationDatabase>>,
	fs_provider: Option<Box<dyn FileSystemProvider>>,
	config: SessionConfig,
}

impl<B: LanguageBackend> std::fmt::Debug for SessionManagerBuilder<B> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionManagerBuilder")
			.field("compilation_db", &self.compilation_db.is_some())
			.field("fs_provider", &self.fs_provider.is_some())
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

impl<B: LanguageBackend> SessionManagerBuilder<B> {
	/// Set the compilation database. Without one every file gets the fallback command.
	pub fn compilation_database(mut self, db: impl CompilationDatabase + 'static) -> Self {
		self.compilation_db = Some(Box::new(db));
		self
	}

	/// Set the filesystem provider. Defaults to [`RealFileSystemProvider`].
	pub fn file_system_provider(mut self, provider: impl FileSystemProvider + 'static) -> Self {
		self.fs_provider = Some(Box::new(provider));
		self
	}

	/// Set the configuration.
	pub fn config(mut self, config: SessionConfig) -> Self {
		self.config = config;
		self
	}

	/// Loads the configuration from a TOML file.
	pub fn config_file(self, path: &Path) -> Result<Self> {
		let config = SessionConfig::load(path)?;
		Ok(self.config(config))
	}

	/// Starts the session; in asynchronous mode this spawns the worker thread.
	pub fn build(self) -> Result<SessionManager<B>> {
		let SessionConfig {
			scheduling,
			worker_thread_name,
			offset_encoding,
			fallback_flags,
		} = self.config;

		let scheduler = RequestScheduler::new(scheduling, worker_thread_name)?;
		let shared = Arc::new(Shared {
			drafts: DraftStore::new(),
			units: UnitStore::new(),
			backend: self.backend,
			compilation_db: self.compilation_db,
			fs_provider: self.fs_provider.unwrap_or_else(|| Box::new(RealFileSystemProvider)),
			consumer: self.consumer,
			encoding: offset_encoding,
			fallback_flags,
		});
		Ok(SessionManager { scheduler, shared })
	}
}

/// Manages the documents of one session.
pub struct SessionManager<B: LanguageBackend> {
	/// First field: dropping the manager stops and joins the worker before anything else.
	scheduler: RequestScheduler,
	shared: Arc<Shared<B>>,
}

impl<B: LanguageBackend> std::fmt::Debug for SessionManager<B> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionManager")
			.field("scheduler", &self.scheduler)
			.field("drafts", &self.shared.drafts)
			.field("units", &self.shared.units)
			.field("encoding", &self.shared.encoding)
			.finish()
	}
}

impl<B: LanguageBackend> SessionManager<B> {
	/// Starts building a session around `backend`, reporting to `consumer`.
	pub fn builder(backend: B, consumer: Arc<dyn DiagnosticsConsumer>) -> SessionManagerBuilder<B> {
		SessionManagerBuilder {
			backend,
			consumer,
			compilation_db: None,
			fs_provider: None,
			config: SessionConfig::default(),
		}
	}

	/// Tracks `path` with `contents`, or replaces the contents of a tracked path.
	///
	/// Schedules a build of the new draft ahead of all queued work; its report arrives
	/// later through the diagnostics consumer. Returns the published version.
	pub fn add_document(&self, path: impl AsRef<Path>, contents: &str) -> DocVersion {
		let path = path.as_ref();
		let draft = self.shared.drafts.update(path, Rope::from_str(contents));
		debug!(path = %path.display(), version = %draft.version(), "document.add");
		self.schedule_build(path, draft)
	}

	/// Stops tracking `path` and schedules release of its build unit behind all queued work.
	pub fn remove_document(&self, path: impl AsRef<Path>) -> Result<DocVersion> {
		let path = path.as_ref();
		let version = self
			.shared
			.drafts
			.remove(path)
			.ok_or_else(|| Error::NotTracked(path.to_path_buf()))?;
		debug!(path = %path.display(), version = %version, "document.remove");

		let shared = Arc::clone(&self.shared);
		let path = path.to_path_buf();
		self.scheduler.add_to_end(move || shared.release(&path, version));
		Ok(version)
	}

	/// Schedules a rebuild of the current draft of `path` without changing it.
	pub fn force_reparse(&self, path: impl AsRef<Path>) -> Result<DocVersion> {
		let path = path.as_ref();
		let draft = self.draft(path)?;
		debug!(path = %path.display(), version = %draft.version(), "document.reparse");
		Ok(self.schedule_build(path, draft))
	}

	/// Completion candidates at `pos` in the current draft of `path`.
	///
	/// Runs on the worker ahead of queued builds; blocks until it is answered.
	pub fn code_complete(&self, path: impl AsRef<Path>, pos: Position) -> Result<Vec<CompletionItem>> {
		let path = path.as_ref();
		let draft = self.draft(path)?;
		let offset = position_to_offset(draft.text(), pos, self.shared.encoding)?;

		let shared = Arc::clone(&self.shared);
		let path = path.to_path_buf();
		let items = self
			.scheduler
			.run_and_wait(TaskClass::Interactive, move || shared.complete(&path, &draft, offset))?;
		Ok(items)
	}

	/// Formatting edits for `range` of `path`.
	pub fn format_range(&self, path: impl AsRef<Path>, range: lsp_types::Range) -> Result<Vec<TextEdit>> {
		let path = path.as_ref();
		let draft = self.draft(path)?;
		let offsets = range_to_offsets(draft.text(), range, self.shared.encoding)?;
		self.format(path, &draft, offsets)
	}

	/// Formatting edits for all of `path`.
	pub fn format_file(&self, path: impl AsRef<Path>) -> Result<Vec<TextEdit>> {
		let path = path.as_ref();
		let draft = self.draft(path)?;
		let len = draft.text().len_chars();
		self.format(path, &draft, 0..len)
	}

	/// Formatting edits after a character was typed at `pos`.
	///
	/// Formats from the nearest `{` at or before `pos` through `pos`, or just `pos`
	/// when there is no such brace.
	pub fn format_on_type(&self, path: impl AsRef<Path>, pos: Position) -> Result<Vec<TextEdit>> {
		let path = path.as_ref();
		let draft = self.draft(path)?;
		let text = draft.text();
		let cursor = position_to_offset(text, pos, self.shared.encoding)?;
		let start = previous_open_brace(text, cursor).unwrap_or(cursor);
		let end = (cursor + 1).min(text.len_chars());
		self.format(path, &draft, start..end)
	}

	/// Current contents of `path`.
	pub fn get_document(&self, path: impl AsRef<Path>) -> Result<String> {
		Ok(self.draft(path.as_ref())?.text().to_string())
	}

	/// Waits for every task queued for the worker so far, then dumps the unit of `path`.
	pub fn dump_ast(&self, path: impl AsRef<Path>) -> Result<String> {
		let path = path.as_ref();
		if !self.shared.drafts.is_tracked(path) {
			return Err(Error::NotTracked(path.to_path_buf()));
		}

		let shared = Arc::clone(&self.shared);
		let owned = path.to_path_buf();
		self.scheduler
			.run_and_wait(TaskClass::Background, move || shared.dump(&owned))?
			.ok_or_else(|| Error::NoUnit(path.to_path_buf()))
	}

	/// Waits until every task queued so far has run.
	pub fn flush(&self) -> Result<()> {
		self.scheduler.run_and_wait(TaskClass::Background, || ())?;
		Ok(())
	}

	/// Latest version issued for `path`, tracked or not.
	pub fn version(&self, path: impl AsRef<Path>) -> DocVersion {
		self.shared.drafts.version(path.as_ref())
	}

	/// Returns `true` when `path` is tracked.
	pub fn is_tracked(&self, path: impl AsRef<Path>) -> bool {
		self.shared.drafts.is_tracked(path.as_ref())
	}

	/// All tracked paths, sorted.
	pub fn tracked_documents(&self) -> Vec<PathBuf> {
		self.shared.drafts.tracked_paths()
	}

	/// Returns `true` when a build unit is installed for `path`.
	pub fn has_unit(&self, path: impl AsRef<Path>) -> bool {
		self.shared.units.contains(path.as_ref())
	}

	/// Number of tasks waiting for the worker.
	pub fn pending_tasks(&self) -> usize {
		self.scheduler.pending()
	}

	/// Scheduling mode in effect.
	pub fn scheduling(&self) -> SchedulerMode {
		self.scheduler.mode()
	}

	/// Column encoding of positions exchanged with callers.
	pub fn offset_encoding(&self) -> OffsetEncoding {
		self.shared.encoding
	}

	/// Stops the worker. Queued tasks never run; later requests are ignored.
	pub fn shutdown(&self) {
		debug!("session.shutdown");
		self.scheduler.shutdown();
	}

	fn draft(&self, path: &Path) -> Result<Draft> {
		self.shared.drafts.get(path).ok_or_else(|| Error::NotTracked(path.to_path_buf()))
	}

	fn schedule_build(&self, path: &Path, draft: Draft) -> DocVersion {
		let version = draft.version();
		let shared = Arc::clone(&self.shared);
		let path = path.to_path_buf();
		self.scheduler.add_to_front(move || shared.build(&path, &draft));
		version
	}

	fn format(&self, path: &Path, draft: &Draft, range: Range<usize>) -> Result<Vec<TextEdit>> {
		let text = draft.text();
		self.shared
			.backend
			.format(path, text, range)
			.into_iter()
			.map(|replacement| replacement_to_edit(text, replacement, self.shared.encoding).map_err(Error::from))
			.collect()
	}
}

impl<B: LanguageBackend> Shared<B> {
	fn compile_command(&self, path: &Path) -> CompileCommand {
		self.compilation_db
			.as_ref()
			.and_then(|db| db.compile_command(path))
			.unwrap_or_else(|| CompileCommand::fallback(path, &self.fallback_flags))
	}

	fn build_unit(&self, path: &Path, draft: &Draft) -> std::result::Result<B::Unit, BuildError> {
		let command = self.compile_command(path);
		let fs = self.fs_provider.file_system();
		self.backend.build(BuildInput {
			path,
			draft,
			command: &command,
			fs: fs.as_ref(),
		})
	}

	/// Runs backend code, turning a panic into a [`BuildError`].
	fn catching<T>(&self, f: impl FnOnce() -> std::result::Result<T, BuildError>) -> std::result::Result<T, BuildError> {
		panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
			let message = panic_message(payload.as_ref()).unwrap_or_else(|| "unknown panic".to_string());
			Err(BuildError::new(format!("backend panicked: {message}")))
		})
	}

	/// Worker side of a build task.
	fn build(&self, path: &Path, draft: &Draft) {
		let span = debug_span!("build", path = %path.display(), version = %draft.version());
		let _guard = span.enter();

		// Every build task reports, even when the backend panics.
		let built = self.catching(|| {
			let unit = self.build_unit(path, draft)?;
			let diagnostics = self.convert_findings(draft.text(), unit.findings());
			Ok((unit, diagnostics))
		});
		let (diagnostics, outcome) = match built {
			Ok((unit, diagnostics)) => {
				if !self.units.install(path, draft.version(), Arc::new(unit)) {
					debug!("unit superseded by a newer version or a removal");
				}
				(diagnostics, BuildOutcome::Built)
			}
			Err(err) => {
				warn!(error = %err, "build failed");
				(
					Vec::new(),
					BuildOutcome::Failed {
						reason: err.message().to_string(),
					},
				)
			}
		};

		debug!(count = diagnostics.len(), "diagnostics ready");
		self.consumer.on_diagnostics_ready(DiagnosticsReport {
			path: path.to_path_buf(),
			version: draft.version(),
			diagnostics,
			outcome,
		});
	}

	/// Worker side of a cleanup task.
	fn release(&self, path: &Path, version: DocVersion) {
		let released = self.units.release(path, version);
		debug!(path = %path.display(), version = %version, released, "unit.release");
	}

	/// Worker side of a completion request.
	fn complete(&self, path: &Path, draft: &Draft, offset: usize) -> Vec<CompletionItem> {
		let unit = match self.units.get(path) {
			Some((_, unit)) => unit,
			None => match self.catching(|| self.build_unit(path, draft)) {
				Ok(unit) => {
					let unit = Arc::new(unit);
					self.units.install(path, draft.version(), Arc::clone(&unit));
					unit
				}
				Err(err) => {
					warn!(path = %path.display(), error = %err, "no unit for completion");
					return Vec::new();
				}
			},
		};
		self.backend.complete(&unit, draft, offset)
	}

	/// Worker side of an AST dump.
	fn dump(&self, path: &Path) -> Option<String> {
		self.units.get(path).map(|(_, unit)| unit.dump())
	}

	fn convert_findings(&self, text: &Rope, findings: Vec<Finding>) -> Vec<DiagnosticWithFixes> {
		findings
			.into_iter()
			.filter_map(|finding| match finding_to_diagnostic(text, finding, self.encoding) {
				Ok(diagnostic) => Some(diagnostic),
				Err(err) => {
					warn!(error = %err, "dropping finding with invalid range");
					None
				}
			})
			.collect()
	}
}

fn replacement_to_edit(text: &Rope, replacement: Replacement, encoding: OffsetEncoding) -> std::result::Result<TextEdit, PositionError> {
	Ok(TextEdit {
		range: offsets_to_range(text, replacement.range, encoding)?,
		new_text: replacement.text,
	})
}

fn finding_to_diagnostic(text: &Rope, finding: Finding, encoding: OffsetEncoding) -> std::result::Result<DiagnosticWithFixes, PositionError> {
	let range = offsets_to_range(text, finding.range, encoding)?;
	let fixes = finding
		.fixes
		.into_iter()
		.map(|fix| replacement_to_edit(text, fix, encoding))
		.collect::<std::result::Result<Vec<_>, _>>()?;
	Ok(DiagnosticWithFixes {
		diagnostic: Diagnostic {
			range,
			severity: Some(finding.severity),
			source: Some(DIAGNOSTIC_SOURCE.to_string()),
			message: finding.message,
			..Diagnostic::default()
		},
		fixes,
	})
}

/// Index of the last `{` at or before `cursor`.
fn previous_open_brace(text: &Rope, cursor: usize) -> Option<usize> {
	let last = text.len_chars().checked_sub(1)?;
	(0..=cursor.min(last)).rev().find(|&idx| text.char(idx) == '{')
}
