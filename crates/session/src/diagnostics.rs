//! Versioned diagnostics reports and the consumers that receive them.
//!
//! Reports are delivered from the worker thread, possibly out of version order:
//! a fresher build is inserted at the front of the queue and can overtake an older
//! one. Consumers must keep only the newest version per path; [`LatestDiagnostics`]
//! does exactly that.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use lsp_types::{Diagnostic, DiagnosticSeverity, TextEdit};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::trace;

use crate::draft::DocVersion;

/// A diagnostic with the edits that would fix it.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticWithFixes {
	/// The diagnostic.
	pub diagnostic: Diagnostic,
	/// Suggested fixes.
	pub fixes: Vec<TextEdit>,
}

/// Whether the build behind a report produced a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
	/// A unit was built; diagnostics are complete.
	Built,
	/// The backend failed; diagnostics are empty.
	Failed {
		/// Backend failure message.
		reason: String,
	},
}

/// Result of one build task.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsReport {
	/// Document path.
	pub path: PathBuf,
	/// Draft version the build ran against.
	pub version: DocVersion,
	/// Diagnostics, empty when the build failed.
	pub diagnostics: Vec<DiagnosticWithFixes>,
	/// Build outcome.
	pub outcome: BuildOutcome,
}

impl DiagnosticsReport {
	/// Number of error diagnostics.
	pub fn error_count(&self) -> usize {
		self.count(DiagnosticSeverity::ERROR)
	}

	/// Number of warning diagnostics.
	pub fn warning_count(&self) -> usize {
		self.count(DiagnosticSeverity::WARNING)
	}

	fn count(&self, severity: DiagnosticSeverity) -> usize {
		self.diagnostics
			.iter()
			.filter(|d| d.diagnostic.severity == Some(severity))
			.count()
	}
}

/// Receives diagnostics reports.
///
/// Called on the worker thread; implementations must be quick and must not wait on
/// the session.
pub trait DiagnosticsConsumer: Send + Sync {
	/// Called once per completed build task.
	fn on_diagnostics_ready(&self, report: DiagnosticsReport);
}

/// Sender for diagnostics reports.
pub type DiagnosticsReportSender = mpsc::UnboundedSender<DiagnosticsReport>;

/// Receiver for diagnostics reports.
pub type DiagnosticsReportReceiver = mpsc::UnboundedReceiver<DiagnosticsReport>;

/// Forwards every report into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelDiagnosticsConsumer {
	sender: DiagnosticsReportSender,
}

impl ChannelDiagnosticsConsumer {
	/// Creates a consumer and the receiver for its reports.
	pub fn channel() -> (Self, DiagnosticsReportReceiver) {
		let (sender, receiver) = mpsc::unbounded_channel();
		(Self { sender }, receiver)
	}
}

impl DiagnosticsConsumer for ChannelDiagnosticsConsumer {
	fn on_diagnostics_ready(&self, report: DiagnosticsReport) {
		if self.sender.send(report).is_err() {
			trace!("diagnostics receiver dropped");
		}
	}
}

/// Keeps the newest report per path and discards stale ones.
#[derive(Debug, Default)]
pub struct LatestDiagnostics {
	reports: RwLock<HashMap<PathBuf, DiagnosticsReport>>,
	/// Bumped on every accepted report.
	generation: AtomicU64,
}

impl LatestDiagnostics {
	/// Create a new empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Accepts `report` unless a newer version was already seen for its path.
	///
	/// Returns `true` when accepted. An equal version replaces the previous report
	/// (a forced reparse of the same draft).
	pub fn accept(&self, report: DiagnosticsReport) -> bool {
		let mut reports = self.reports.write();
		if let Some(current) = reports.get(&report.path)
			&& current.version > report.version
		{
			trace!(path = %report.path.display(), stale = %report.version, current = %current.version, "discarding stale diagnostics");
			return false;
		}
		reports.insert(report.path.clone(), report);
		self.generation.fetch_add(1, Ordering::Relaxed);
		true
	}

	/// Newest report for `path`.
	pub fn get(&self, path: &Path) -> Option<DiagnosticsReport> {
		self.reports.read().get(path).cloned()
	}

	/// Version of the newest report for `path`.
	pub fn version(&self, path: &Path) -> Option<DocVersion> {
		self.reports.read().get(path).map(|r| r.version)
	}

	/// Forgets `path`.
	pub fn clear(&self, path: &Path) {
		self.reports.write().remove(path);
	}

	/// Counter incremented on every accepted report.
	pub fn generation(&self) -> u64 {
		self.generation.load(Ordering::Relaxed)
	}

	/// Get total error count across all documents.
	pub fn total_error_count(&self) -> usize {
		self.reports.read().values().map(DiagnosticsReport::error_count).sum()
	}

	/// Get total warning count across all documents.
	pub fn total_warning_count(&self) -> usize {
		self.reports.read().values().map(DiagnosticsReport::warning_count).sum()
	}
}

impl DiagnosticsConsumer for LatestDiagnostics {
	fn on_diagnostics_ready(&self, report: DiagnosticsReport) {
		self.accept(report);
	}
}
