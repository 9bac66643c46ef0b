//! Common utilities for session integration tests.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use scribe_session::lsp_types::CompletionItem;
use scribe_session::{
	BuildError, BuildInput, BuildUnit, DiagnosticsConsumer, DiagnosticsReport, DocVersion, Draft, InMemoryFileSystem, LanguageBackend,
	LatestDiagnostics, PlainTextBackend, PlainTextUnit, Replacement, SessionConfig, SessionManager,
};
use tokio::sync::oneshot;

/// How long any wait in a test may take before it is considered hung.
pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Polls a condition until it holds or [`TIMEOUT`] passes.
pub fn wait_until(mut f: impl FnMut() -> bool) -> bool {
	let start = Instant::now();
	while start.elapsed() < TIMEOUT {
		if f() {
			return true;
		}
		std::thread::sleep(Duration::from_millis(5));
	}
	false
}

/// Holds the next build of one path until opened.
///
/// Dropping the gate without opening it also releases the build.
pub struct Gate {
	release: oneshot::Sender<()>,
	started: Option<oneshot::Receiver<()>>,
}

impl Gate {
	/// Blocks until the gated build is running on the worker.
	pub fn wait_started(&mut self) {
		if let Some(started) = self.started.take() {
			started.blocking_recv().expect("gated build never started");
		}
	}

	/// Lets the gated build finish.
	pub fn open(self) {
		let _ = self.release.send(());
	}
}

struct PendingGate {
	release: oneshot::Receiver<()>,
	started: oneshot::Sender<()>,
}

#[derive(Default)]
struct Script {
	builds: Mutex<Vec<(PathBuf, DocVersion)>>,
	build_count: AtomicUsize,
	gates: Mutex<HashMap<PathBuf, PendingGate>>,
	failing: Mutex<HashSet<PathBuf>>,
	panicking: Mutex<HashSet<PathBuf>>,
	panicking_findings: Mutex<HashSet<PathBuf>>,
}

/// [`PlainTextBackend`] with build counters, gates and failure injection.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
	script: Arc<Script>,
}

impl ScriptedBackend {
	pub fn new() -> Self {
		Self::default()
	}

	/// Total builds started.
	pub fn build_count(&self) -> usize {
		self.script.build_count.load(Ordering::SeqCst)
	}

	/// Versions built for `path`, in execution order.
	pub fn built_versions(&self, path: &str) -> Vec<DocVersion> {
		self.script
			.builds
			.lock()
			.iter()
			.filter(|(p, _)| p == Path::new(path))
			.map(|(_, v)| *v)
			.collect()
	}

	/// Holds the next build of `path` until the returned gate is opened.
	pub fn gate(&self, path: &str) -> Gate {
		let (release_tx, release_rx) = oneshot::channel();
		let (started_tx, started_rx) = oneshot::channel();
		self.script.gates.lock().insert(
			PathBuf::from(path),
			PendingGate {
				release: release_rx,
				started: started_tx,
			},
		);
		Gate {
			release: release_tx,
			started: Some(started_rx),
		}
	}

	/// Makes every build of `path` fail until [`Self::heal`].
	pub fn fail(&self, path: &str) {
		self.script.failing.lock().insert(PathBuf::from(path));
	}

	/// Makes every build of `path` panic until [`Self::heal`].
	pub fn panic_on(&self, path: &str) {
		self.script.panicking.lock().insert(PathBuf::from(path));
	}

	/// Makes units built for `path` panic when asked for findings, until [`Self::heal`].
	pub fn panic_in_findings(&self, path: &str) {
		self.script.panicking_findings.lock().insert(PathBuf::from(path));
	}

	pub fn heal(&self, path: &str) {
		self.script.failing.lock().remove(Path::new(path));
		self.script.panicking.lock().remove(Path::new(path));
		self.script.panicking_findings.lock().remove(Path::new(path));
	}
}

/// [`PlainTextUnit`] that can panic when its findings are read.
pub struct ScriptedUnit {
	inner: PlainTextUnit,
	panic_in_findings: bool,
}

impl BuildUnit for ScriptedUnit {
	fn findings(&self) -> Vec<scribe_session::Finding> {
		if self.panic_in_findings {
			panic!("scripted findings panic");
		}
		self.inner.findings()
	}

	fn dump(&self) -> String {
		self.inner.dump()
	}
}

impl LanguageBackend for ScriptedBackend {
	type Unit = ScriptedUnit;

	fn build(&self, input: BuildInput<'_>) -> Result<ScriptedUnit, BuildError> {
		self.script.build_count.fetch_add(1, Ordering::SeqCst);
		self.script
			.builds
			.lock()
			.push((input.path.to_path_buf(), input.draft.version()));

		let gate = self.script.gates.lock().remove(input.path);
		if let Some(gate) = gate {
			let _ = gate.started.send(());
			let _ = gate.release.blocking_recv();
		}

		if self.script.panicking.lock().contains(input.path) {
			panic!("scripted panic for {}", input.path.display());
		}
		if self.script.failing.lock().contains(input.path) {
			return Err(BuildError::new(format!("scripted failure for {}", input.path.display())));
		}
		let panic_in_findings = self.script.panicking_findings.lock().contains(input.path);
		Ok(ScriptedUnit {
			inner: PlainTextBackend.build(input)?,
			panic_in_findings,
		})
	}

	fn complete(&self, unit: &ScriptedUnit, draft: &Draft, offset: usize) -> Vec<CompletionItem> {
		PlainTextBackend.complete(&unit.inner, draft, offset)
	}

	fn format(&self, path: &Path, text: &ropey::Rope, range: Range<usize>) -> Vec<Replacement> {
		PlainTextBackend.format(path, text, range)
	}
}

/// Records every report in delivery order and keeps the newest per path.
#[derive(Default)]
pub struct RecordingConsumer {
	reports: Mutex<Vec<DiagnosticsReport>>,
	delivered: Condvar,
	latest: LatestDiagnostics,
}

impl RecordingConsumer {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Blocks until at least `count` reports arrived and returns all of them.
	pub fn wait_for(&self, count: usize) -> Vec<DiagnosticsReport> {
		let deadline = Instant::now() + TIMEOUT;
		let mut reports = self.reports.lock();
		while reports.len() < count {
			if self.delivered.wait_until(&mut reports, deadline).timed_out() {
				panic!("expected {count} reports, got {}: {:?}", reports.len(), *reports);
			}
		}
		reports.clone()
	}

	pub fn reports(&self) -> Vec<DiagnosticsReport> {
		self.reports.lock().clone()
	}

	/// Versions delivered for `path`, in delivery order.
	pub fn versions(&self, path: &str) -> Vec<DocVersion> {
		self.reports
			.lock()
			.iter()
			.filter(|r| r.path == Path::new(path))
			.map(|r| r.version)
			.collect()
	}

	pub fn latest(&self) -> &LatestDiagnostics {
		&self.latest
	}
}

impl DiagnosticsConsumer for RecordingConsumer {
	fn on_diagnostics_ready(&self, report: DiagnosticsReport) {
		self.latest.accept(report.clone());
		self.reports.lock().push(report);
		self.delivered.notify_all();
	}
}

/// A session over a [`ScriptedBackend`] and an in-memory filesystem.
pub struct Harness {
	pub session: SessionManager<ScriptedBackend>,
	pub backend: ScriptedBackend,
	pub consumer: Arc<RecordingConsumer>,
	pub fs: InMemoryFileSystem,
}

impl Harness {
	pub fn new(config: SessionConfig) -> Self {
		init_tracing();
		let backend = ScriptedBackend::new();
		let consumer = RecordingConsumer::new();
		let fs = InMemoryFileSystem::new();
		let session = SessionManager::builder(backend.clone(), consumer.clone())
			.file_system_provider(fs.clone())
			.config(config)
			.build()
			.expect("session should start");
		Self {
			session,
			backend,
			consumer,
			fs,
		}
	}

	pub fn synchronous() -> Self {
		Self::new(SessionConfig::synchronous())
	}

	pub fn asynchronous() -> Self {
		Self::new(SessionConfig {
			worker_thread_name: "scribe-test-worker".into(),
			..SessionConfig::default()
		})
	}
}
