//! Serialized request execution with front/back priority insertion.
//!
//! # Mental model
//!
//! - One double-ended queue guarded by a mutex, one condition variable, one worker thread.
//! - [`TaskClass::Interactive`] requests are pushed to the front (most recent first),
//!   [`TaskClass::Background`] requests to the back (FIFO).
//! - The worker pops from the front and runs each request to completion. There is no
//!   preemption and no cancellation of a started request.
//! - [`SchedulerMode::Synchronous`] has no worker at all: every request runs inline on
//!   the submitting thread before the submit call returns.
//!
//! # Invariants
//!
//! - At most one request executes at a time.
//! - After [`RequestScheduler::shutdown`] no queued or newly submitted request ever runs.
//!   A request already running is allowed to finish and the worker is joined.
//! - A panicking request never takes the worker down.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};

use parking_lot::{Condvar, Mutex};
use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::{debug, error, trace};

use crate::{TaskClass, panic_message, spawn_named_thread};

/// A unit of deferred work.
pub type Request = Box<dyn FnOnce() + Send + 'static>;

/// Where requests execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerMode {
	/// Inline on the submitting thread. Deterministic; intended for tests.
	Synchronous,
	/// On one dedicated background worker thread.
	#[default]
	Asynchronous,
}

/// Failure of [`RequestScheduler::run_and_wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
	/// The request was discarded by shutdown or submitted after it.
	#[error("scheduler shut down before the request completed")]
	Stopped,
	/// The request panicked while running.
	#[error("request panicked on the worker")]
	Panicked,
}

struct QueuedRequest {
	class: TaskClass,
	request: Request,
}

#[derive(Default)]
struct QueueState {
	requests: VecDeque<QueuedRequest>,
	/// Setting this makes the worker exit without draining `requests`.
	done: bool,
}

#[derive(Default)]
struct Shared {
	state: Mutex<QueueState>,
	request_cv: Condvar,
}

/// Runs submitted requests one at a time, either inline or on a single worker thread.
pub struct RequestScheduler {
	mode: SchedulerMode,
	shared: Arc<Shared>,
	worker: Mutex<Option<JoinHandle<()>>>,
	worker_id: Option<ThreadId>,
}

impl std::fmt::Debug for RequestScheduler {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.shared.state.lock();
		f.debug_struct("RequestScheduler")
			.field("mode", &self.mode)
			.field("pending", &state.requests.len())
			.field("done", &state.done)
			.field("worker_id", &self.worker_id)
			.finish()
	}
}

impl RequestScheduler {
	/// Creates a scheduler in `mode`.
	///
	/// In [`SchedulerMode::Asynchronous`] a worker thread named `thread_name` is started
	/// immediately; it lives until [`Self::shutdown`] or drop.
	pub fn new(mode: SchedulerMode, thread_name: impl Into<String>) -> std::io::Result<Self> {
		let shared = Arc::new(Shared::default());
		let (worker, worker_id) = match mode {
			SchedulerMode::Synchronous => (None, None),
			SchedulerMode::Asynchronous => {
				let worker_shared = Arc::clone(&shared);
				let handle = spawn_named_thread(TaskClass::Background, thread_name, move || run_worker(&worker_shared))?;
				let id = handle.thread().id();
				(Some(handle), Some(id))
			}
		};
		debug!(mode = ?mode, "scheduler.start");
		Ok(Self {
			mode,
			shared,
			worker: Mutex::new(worker),
			worker_id,
		})
	}

	/// Creates a scheduler that runs everything inline.
	pub fn synchronous() -> Self {
		Self {
			mode: SchedulerMode::Synchronous,
			shared: Arc::new(Shared::default()),
			worker: Mutex::new(None),
			worker_id: None,
		}
	}

	/// Returns the configured mode.
	pub fn mode(&self) -> SchedulerMode {
		self.mode
	}

	/// Schedules `f` ahead of everything currently queued.
	pub fn add_to_front(&self, f: impl FnOnce() + Send + 'static) {
		self.submit(TaskClass::Interactive, f);
	}

	/// Schedules `f` after everything currently queued.
	pub fn add_to_end(&self, f: impl FnOnce() + Send + 'static) {
		self.submit(TaskClass::Background, f);
	}

	/// Schedules `f` at the queue end chosen by `class`.
	///
	/// Silently drops `f` once shutdown has begun.
	pub fn submit(&self, class: TaskClass, f: impl FnOnce() + Send + 'static) {
		let request: Request = Box::new(f);
		match self.mode {
			SchedulerMode::Synchronous => {
				if self.shared.state.lock().done {
					trace!(worker_class = class.as_str(), "scheduler.drop_after_shutdown");
					return;
				}
				run_request(class, request);
			}
			SchedulerMode::Asynchronous => {
				let mut state = self.shared.state.lock();
				if state.done {
					drop(state);
					trace!(worker_class = class.as_str(), "scheduler.drop_after_shutdown");
					return;
				}
				let queued = QueuedRequest { class, request };
				match class {
					TaskClass::Interactive => state.requests.push_front(queued),
					TaskClass::Background => state.requests.push_back(queued),
				}
				let pending = state.requests.len();
				drop(state);
				trace!(worker_class = class.as_str(), pending, "scheduler.enqueue");
				self.shared.request_cv.notify_one();
			}
		}
	}

	/// Schedules `f` and blocks the calling thread until it has produced a value.
	///
	/// When called on the worker thread itself, or in synchronous mode, `f` runs inline.
	///
	/// # Errors
	///
	/// [`ScheduleError::Stopped`] when the request never ran because of shutdown,
	/// [`ScheduleError::Panicked`] when it panicked.
	///
	/// # Panics
	///
	/// In asynchronous mode this blocks on a channel and therefore panics if invoked
	/// from within an asynchronous execution context.
	pub fn run_and_wait<F, R>(&self, class: TaskClass, f: F) -> Result<R, ScheduleError>
	where
		F: FnOnce() -> R + Send + 'static,
		R: Send + 'static,
	{
		if self.mode == SchedulerMode::Synchronous || self.is_worker_thread() {
			if self.mode == SchedulerMode::Synchronous && self.is_shut_down() {
				return Err(ScheduleError::Stopped);
			}
			return run_catching(class, f);
		}

		let (tx, rx) = oneshot::channel();
		self.submit(class, move || {
			let _ = tx.send(run_catching(class, f));
		});
		rx.blocking_recv().unwrap_or(Err(ScheduleError::Stopped))
	}

	/// Returns the number of queued, not yet started requests.
	pub fn pending(&self) -> usize {
		self.shared.state.lock().requests.len()
	}

	/// Returns `true` once [`Self::shutdown`] has been called.
	pub fn is_shut_down(&self) -> bool {
		self.shared.state.lock().done
	}

	/// Returns `true` when called from the worker thread.
	pub fn is_worker_thread(&self) -> bool {
		self.worker_id == Some(std::thread::current().id())
	}

	/// Stops the scheduler.
	///
	/// Queued requests are discarded without running; the request in flight, if any,
	/// finishes before the worker is joined. Idempotent.
	pub fn shutdown(&self) {
		let discarded = {
			let mut state = self.shared.state.lock();
			state.done = true;
			std::mem::take(&mut state.requests)
		};
		self.shared.request_cv.notify_all();
		if !discarded.is_empty() {
			debug!(discarded = discarded.len(), "scheduler.discard_pending");
		}
		// Dropping outside the lock: requests may own channels whose receivers wake up.
		drop(discarded);

		let Some(handle) = self.worker.lock().take() else {
			return;
		};
		if handle.thread().id() == std::thread::current().id() {
			debug!("scheduler.shutdown_from_worker");
			return;
		}
		if handle.join().is_err() {
			error!("scheduler worker exited by panic");
		}
		debug!("scheduler.stopped");
	}
}

impl Drop for RequestScheduler {
	fn drop(&mut self) {
		self.shutdown();
	}
}

fn run_worker(shared: &Shared) {
	loop {
		let QueuedRequest { class, request } = {
			let mut state = shared.state.lock();
			loop {
				if state.done {
					return;
				}
				if let Some(queued) = state.requests.pop_front() {
					break queued;
				}
				shared.request_cv.wait(&mut state);
			}
		};
		run_request(class, request);
	}
}

fn run_request(class: TaskClass, request: Request) {
	let _ = run_catching(class, request);
}

fn run_catching<F, R>(class: TaskClass, f: F) -> Result<R, ScheduleError>
where
	F: FnOnce() -> R,
{
	trace!(worker_class = class.as_str(), "scheduler.run");
	catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
		let message = panic_message(payload.as_ref()).unwrap_or_else(|| "<non-string panic payload>".to_string());
		error!(worker_class = class.as_str(), %message, "request panicked");
		ScheduleError::Panicked
	})
}
