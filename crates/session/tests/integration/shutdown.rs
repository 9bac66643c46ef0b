use pretty_assertions::assert_eq;
use scribe_session::lsp_types::Position;
use scribe_session::{DocVersion, Error, ScheduleError};

use crate::common::{Harness, wait_until};

#[test]
fn test_shutdown_discards_queued_work_and_releases_waiters() {
	let h = Harness::asynchronous();
	h.session.add_document("/a.txt", "alpha");
	h.consumer.wait_for(1);

	let mut gate = h.backend.gate("/running.txt");
	h.session.add_document("/running.txt", "busy");
	gate.wait_started();

	h.session.add_document("/queued.txt", "never built");
	h.session.force_reparse("/a.txt").unwrap();

	std::thread::scope(|s| {
		let waiter = s.spawn(|| h.session.code_complete("/a.txt", Position::new(0, 0)));
		assert!(wait_until(|| h.session.pending_tasks() == 3));

		let stopper = s.spawn(|| h.session.shutdown());
		assert!(wait_until(|| h.session.pending_tasks() == 0));
		assert!(matches!(
			waiter.join().unwrap(),
			Err(Error::Schedule(ScheduleError::Stopped))
		));

		// The running build finishes before the worker is joined.
		gate.open();
		stopper.join().unwrap();
	});

	assert_eq!(h.consumer.versions("/running.txt"), vec![DocVersion(1)]);
	assert!(h.consumer.versions("/queued.txt").is_empty());
	assert_eq!(h.backend.built_versions("/a.txt"), vec![DocVersion(1)]);
	assert!(h.session.has_unit("/running.txt"));
}

#[test]
fn test_requests_after_shutdown_never_run() {
	let h = Harness::asynchronous();
	h.session.shutdown();

	assert_eq!(h.session.add_document("/a.txt", "text"), DocVersion(1));
	assert_eq!(h.session.get_document("/a.txt").unwrap(), "text");
	assert!(matches!(
		h.session.dump_ast("/a.txt"),
		Err(Error::Schedule(ScheduleError::Stopped))
	));
	assert!(matches!(h.session.flush(), Err(Error::Schedule(ScheduleError::Stopped))));
	assert_eq!(h.session.pending_tasks(), 0);
	assert_eq!(h.backend.build_count(), 0);
	assert!(h.consumer.reports().is_empty());

	// Shutdown is idempotent.
	h.session.shutdown();
}

#[test]
fn test_requests_after_synchronous_shutdown_never_run() {
	let h = Harness::synchronous();
	h.session.add_document("/a.txt", "one");
	h.session.shutdown();
	h.session.add_document("/a.txt", "two");
	h.session.force_reparse("/a.txt").unwrap();

	assert_eq!(h.backend.build_count(), 1);
	assert_eq!(h.consumer.versions("/a.txt"), vec![DocVersion(1)]);
}

#[test]
fn test_drop_joins_idle_worker() {
	let h = Harness::asynchronous();
	h.session.add_document("/a.txt", "alpha");
	h.consumer.wait_for(1);

	let consumer = h.consumer.clone();
	drop(h);
	assert_eq!(consumer.reports().len(), 1);
}
