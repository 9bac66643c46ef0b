use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use scribe_session::lsp_types::{DiagnosticSeverity, Position, Range, TextEdit};
use scribe_session::{
	BuildOutcome, ChannelDiagnosticsConsumer, DocVersion, Error, JsonCompilationDatabase, PlainTextBackend, SessionConfig,
	SessionManager,
};

use crate::common::Harness;

#[test]
fn test_end_to_end_versions_synchronous() {
	let h = Harness::synchronous();

	assert_eq!(h.session.add_document("/a.txt", "draft one \n"), DocVersion(1));
	let reports = h.consumer.reports();
	assert_eq!(reports.len(), 1);
	assert_eq!(reports[0].version, DocVersion(1));
	assert_eq!(reports[0].warning_count(), 1);

	assert_eq!(h.session.add_document("/a.txt", "draft two\n"), DocVersion(2));
	assert_eq!(h.consumer.versions("/a.txt"), vec![DocVersion(1), DocVersion(2)]);

	let latest = h.consumer.latest().get(Path::new("/a.txt")).unwrap();
	assert_eq!(latest.version, DocVersion(2));
	assert!(latest.diagnostics.is_empty());
	assert_eq!(h.session.pending_tasks(), 0);
}

#[test]
fn test_remove_then_complete_is_not_tracked() {
	let h = Harness::asynchronous();
	h.session.add_document("/a.txt", "alpha");
	h.session.remove_document("/a.txt").unwrap();

	let err = h.session.code_complete("/a.txt", Position::new(0, 0)).unwrap_err();
	assert!(matches!(err, Error::NotTracked(path) if path.as_os_str() == "/a.txt"));
	assert!(matches!(h.session.remove_document("/a.txt"), Err(Error::NotTracked(_))));

	h.session.flush().unwrap();
	assert!(!h.session.has_unit("/a.txt"));
}

#[test]
fn test_build_failure_is_reported_not_raised() {
	let h = Harness::synchronous();
	h.backend.fail("/a.txt");

	h.session.add_document("/a.txt", "words here");
	let reports = h.consumer.reports();
	let report = &reports[0];
	assert!(matches!(&report.outcome, BuildOutcome::Failed { reason } if reason.contains("scripted failure")));
	assert!(report.diagnostics.is_empty());
	assert!(!h.session.has_unit("/a.txt"));
	assert!(matches!(h.session.dump_ast("/a.txt"), Err(Error::NoUnit(_))));

	h.backend.heal("/a.txt");
	h.session.force_reparse("/a.txt").unwrap();
	assert_eq!(h.consumer.reports()[1].outcome, BuildOutcome::Built);
	assert!(h.session.has_unit("/a.txt"));
}

#[test]
fn test_failed_rebuild_keeps_previous_unit() {
	let h = Harness::synchronous();
	h.session.add_document("/a.txt", "first");
	h.backend.fail("/a.txt");
	h.session.add_document("/a.txt", "second");

	assert!(h.session.dump_ast("/a.txt").unwrap().starts_with("unit /a.txt v1\n"));
	assert_eq!(h.session.get_document("/a.txt").unwrap(), "second");
}

#[test]
fn test_backend_panic_is_reported_and_worker_survives() {
	let h = Harness::asynchronous();
	h.backend.panic_on("/bad.txt");

	h.session.add_document("/bad.txt", "x");
	let reports = h.consumer.wait_for(1);
	assert!(matches!(&reports[0].outcome, BuildOutcome::Failed { reason } if reason.contains("scripted panic")));

	h.session.add_document("/good.txt", "y");
	let reports = h.consumer.wait_for(2);
	assert_eq!(reports[1].outcome, BuildOutcome::Built);
}

#[test]
fn test_findings_panic_is_reported_once() {
	let h = Harness::synchronous();
	h.backend.panic_in_findings("/a.txt");

	h.session.add_document("/a.txt", "x");
	let reports = h.consumer.reports();
	assert_eq!(reports.len(), 1);
	assert_eq!(reports[0].version, DocVersion(1));
	assert!(matches!(&reports[0].outcome, BuildOutcome::Failed { reason } if reason.contains("scripted findings panic")));
	assert!(!h.session.has_unit("/a.txt"));

	h.backend.heal("/a.txt");
	h.session.force_reparse("/a.txt").unwrap();
	assert_eq!(h.consumer.reports()[1].outcome, BuildOutcome::Built);
	assert!(h.session.has_unit("/a.txt"));
}

#[test]
fn test_includes_resolve_through_provider() {
	let h = Harness::synchronous();
	h.session.add_document("/proj/main.txt", "#include \"lib.h\"\n");
	assert_eq!(h.consumer.reports()[0].error_count(), 1);

	h.fs.insert("/proj/lib.h", "int lib;");
	h.session.force_reparse("/proj/main.txt").unwrap();
	let reports = h.consumer.reports();
	assert_eq!(reports[1].version, DocVersion(1));
	assert_eq!(reports[1].error_count(), 0);
	assert_eq!(h.backend.build_count(), 2);
}

#[test]
fn test_json_compilation_database_flags() {
	let db = JsonCompilationDatabase::from_json(
		r#"[{ "directory": "/proj", "file": "strict.txt", "arguments": ["scribe", "-Werror", "strict.txt"] }]"#,
	)
	.unwrap();
	let (consumer, mut reports) = ChannelDiagnosticsConsumer::channel();
	let session = SessionManager::builder(PlainTextBackend, Arc::new(consumer))
		.compilation_database(db)
		.config(SessionConfig::synchronous())
		.build()
		.unwrap();

	session.add_document("/proj/strict.txt", "a \n");
	session.add_document("/proj/lax.txt", "a \n");

	let strict = reports.try_recv().unwrap();
	assert_eq!(strict.diagnostics[0].diagnostic.severity, Some(DiagnosticSeverity::ERROR));
	let lax = reports.try_recv().unwrap();
	assert_eq!(lax.diagnostics[0].diagnostic.severity, Some(DiagnosticSeverity::WARNING));
}

#[test]
fn test_formatting_does_not_wait_for_worker() {
	let h = Harness::asynchronous();
	let mut gate = h.backend.gate("/blocker.txt");
	h.session.add_document("/blocker.txt", "");
	gate.wait_started();

	h.session.add_document("/a.txt", "x  \n{ y \n");
	assert_eq!(h.session.pending_tasks(), 1);

	assert_eq!(
		h.session.format_file("/a.txt").unwrap(),
		vec![
			TextEdit::new(Range::new(Position::new(0, 1), Position::new(0, 3)), String::new()),
			TextEdit::new(Range::new(Position::new(1, 3), Position::new(1, 4)), String::new()),
		]
	);
	assert_eq!(
		h.session.format_on_type("/a.txt", Position::new(1, 4)).unwrap(),
		vec![TextEdit::new(Range::new(Position::new(1, 3), Position::new(1, 4)), String::new())]
	);
	assert_eq!(h.session.get_document("/a.txt").unwrap(), "x  \n{ y \n");
	assert_eq!(h.session.pending_tasks(), 1);

	gate.open();
	h.consumer.wait_for(2);
}

#[test]
fn test_invalid_positions_are_rejected() {
	let h = Harness::synchronous();
	h.session.add_document("/a.txt", "😀\n");

	assert!(matches!(
		h.session.code_complete("/a.txt", Position::new(0, 1)),
		Err(Error::InvalidPosition(_))
	));
	assert!(matches!(
		h.session.format_on_type("/a.txt", Position::new(3, 0)),
		Err(Error::InvalidPosition(_))
	));
	assert!(h.session.code_complete("/a.txt", Position::new(0, 2)).is_ok());
}
