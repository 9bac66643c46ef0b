//! Plain-text language backend.
//!
//! Treats a document as lines of words:
//!
//! - every identifier-like word is a completion candidate;
//! - trailing whitespace is a warning, fixed by deleting it;
//! - `#include "name"` must name a file that exists relative to the command's
//!   directory, otherwise it is an error;
//! - `-w` drops warnings, `-Werror` turns them into errors;
//! - a NUL byte anywhere fails the build.
//!
//! Formatting strips trailing whitespace inside the requested range.

use std::collections::BTreeSet;
use std::ops::Range;
use std::path::{Path, PathBuf};

use lsp_types::{CompletionItem, CompletionItemKind, DiagnosticSeverity};
use ropey::Rope;
use tracing::trace;

use crate::backend::{BuildError, BuildInput, BuildUnit, Finding, LanguageBackend, Replacement};
use crate::draft::{DocVersion, Draft};

const LINE_TERMINATORS: &[char] = &['\n', '\r', '\u{0B}', '\u{0C}', '\u{85}', '\u{2028}', '\u{2029}'];

/// Backend for plain-text documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextBackend;

/// A resolved `#include` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
	/// Name as written.
	pub name: String,
	/// Path it resolved to.
	pub resolved: PathBuf,
}

/// Build unit of one plain-text draft.
#[derive(Debug, Clone)]
pub struct PlainTextUnit {
	path: PathBuf,
	version: DocVersion,
	line_count: usize,
	words: BTreeSet<String>,
	includes: Vec<Include>,
	findings: Vec<Finding>,
}

impl PlainTextUnit {
	/// Draft version the unit was built from.
	pub fn version(&self) -> DocVersion {
		self.version
	}

	/// Distinct words, sorted.
	pub fn words(&self) -> impl Iterator<Item = &str> {
		self.words.iter().map(String::as_str)
	}

	/// Resolved includes, in document order.
	pub fn includes(&self) -> &[Include] {
		&self.includes
	}
}

impl BuildUnit for PlainTextUnit {
	fn findings(&self) -> Vec<Finding> {
		self.findings.clone()
	}

	fn dump(&self) -> String {
		let words: Vec<&str> = self.words().collect();
		let mut lines = vec![
			format!("unit {} {}", self.path.display(), self.version),
			format!("  lines: {}", self.line_count),
			format!("  words: {}", words.join(" ")),
		];
		lines.extend(
			self.includes
				.iter()
				.map(|include| format!("  include \"{}\" -> {}", include.name, include.resolved.display())),
		);
		lines.extend(self.findings.iter().map(|finding| {
			format!(
				"  {} {}..{}: {}",
				severity_label(finding.severity),
				finding.range.start,
				finding.range.end,
				finding.message
			)
		}));
		let mut out = lines.join("\n");
		out.push('\n');
		out
	}
}

impl LanguageBackend for PlainTextBackend {
	type Unit = PlainTextUnit;

	fn build(&self, input: BuildInput<'_>) -> Result<PlainTextUnit, BuildError> {
		let BuildInput { path, draft, command, fs } = input;
		let text = draft.text();
		if text.chars().any(|c| c == '\0') {
			return Err(BuildError::new(format!("{} contains NUL bytes", path.display())));
		}

		let warnings_off = command.has_flag("-w");
		let warning_severity = if command.has_flag("-Werror") {
			DiagnosticSeverity::ERROR
		} else {
			DiagnosticSeverity::WARNING
		};

		let mut words = BTreeSet::new();
		let mut includes = Vec::new();
		let mut findings = Vec::new();

		for line in lines(text) {
			words.extend(line.words().map(str::to_string));

			if let Some(name) = include_target(&line.body) {
				let resolved = command.directory.join(name);
				if fs.exists(&resolved) {
					includes.push(Include {
						name: name.to_string(),
						resolved,
					});
				} else {
					findings.push(Finding {
						range: line.body_range(),
						severity: DiagnosticSeverity::ERROR,
						message: format!("'{name}' file not found"),
						fixes: Vec::new(),
					});
				}
			}

			if !warnings_off && let Some(range) = line.trailing_whitespace() {
				findings.push(Finding {
					range: range.clone(),
					severity: warning_severity,
					message: "trailing whitespace".to_string(),
					fixes: vec![Replacement::delete(range)],
				});
			}
		}

		findings.sort_by_key(|f| (f.range.start, f.range.end));
		trace!(path = %path.display(), words = words.len(), findings = findings.len(), "plaintext.build");

		Ok(PlainTextUnit {
			path: path.to_path_buf(),
			version: draft.version(),
			line_count: text.len_lines(),
			words,
			includes,
			findings,
		})
	}

	fn complete(&self, unit: &PlainTextUnit, draft: &Draft, offset: usize) -> Vec<CompletionItem> {
		let prefix = word_before(draft.text(), offset);
		unit.words()
			.filter(|word| word.starts_with(&prefix) && *word != prefix)
			.map(|word| CompletionItem {
				label: word.to_string(),
				kind: Some(CompletionItemKind::TEXT),
				..CompletionItem::default()
			})
			.collect()
	}

	fn format(&self, _path: &Path, text: &Rope, range: Range<usize>) -> Vec<Replacement> {
		let len = text.len_chars();
		let range = range.start.min(len)..range.end.min(len);
		lines(text)
			.filter_map(|line| line.trailing_whitespace())
			.filter_map(|ws| {
				let start = ws.start.max(range.start);
				let end = ws.end.min(range.end);
				(start < end).then(|| Replacement::delete(start..end))
			})
			.collect()
	}
}

/// One line of a rope without its terminator.
struct Line {
	/// Char offset of the line start.
	start: usize,
	body: String,
}

impl Line {
	fn body_len(&self) -> usize {
		self.body.chars().count()
	}

	fn body_range(&self) -> Range<usize> {
		self.start..self.start + self.body_len()
	}

	fn trailing_whitespace(&self) -> Option<Range<usize>> {
		let trimmed = self.body.trim_end_matches([' ', '\t']).chars().count();
		let len = self.body_len();
		(trimmed < len).then(|| self.start + trimmed..self.start + len)
	}

	fn words(&self) -> impl Iterator<Item = &str> {
		self.body
			.split(|c: char| !is_word_char(c))
			.filter(|w| w.chars().next().is_some_and(|c| !c.is_ascii_digit()))
	}
}

fn lines(text: &Rope) -> impl Iterator<Item = Line> + '_ {
	let mut start = 0;
	text.lines().map(move |slice| {
		let line_start = start;
		start += slice.len_chars();
		let raw = slice.to_string();
		Line {
			start: line_start,
			body: raw.trim_end_matches(LINE_TERMINATORS).to_string(),
		}
	})
}

fn include_target(body: &str) -> Option<&str> {
	let rest = body.trim_start().strip_prefix("#include")?.trim_start();
	let quoted = rest.strip_prefix('"')?;
	let end = quoted.find('"')?;
	Some(&quoted[..end]).filter(|name| !name.is_empty())
}

fn is_word_char(c: char) -> bool {
	c.is_alphanumeric() || c == '_'
}

/// Word characters immediately before `offset`.
fn word_before(text: &Rope, offset: usize) -> String {
	let end = offset.min(text.len_chars());
	let mut start = end;
	while start > 0 && is_word_char(text.char(start - 1)) {
		start -= 1;
	}
	text.slice(start..end).to_string()
}

fn severity_label(severity: DiagnosticSeverity) -> &'static str {
	match severity {
		DiagnosticSeverity::ERROR => "error",
		DiagnosticSeverity::WARNING => "warning",
		DiagnosticSeverity::INFORMATION => "info",
		_ => "hint",
	}
}
