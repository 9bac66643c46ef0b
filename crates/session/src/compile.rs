//! Compile command lookup for build tasks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// How to build one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileCommand {
	/// Working directory; relative paths in `arguments` resolve against it.
	pub directory: PathBuf,
	/// Full argument vector, including the tool and the file.
	pub arguments: Vec<String>,
}

impl CompileCommand {
	/// Command used when no database knows `path`: the file's own directory and
	/// a syntax-only invocation with `extra_flags`.
	pub fn fallback(path: &Path, extra_flags: &[String]) -> Self {
		let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
		let mut arguments = vec!["scribe".to_string(), "-fsyntax-only".to_string()];
		arguments.extend(extra_flags.iter().cloned());
		arguments.push(path.display().to_string());
		Self { directory, arguments }
	}

	/// Returns `true` when `flag` appears among the arguments.
	pub fn has_flag(&self, flag: &str) -> bool {
		self.arguments.iter().any(|arg| arg == flag)
	}
}

/// Source of compile commands; consulted once per build task.
pub trait CompilationDatabase: Send + Sync {
	/// Returns the command for `path`, or `None` to use the fallback.
	fn compile_command(&self, path: &Path) -> Option<CompileCommand>;
}

/// Same flags for every file.
#[derive(Debug, Clone, Default)]
pub struct FixedCompilationDatabase {
	flags: Vec<String>,
}

impl FixedCompilationDatabase {
	/// Create a database applying `flags` to every file.
	pub fn new(flags: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			flags: flags.into_iter().map(Into::into).collect(),
		}
	}
}

impl CompilationDatabase for FixedCompilationDatabase {
	fn compile_command(&self, path: &Path) -> Option<CompileCommand> {
		Some(CompileCommand::fallback(path, &self.flags))
	}
}

/// Errors loading a compilation database.
#[derive(Debug, thiserror::Error)]
pub enum CompileDbError {
	/// The database file could not be read.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Database path.
		path: PathBuf,
		/// Underlying error.
		error: std::io::Error,
	},
	/// The database is not valid JSON of the expected shape.
	#[error("invalid compilation database: {0}")]
	Parse(#[from] serde_json::Error),
	/// An entry has neither `arguments` nor `command`.
	#[error("entry for {0} has no arguments or command")]
	MissingCommand(PathBuf),
	/// A `command` string has unbalanced quotes or a dangling escape.
	#[error("entry for {0} has an unparsable command")]
	InvalidCommand(PathBuf),
}

#[derive(Debug, Deserialize)]
struct JsonEntry {
	directory: PathBuf,
	file: PathBuf,
	#[serde(default)]
	arguments: Option<Vec<String>>,
	#[serde(default)]
	command: Option<String>,
}

/// A `compile_commands.json` database.
#[derive(Debug, Clone, Default)]
pub struct JsonCompilationDatabase {
	commands: HashMap<PathBuf, CompileCommand>,
}

impl JsonCompilationDatabase {
	/// Parses database contents.
	///
	/// Relative `file` entries resolve against their `directory`. A `command`
	/// string is split with shell quoting rules. Later entries for the same file win.
	pub fn from_json(json: &str) -> Result<Self, CompileDbError> {
		let entries: Vec<JsonEntry> = serde_json::from_str(json)?;
		let mut commands = HashMap::with_capacity(entries.len());
		for entry in entries {
			let file = if entry.file.is_absolute() {
				entry.file
			} else {
				entry.directory.join(&entry.file)
			};
			let arguments = match (entry.arguments, entry.command) {
				(Some(arguments), _) => arguments,
				(None, Some(command)) => match shlex::split(&command) {
					Some(arguments) => arguments,
					None => return Err(CompileDbError::InvalidCommand(file)),
				},
				(None, None) => return Err(CompileDbError::MissingCommand(file)),
			};
			commands.insert(
				file,
				CompileCommand {
					directory: entry.directory,
					arguments,
				},
			);
		}
		Ok(Self { commands })
	}

	/// Loads a database file.
	pub fn load(path: &Path) -> Result<Self, CompileDbError> {
		let json = std::fs::read_to_string(path).map_err(|error| CompileDbError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_json(&json)
	}

	/// Number of files with a command.
	pub fn len(&self) -> usize {
		self.commands.len()
	}

	/// Returns `true` when the database is empty.
	pub fn is_empty(&self) -> bool {
		self.commands.is_empty()
	}
}

impl CompilationDatabase for JsonCompilationDatabase {
	fn compile_command(&self, path: &Path) -> Option<CompileCommand> {
		self.commands.get(path).cloned()
	}
}
