//! Filesystem views handed to build tasks.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

/// Read-only filesystem access for a build.
pub trait FileSystem: Send + Sync {
	/// Reads a whole file as UTF-8.
	fn read_to_string(&self, path: &Path) -> io::Result<String>;

	/// Returns `true` when `path` names an existing file.
	fn exists(&self, path: &Path) -> bool;
}

/// Supplies a filesystem view; consulted once per build task.
pub trait FileSystemProvider: Send + Sync {
	/// Returns the view to use for the next build.
	fn file_system(&self) -> Arc<dyn FileSystem>;
}

/// The host filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
	fn read_to_string(&self, path: &Path) -> io::Result<String> {
		std::fs::read_to_string(path)
	}

	fn exists(&self, path: &Path) -> bool {
		path.is_file()
	}
}

/// Provides [`RealFileSystem`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFileSystemProvider;

impl FileSystemProvider for RealFileSystemProvider {
	fn file_system(&self) -> Arc<dyn FileSystem> {
		Arc::new(RealFileSystem)
	}
}

/// In-memory filesystem, shared between all handles cloned from it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFileSystem {
	files: Arc<RwLock<HashMap<PathBuf, String>>>,
}

impl InMemoryFileSystem {
	/// Create a new empty filesystem.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates or replaces a file.
	pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
		self.files.write().insert(path.into(), contents.into());
	}

	/// Deletes a file, returning its contents.
	pub fn remove(&self, path: &Path) -> Option<String> {
		self.files.write().remove(path)
	}
}

impl FileSystem for InMemoryFileSystem {
	fn read_to_string(&self, path: &Path) -> io::Result<String> {
		self.files
			.read()
			.get(path)
			.cloned()
			.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display())))
	}

	fn exists(&self, path: &Path) -> bool {
		self.files.read().contains_key(path)
	}
}

impl FileSystemProvider for InMemoryFileSystem {
	fn file_system(&self) -> Arc<dyn FileSystem> {
		Arc::new(self.clone())
	}
}
