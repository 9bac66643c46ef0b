//! Versioned draft contents of tracked documents.
//!
//! A [`Draft`] is an immutable snapshot: every edit publishes a new one, so work
//! already scheduled against an older snapshot keeps reading consistent text.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use ropey::Rope;

/// Monotonic per-path document version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DocVersion(pub u64);

impl DocVersion {
	/// Returns the following version.
	pub const fn next(self) -> Self {
		Self(self.0 + 1)
	}
}

impl std::fmt::Display for DocVersion {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "v{}", self.0)
	}
}

/// Published contents of a document at one version.
#[derive(Debug, Clone)]
pub struct Draft {
	version: DocVersion,
	text: Rope,
}

impl Draft {
	/// Version this snapshot was published at.
	pub fn version(&self) -> DocVersion {
		self.version
	}

	/// Snapshot text.
	pub fn text(&self) -> &Rope {
		&self.text
	}
}

#[derive(Debug, Default)]
struct DraftSlot {
	version: DocVersion,
	/// `None` once the document has been removed; the version survives.
	text: Option<Rope>,
}

/// Path-keyed store of the latest draft of every tracked document.
///
/// Removal drops the text but keeps the slot, so versions stay monotonic across
/// remove and re-add. The store therefore holds one small slot (path and version)
/// per distinct path ever opened in the session.
#[derive(Debug, Default)]
pub struct DraftStore {
	drafts: RwLock<HashMap<PathBuf, DraftSlot>>,
}

impl DraftStore {
	/// Create a new empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Publishes `text` as the new draft for `path`, tracking it if needed.
	pub fn update(&self, path: &Path, text: Rope) -> Draft {
		let mut drafts = self.drafts.write();
		let slot = drafts.entry(path.to_path_buf()).or_default();
		slot.version = slot.version.next();
		slot.text = Some(text.clone());
		Draft {
			version: slot.version,
			text,
		}
	}

	/// Stops tracking `path`, returning the version that marks the removal.
	///
	/// Returns `None` when `path` was not tracked.
	pub fn remove(&self, path: &Path) -> Option<DocVersion> {
		let mut drafts = self.drafts.write();
		let slot = drafts.get_mut(path)?;
		slot.text.take()?;
		slot.version = slot.version.next();
		Some(slot.version)
	}

	/// Returns the current draft of `path`.
	pub fn get(&self, path: &Path) -> Option<Draft> {
		let drafts = self.drafts.read();
		let slot = drafts.get(path)?;
		slot.text.as_ref().map(|text| Draft {
			version: slot.version,
			text: text.clone(),
		})
	}

	/// Returns the latest version issued for `path`, tracked or not.
	pub fn version(&self, path: &Path) -> DocVersion {
		self.drafts.read().get(path).map(|slot| slot.version).unwrap_or_default()
	}

	/// Returns `true` when `path` currently has a draft.
	pub fn is_tracked(&self, path: &Path) -> bool {
		self.drafts.read().get(path).is_some_and(|slot| slot.text.is_some())
	}

	/// Returns all tracked paths, sorted.
	pub fn tracked_paths(&self) -> Vec<PathBuf> {
		let mut paths: Vec<_> = self
			.drafts
			.read()
			.iter()
			.filter(|(_, slot)| slot.text.is_some())
			.map(|(path, _)| path.clone())
			.collect();
		paths.sort();
		paths
	}

	#[cfg(test)]
	fn slot_count(&self) -> usize {
		self.drafts.read().len()
	}
}
