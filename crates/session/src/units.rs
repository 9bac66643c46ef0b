//! Path-keyed store of build units.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::draft::DocVersion;

struct UnitSlot<U> {
	/// Version of `unit`, or the removal version once released.
	version: DocVersion,
	unit: Option<Arc<U>>,
}

/// At most one build unit per path, tagged with the draft version it was built from.
///
/// Installs are version-gated: a unit from an older draft never replaces a newer
/// one, and nothing older than a removal can resurrect a released path.
///
/// Released paths keep a tombstone slot holding the removal version. Work that
/// captured a draft before the removal may still reach the worker afterwards,
/// so the floor is never pruned; the cost is one slot per distinct released path.
pub struct UnitStore<U> {
	units: Mutex<HashMap<PathBuf, UnitSlot<U>>>,
}

impl<U> Default for UnitStore<U> {
	fn default() -> Self {
		Self {
			units: Mutex::new(HashMap::new()),
		}
	}
}

impl<U> std::fmt::Debug for UnitStore<U> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("UnitStore").field("len", &self.len()).finish()
	}
}

impl<U> UnitStore<U> {
	/// Create a new empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Installs `unit` for `path` unless a newer unit or removal is recorded.
	///
	/// Returns `true` when installed.
	pub fn install(&self, path: &Path, version: DocVersion, unit: Arc<U>) -> bool {
		let mut units = self.units.lock();
		match units.get_mut(path) {
			Some(slot) if slot.version > version => false,
			Some(slot) => {
				slot.version = version;
				slot.unit = Some(unit);
				true
			}
			None => {
				units.insert(path.to_path_buf(), UnitSlot { version, unit: Some(unit) });
				true
			}
		}
	}

	/// Drops the unit for `path` on behalf of the removal at `version`.
	///
	/// Returns `true` when a unit was dropped. A unit installed for a later version
	/// (the path was re-added) is kept.
	pub fn release(&self, path: &Path, version: DocVersion) -> bool {
		let mut units = self.units.lock();
		let slot = units.entry(path.to_path_buf()).or_insert(UnitSlot {
			version,
			unit: None,
		});
		if slot.version > version {
			return false;
		}
		slot.version = version;
		slot.unit.take().is_some()
	}

	/// Returns the installed unit for `path` with its version.
	pub fn get(&self, path: &Path) -> Option<(DocVersion, Arc<U>)> {
		let units = self.units.lock();
		let slot = units.get(path)?;
		slot.unit.as_ref().map(|unit| (slot.version, Arc::clone(unit)))
	}

	/// Version of the installed unit, or of the last removal, for `path`.
	pub fn version(&self, path: &Path) -> Option<DocVersion> {
		self.units.lock().get(path).map(|slot| slot.version)
	}

	/// Returns `true` when `path` has an installed unit.
	pub fn contains(&self, path: &Path) -> bool {
		self.units.lock().get(path).is_some_and(|slot| slot.unit.is_some())
	}

	/// Number of installed units.
	pub fn len(&self) -> usize {
		self.units.lock().values().filter(|slot| slot.unit.is_some()).count()
	}

	/// Returns `true` when no unit is installed.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	#[cfg(test)]
	fn slot_count(&self) -> usize {
		self.units.lock().len()
	}
}
