//! Marker-file state tracking for per-resource working directories.
//!
//! The pipeline keeps no database: the presence or absence of a zero-byte
//! sentinel file inside a resource's working directory is the system of
//! record for that resource's progress. Markers are crash-tolerant and
//! trivially inspectable; an operator resets a step by deleting a file.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// A pipeline-step sentinel. Each variant maps to a fixed file name inside
/// the resource's working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Marker {
    Created,
    Updated,
    Deleted,
    Reviewed,
    Cleaned,
    Summary,
    Copied,
    Finished,
    Skip,
}

impl Marker {
    /// All markers, in pipeline order. Used by the full re-run reset.
    pub const ALL: [Marker; 9] = [
        Marker::Created,
        Marker::Updated,
        Marker::Deleted,
        Marker::Reviewed,
        Marker::Cleaned,
        Marker::Summary,
        Marker::Copied,
        Marker::Finished,
        Marker::Skip,
    ];

    /// The sentinel file name for this marker.
    pub fn file_name(self) -> &'static str {
        match self {
            Marker::Created => "created.marker",
            Marker::Updated => "updated.marker",
            Marker::Deleted => "deleted.marker",
            Marker::Reviewed => "reviewed.marker",
            Marker::Cleaned => "cleaned.marker",
            Marker::Summary => "summary.marker",
            Marker::Copied => "copied.marker",
            Marker::Finished => "finished.marker",
            Marker::Skip => "skip.marker",
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// True iff the sentinel file for `marker` exists directly in `dir`.
/// A missing directory is reported as "no marker", not an error.
pub fn has_marker(dir: &Path, marker: Marker) -> bool {
    dir.is_dir() && dir.join(marker.file_name()).is_file()
}

/// Create the sentinel file for `marker` in `dir`.
///
/// Returns false (with a warning) if the directory is missing or the marker
/// already exists; marker creation never raises.
pub fn create_marker(dir: &Path, marker: Marker) -> bool {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), %marker, "Cannot create marker: directory does not exist");
        return false;
    }
    let path = dir.join(marker.file_name());
    if path.is_file() {
        warn!(path = %path.display(), "Marker file already exists");
        return false;
    }
    match fs::File::create(&path) {
        Ok(_) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to create marker file");
            false
        }
    }
}

/// Remove the sentinel file for `marker` if present. Returns false silently
/// when the marker or the directory is absent.
pub fn delete_marker(dir: &Path, marker: Marker) -> bool {
    let path = dir.join(marker.file_name());
    if !path.is_file() {
        return false;
    }
    match fs::remove_file(&path) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to delete marker file");
            false
        }
    }
}

/// Delete every known marker in `dir`. Used when a CREATE/UPDATE re-run
/// resets the resource to its unstarted state.
pub fn delete_all_markers(dir: &Path) {
    for marker in Marker::ALL {
        delete_marker(dir, marker);
    }
}

/// True iff `dir` directly contains a Terraform state file (`*.tfstate`).
pub fn has_state_file(dir: &Path) -> bool {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return false,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "tfstate") {
            return true;
        }
    }
    false
}

/// Byte-size units accepted by [`file_size_within`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    B,
    Kb,
    Mb,
    Gb,
    Tb,
}

impl SizeUnit {
    /// Multiplier to convert this unit to bytes.
    pub fn bytes(self) -> u64 {
        match self {
            SizeUnit::B => 1,
            SizeUnit::Kb => 1024,
            SizeUnit::Mb => 1024_u64.pow(2),
            SizeUnit::Gb => 1024_u64.pow(3),
            SizeUnit::Tb => 1024_u64.pow(4),
        }
    }
}

/// True iff `path` exists and its size is at most `max` of the given unit.
/// A missing file is "not within" any size.
pub fn file_size_within(path: &Path, max: u64, unit: SizeUnit) -> bool {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta.len() <= max * unit.bytes(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_marker_file_names() {
        assert_eq!(Marker::Created.file_name(), "created.marker");
        assert_eq!(Marker::Skip.file_name(), "skip.marker");
        assert_eq!(Marker::ALL.len(), 9);
    }

    #[test]
    fn test_marker_lifecycle() {
        let dir = tempdir().unwrap();

        assert!(!has_marker(dir.path(), Marker::Created));
        assert!(create_marker(dir.path(), Marker::Created));
        assert!(has_marker(dir.path(), Marker::Created));

        // Creating the same marker twice fails without raising.
        assert!(!create_marker(dir.path(), Marker::Created));

        assert!(delete_marker(dir.path(), Marker::Created));
        assert!(!has_marker(dir.path(), Marker::Created));
        assert!(!delete_marker(dir.path(), Marker::Created));
    }

    #[test]
    fn test_missing_directory_is_not_an_error() {
        let missing = Path::new("/nonexistent/iac-forge-test");
        assert!(!has_marker(missing, Marker::Created));
        assert!(!create_marker(missing, Marker::Created));
        assert!(!delete_marker(missing, Marker::Created));
    }

    #[test]
    fn test_delete_all_markers() {
        let dir = tempdir().unwrap();
        create_marker(dir.path(), Marker::Created);
        create_marker(dir.path(), Marker::Deleted);
        create_marker(dir.path(), Marker::Reviewed);

        delete_all_markers(dir.path());
        for marker in Marker::ALL {
            assert!(!has_marker(dir.path(), marker));
        }
    }

    #[test]
    fn test_has_state_file() {
        let dir = tempdir().unwrap();
        assert!(!has_state_file(dir.path()));

        std::fs::write(dir.path().join("terraform.tfstate"), b"{}").unwrap();
        assert!(has_state_file(dir.path()));
    }

    #[test]
    fn test_file_size_within_units() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();

        assert!(file_size_within(&path, 2, SizeUnit::Kb));
        assert!(!file_size_within(&path, 1, SizeUnit::Kb));
        assert!(file_size_within(&path, 1, SizeUnit::Mb));
        assert!(!file_size_within(&path, 200, SizeUnit::B));
    }

    #[test]
    fn test_file_size_within_missing_file() {
        assert!(!file_size_within(
            Path::new("/nonexistent/state"),
            1,
            SizeUnit::Gb
        ));
    }
}
