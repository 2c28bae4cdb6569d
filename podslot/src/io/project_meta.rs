//! Stored original project path (`<parent>/path`) and reverse lookup.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::atomic::write_atomic;
use super::paths::{PATH_FILE, ProjectPaths};
use crate::core::identity::ProjectIdentity;
use crate::error::{FsContext, SlotError};

/// A project parent directory found under `<home>/projects`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ProjectEntry {
    pub parent_dir: PathBuf,
    pub project_path: String,
}

/// Read the stored path, if any.
pub fn read_project_path(path_file: &Path) -> Result<Option<String>, SlotError> {
    match fs::read_to_string(path_file) {
        Ok(contents) => Ok(Some(contents.trim_end_matches('\n').to_string())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(SlotError::fs("read project path", path_file, err)),
    }
}

/// Record the project path on first use and verify it on every later use.
///
/// Two projects whose paths collide on the 32-bit checksum (and share a
/// slug) would map to the same parent directory; that is refused instead of
/// silently sharing slots.
pub fn ensure_project_path(paths: &ProjectPaths, project: &ProjectIdentity) -> Result<(), SlotError> {
    match read_project_path(&paths.path_file)? {
        Some(stored) if stored == project.path_str() => Ok(()),
        Some(stored) => Err(SlotError::corrupt(
            &paths.path_file,
            format!(
                "directory belongs to '{stored}', not '{}' (checksum collision)",
                project.path_str()
            ),
        )),
        None => {
            debug!(path = %paths.path_file.display(), "recording project path");
            write_atomic(&paths.path_file, project.path_str())
        }
    }
}

/// List known projects whose stored path contains `query` (all if `None`).
pub fn find_projects(home: &Path, query: Option<&str>) -> Result<Vec<ProjectEntry>, SlotError> {
    let projects_dir = home.join(super::paths::PROJECTS_DIR);
    let entries = match fs::read_dir(&projects_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(SlotError::fs("read directory", &projects_dir, err)),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.fs_context("read directory entry", &projects_dir)?;
        let parent_dir = entry.path();
        if !parent_dir.is_dir() {
            continue;
        }
        let Some(project_path) = read_project_path(&parent_dir.join(PATH_FILE))? else {
            warn!(dir = %parent_dir.display(), "project directory without stored path");
            continue;
        };
        if query.is_some_and(|q| !project_path.contains(q)) {
            continue;
        }
        found.push(ProjectEntry {
            parent_dir,
            project_path,
        });
    }
    found.sort_by(|a, b| a.project_path.cmp(&b.project_path));
    Ok(found)
}
