//! Canonical on-disk layout under the podslot home directory.

use std::path::{Path, PathBuf};

use crate::core::identity::{ProjectIdentity, SlotIdentity};

pub const CONFIG_FILE: &str = "config.toml";
pub const PROJECTS_DIR: &str = "projects";
pub const COUNTER_FILE: &str = "counter";
pub const LAYERS_FILE: &str = "layers";
pub const PATH_FILE: &str = "path";
pub const LOCK_FILE: &str = ".lock";

/// All canonical paths for one project under `home`.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub home: PathBuf,
    pub projects_dir: PathBuf,
    /// `<home>/projects/<slug>-<basehex>`; owns every file below.
    pub parent_dir: PathBuf,
    pub counter_path: PathBuf,
    pub layers_path: PathBuf,
    pub path_file: PathBuf,
    pub lock_path: PathBuf,
}

impl ProjectPaths {
    pub fn new(home: impl Into<PathBuf>, project: &ProjectIdentity) -> Self {
        let home = home.into();
        let projects_dir = home.join(PROJECTS_DIR);
        let parent_dir = projects_dir.join(project.parent_dir_name());
        Self {
            home: home.clone(),
            projects_dir,
            counter_path: parent_dir.join(COUNTER_FILE),
            layers_path: parent_dir.join(LAYERS_FILE),
            path_file: parent_dir.join(PATH_FILE),
            lock_path: parent_dir.join(LOCK_FILE),
            parent_dir,
        }
    }

    /// Directory backing one slot: `<parent>/<slothex>`.
    pub fn slot_dir(&self, slot: &SlotIdentity) -> PathBuf {
        self.parent_dir.join(slot.hex())
    }
}

/// Path of the config file for a given home.
pub fn config_path(home: &Path) -> PathBuf {
    home.join(CONFIG_FILE)
}
