//! Store handle for a RAAS project workspace.
//!
//! A store is the `.raas/data/` directory inside a project. All engine state
//! (corpus database, audit log) is scoped to a store.

use std::path::{Path, PathBuf};

/// Handle to a project-scoped state workspace.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory (`<project>/.raas/data`).
    pub root: PathBuf,
}

impl Store {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Store rooted under an explicit project directory.
    pub fn for_project(project_dir: &Path) -> Self {
        Self {
            root: project_dir.join(".raas").join("data"),
        }
    }
}

/// Walk upward from `start` looking for a directory containing `.raas/`.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(path) = current {
        if path.join(".raas").is_dir() {
            return Some(path.to_path_buf());
        }
        current = path.parent();
    }
    None
}
