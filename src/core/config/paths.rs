//! Filesystem layout of a knowledge base.
//!
//! The data directory is the first of:
//! 1. `KNOWLEDGE_DATA_DIR`
//! 2. `KNOWLEDGE_ROOT`, a project directory holding `config.yml`
//! 3. the platform data directory (`tepora-knowledge`)

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::errors::KnowledgeError;

const APP_DIR_NAME: &str = "tepora-knowledge";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Where a checked-in `config.yml` is looked up when the data dir has none
    pub project_root: PathBuf,
    pub user_data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub db_path: PathBuf,
    pub secrets_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        Self::resolve(|key| env::var(key).ok().filter(|value| !value.is_empty()))
    }

    /// Resolves the layout from `lookup`, which stands in for the environment.
    fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let project_root = lookup("KNOWLEDGE_ROOT").map(PathBuf::from);
        let user_data_dir = lookup("KNOWLEDGE_DATA_DIR")
            .map(PathBuf::from)
            .or_else(|| project_root.clone())
            .unwrap_or_else(|| platform_data_dir(&lookup));

        let mut paths = Self::under(&user_data_dir);
        if let Some(root) = project_root {
            paths.project_root = root;
        }
        paths
    }

    /// Lays every path out below `user_data_dir`, which doubles as the project
    /// root. Nothing is created on disk; see [`AppPaths::ensure_dirs`].
    pub fn under(user_data_dir: &Path) -> Self {
        let user_data_dir = user_data_dir.to_path_buf();
        AppPaths {
            project_root: user_data_dir.clone(),
            log_dir: user_data_dir.join("logs"),
            db_path: user_data_dir.join("knowledge.db"),
            secrets_path: user_data_dir.join("secrets.yaml"),
            user_data_dir,
        }
    }

    pub fn ensure_dirs(&self) -> Result<(), KnowledgeError> {
        for dir in [&self.user_data_dir, &self.log_dir] {
            fs::create_dir_all(dir).map_err(|err| {
                KnowledgeError::Storage(format!("cannot create {}: {}", dir.display(), err))
            })?;
        }
        Ok(())
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn platform_data_dir(lookup: &impl Fn(&str) -> Option<String>) -> PathBuf {
    let home = || {
        lookup("HOME")
            .or_else(|| lookup("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    };

    if cfg!(target_os = "windows") {
        let base = lookup("LOCALAPPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(home);
        return base.join(APP_DIR_NAME);
    }

    if cfg!(target_os = "macos") {
        return home()
            .join("Library")
            .join("Application Support")
            .join(APP_DIR_NAME);
    }

    lookup("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home().join(".local").join("share"))
        .join(APP_DIR_NAME)
}
