use directories::ProjectDirs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "typeflow";

/// Centralized application directory resolution
#[derive(Debug, Clone)]
pub struct AppDirs {
    root: PathBuf,
}

impl AppDirs {
    /// `$HOME/.local/state/typeflow`, or the platform data dir without `$HOME`.
    pub fn resolve() -> Option<Self> {
        if let Ok(home) = std::env::var("HOME") {
            let root = PathBuf::from(home)
                .join(".local")
                .join("state")
                .join(APP_NAME);
            Some(Self { root })
        } else {
            ProjectDirs::from("", "", APP_NAME).map(|proj_dirs| Self {
                root: proj_dirs.data_local_dir().to_path_buf(),
            })
        }
    }

    /// Everything under an explicit directory, e.g. from `--data-dir`.
    pub fn at<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn json_path(&self) -> PathBuf {
        self.root.join("state.json")
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join("state.db")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}
