use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// State directory, `$HOME/.local/state/proctor` when HOME is set
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(
                PathBuf::from(home)
                    .join(".local")
                    .join("state")
                    .join("proctor"),
            )
        } else {
            ProjectDirs::from("", "", "proctor").map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }

    pub fn journal_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("journal.db"))
    }

    pub fn log_dir() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("logs"))
    }
}
