use directories::ProjectDirs;
use std::path::PathBuf;

const APP_NAME: &str = "tryout";

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    fn home() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .filter(|h| !h.is_empty())
            .map(PathBuf::from)
    }

    fn project() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", APP_NAME)
    }

    pub fn config_dir() -> PathBuf {
        if let Some(home) = Self::home() {
            home.join(".config").join(APP_NAME)
        } else if let Some(pd) = Self::project() {
            pd.config_dir().to_path_buf()
        } else {
            PathBuf::from(".")
        }
    }

    pub fn state_dir() -> PathBuf {
        if let Some(home) = Self::home() {
            home.join(".local").join("state").join(APP_NAME)
        } else if let Some(pd) = Self::project() {
            pd.data_local_dir().to_path_buf()
        } else {
            PathBuf::from(".")
        }
    }

    pub fn data_dir() -> PathBuf {
        if let Some(home) = Self::home() {
            home.join(".local").join("share").join(APP_NAME)
        } else if let Some(pd) = Self::project() {
            pd.data_dir().to_path_buf()
        } else {
            PathBuf::from(".")
        }
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    pub fn profile_path() -> PathBuf {
        Self::config_dir().join("profile.json")
    }

    pub fn db_path() -> PathBuf {
        Self::state_dir().join("history.db")
    }

    pub fn log_path() -> PathBuf {
        Self::state_dir().join("tryout.log")
    }

    pub fn exam_dir() -> PathBuf {
        Self::data_dir().join("exams")
    }
}
