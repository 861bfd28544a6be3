use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding local exam files. Falls back to the data dir.
    pub exam_dir: Option<PathBuf>,
    /// Ask before submitting while questions are still unanswered.
    pub confirm_incomplete_submit: bool,
    /// UI redraw interval; the exam countdown always runs in whole seconds.
    pub tick_rate_ms: u64,
    pub history_limit: usize,
    pub staff_access_code: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exam_dir: None,
            confirm_incomplete_submit: true,
            tick_rate_ms: 100,
            history_limit: 20,
            staff_access_code: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn exam_dir(&self) -> PathBuf {
        self.exam_dir.clone().unwrap_or_else(AppDirs::exam_dir)
    }

    /// Command-line values win over the file.
    pub fn with_overrides(mut self, exam_dir: Option<PathBuf>) -> Self {
        if exam_dir.is_some() {
            self.exam_dir = exam_dir;
        }
        self
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            path: AppDirs::config_path(),
        }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "malformed config, using defaults")
                }
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).unwrap_or_default();
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn test_save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config {
            exam_dir: Some(dir.path().join("exams")),
            confirm_incomplete_submit: false,
            tick_rate_ms: 250,
            history_limit: 5,
            staff_access_code: Some("kode".into()),
            log_level: "debug".into(),
        };
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn test_missing_or_malformed_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        assert_eq!(store.load(), Config::default());

        fs::write(&path, "{ nope").unwrap();
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"history_limit": 3}"#).unwrap();

        let cfg = FileConfigStore::with_path(&path).load();

        assert_eq!(cfg.history_limit, 3);
        assert!(cfg.confirm_incomplete_submit);
        assert_eq!(cfg.tick_rate_ms, 100);
    }

    #[test]
    fn test_overrides_replace_exam_dir() {
        let cfg = Config::default().with_overrides(Some(PathBuf::from("/tmp/exams")));
        assert_eq!(cfg.exam_dir(), PathBuf::from("/tmp/exams"));

        let untouched = Config {
            exam_dir: Some(PathBuf::from("/srv/exams")),
            ..Config::default()
        }
        .with_overrides(None);
        assert_eq!(untouched.exam_dir(), PathBuf::from("/srv/exams"));
    }
}
