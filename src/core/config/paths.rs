use std::env;
use std::fs;
use std::path::PathBuf;

use super::StorageConfig;

/// Storage locations, resolved once and injected into every component.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub index_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        Self::under(discover_data_dir())
    }

    /// Lays out every store below `data_dir`.
    pub fn under(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let log_dir = data_dir.join("logs");
        let cache_dir = data_dir.join("embeddings");
        let index_dir = data_dir.join("indexes");

        for dir in [&data_dir, &log_dir, &cache_dir, &index_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            data_dir,
            log_dir,
            cache_dir,
            index_dir,
        }
    }

    /// Applies explicit store locations from the config file.
    pub fn with_storage(mut self, storage: &StorageConfig) -> Self {
        if let Some(dir) = &storage.cache_dir {
            let _ = fs::create_dir_all(dir);
            self.cache_dir = dir.clone();
        }
        if let Some(dir) = &storage.index_dir {
            let _ = fs::create_dir_all(dir);
            self.index_dir = dir.clone();
        }
        self
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("DOCRAG_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("docrag");
    }

    if cfg!(target_os = "macos") {
        return home_dir()
            .join("Library")
            .join("Application Support")
            .join("docrag");
    }

    let xdg = env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        home_dir()
            .join(".local/share")
            .to_string_lossy()
            .to_string()
    });
    PathBuf::from(xdg).join("docrag")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}
