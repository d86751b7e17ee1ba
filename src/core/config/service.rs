use std::env;
use std::fs;
use std::path::PathBuf;

use super::paths::AppPaths;
use super::validation::validate_config;
use super::RagConfig;
use crate::core::errors::RagError;

/// Loads `config.yml` and applies environment overrides.
#[derive(Debug, Clone)]
pub struct ConfigService {
    paths: AppPaths,
    explicit_path: Option<PathBuf>,
}

impl ConfigService {
    pub fn new(paths: AppPaths) -> Self {
        Self {
            paths,
            explicit_path: None,
        }
    }

    pub fn with_path(mut self, path: Option<PathBuf>) -> Self {
        self.explicit_path = path;
        self
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config_path(&self) -> PathBuf {
        if let Some(path) = &self.explicit_path {
            return path.clone();
        }
        if let Ok(path) = env::var("DOCRAG_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        self.paths.data_dir.join("config.yml")
    }

    /// Missing file means defaults; a file that fails to parse is an error.
    pub fn load_config(&self) -> Result<RagConfig, RagError> {
        let path = self.config_path();
        let mut config = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|err| {
                RagError::Config(format!("failed to read {}: {}", path.display(), err))
            })?;
            serde_yaml::from_str::<RagConfig>(&contents).map_err(|err| {
                RagError::Config(format!("failed to parse {}: {}", path.display(), err))
            })?
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            RagConfig::default()
        };

        apply_env_overrides(&mut config, |key| env::var(key).ok());
        validate_config(&config)?;
        Ok(config)
    }
}

fn apply_env_overrides<F>(config: &mut RagConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(url) = non_empty("DOCRAG_BASE_URL") {
        config.provider.base_url = url;
    }
    if let Some(key) = non_empty("DOCRAG_API_KEY") {
        config.provider.api_key = Some(key);
    }
    if let Some(model) = non_empty("DOCRAG_EMBEDDING_MODEL") {
        config.embedding.model = model;
    }
    if let Some(model) = non_empty("DOCRAG_CHAT_MODEL") {
        config.generation.model = model;
    }
}
