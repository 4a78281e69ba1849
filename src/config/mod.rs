use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::config::themes::ThemeRegistry;
use crate::storage::DEFAULT_STORAGE_KEY;

pub mod themes;

pub use themes::{Palette, ThemeName};

/// Points at a config file, or at a directory holding `config.toml`.
pub const CONFIG_ENV: &str = "CARDTUI_CONFIG";
/// Directory holding the card database.
pub const DATA_ENV: &str = "CARDTUI_DATA";

const CONFIG_FILE_NAME: &str = "config.toml";
const DATABASE_FILE_NAME: &str = "cards.db";
const LOG_FILE_NAME: &str = "cardtui.log";

const DEFAULT_CONFIG_HEADER: &str = "# cardtui configuration, written on first run.\n\n";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        Ok(Self::with_paths(ConfigPaths::discover()?))
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    /// Reads the config file, creating it with defaults when absent.
    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if self.paths.config_file.exists() {
            return self.load();
        }
        let mut cfg = AppConfig::default();
        cfg.post_load(&self.paths)?;
        self.write_default_config(&cfg)?;
        tracing::info!(path = %self.paths.config_file.display(), "wrote default config");
        Ok(cfg)
    }

    pub fn load(&self) -> Result<AppConfig> {
        let path = &self.paths.config_file;
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.post_load(&self.paths)?;
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let body = toml::to_string_pretty(cfg).context("serializing default config")?;
        let path = &self.paths.config_file;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        fs::write(path, format!("{DEFAULT_CONFIG_HEADER}{body}"))
            .with_context(|| format!("writing default config {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
    pub state_dir: PathBuf,
}

impl ConfigPaths {
    /// Platform directories, overridden by [`CONFIG_ENV`] and [`DATA_ENV`].
    pub fn discover() -> Result<Self> {
        let dirs = ProjectDirs::from("io", "CardsTui", "cardtui")
            .context("resolving platform directories for cardtui")?;

        let (config_dir, config_file) = match env::var_os(CONFIG_ENV).map(PathBuf::from) {
            Some(path) if path.is_dir() => (path.clone(), path.join(CONFIG_FILE_NAME)),
            Some(path) => {
                let dir = path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                (dir, path)
            }
            None => {
                let dir = dirs.config_dir().to_path_buf();
                let file = dir.join(CONFIG_FILE_NAME);
                (dir, file)
            }
        };

        let data_dir = env::var_os(DATA_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| dirs.data_dir().to_path_buf());
        let state_dir = match dirs.state_dir() {
            Some(dir) => dir.to_path_buf(),
            None => data_dir.join("state"),
        };

        Ok(Self {
            config_dir,
            config_file,
            database_path: data_dir.join(DATABASE_FILE_NAME),
            data_dir,
            log_dir: state_dir.join("logs"),
            state_dir,
        })
    }

    /// Self-contained layout under one directory.
    pub fn rooted_at(root: &Path) -> Self {
        let config_dir = root.join("config");
        let data_dir = root.join("data");
        let state_dir = root.join("state");
        Self {
            config_file: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
            database_path: data_dir.join(DATABASE_FILE_NAME),
            data_dir,
            log_dir: state_dir.join("logs"),
            state_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        [&self.config_dir, &self.data_dir, &self.state_dir, &self.log_dir]
            .into_iter()
            .try_for_each(|dir| {
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating directory {}", dir.display()))
            })
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE_NAME)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub theme: ThemeName,
    pub storage: StorageOptions,
    pub ui: UiOptions,
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.storage.resolve(paths);
        if !ThemeRegistry::default().contains(&self.theme) {
            tracing::warn!(theme = ?self.theme, "theme has no palette, using dark");
            self.theme = ThemeName::Dark;
        }
        if self.storage.storage_key.trim().is_empty() {
            tracing::warn!("empty storage key in config, using default");
            self.storage.storage_key = DEFAULT_STORAGE_KEY.to_string();
        }
        Ok(())
    }

    pub fn palette(&self) -> Palette {
        ThemeRegistry::default().palette(&self.theme)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    pub storage_key: String,
    /// Maximum bytes across all stored keys (0 = unlimited)
    pub capacity_bytes: u64,
    pub wal_autocheckpoint: u32,
    /// Start from the starter cards when nothing has been saved yet
    pub seed_defaults: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            capacity_bytes: 5 * 1024 * 1024,
            wal_autocheckpoint: 1000,
            seed_defaults: true,
        }
    }
}

impl StorageOptions {
    fn resolve(&mut self, paths: &ConfigPaths) {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        if self.capacity_bytes == 0 {
            None
        } else {
            Some(usize::try_from(self.capacity_bytes).unwrap_or(usize::MAX))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiOptions {
    pub tick_rate_ms: u64,
    /// How long a deleted card stays on screen before it is removed
    pub exit_animation_ms: u64,
}

impl Default for UiOptions {
    fn default() -> Self {
        Self {
            tick_rate_ms: 100,
            exit_animation_ms: 300,
        }
    }
}

impl UiOptions {
    pub fn tick_rate(&self) -> Duration {
        Duration::from_millis(self.tick_rate_ms.max(10))
    }

    pub fn exit_animation(&self) -> Duration {
        Duration::from_millis(self.exit_animation_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn first_run_writes_default_config() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let loader = ConfigLoader::with_paths(ConfigPaths::rooted_at(temp.path()));
        let cfg = loader.load_or_init()?;
        assert!(loader.paths().config_file.exists());
        assert_eq!(cfg.storage.storage_key, "cards");
        assert_eq!(cfg.storage.database_path, loader.paths().database_path);

        let reloaded = loader.load()?;
        assert_eq!(reloaded.ui.exit_animation_ms, cfg.ui.exit_animation_ms);
        Ok(())
    }

    #[test]
    fn partial_config_keeps_defaults_for_missing_keys() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::rooted_at(temp.path());
        paths.ensure_directories()?;
        fs::write(
            &paths.config_file,
            "theme = \"light\"\n[storage]\ncapacity_bytes = 0\nstorage_key = \"  \"\n",
        )?;
        let cfg = ConfigLoader::with_paths(paths).load()?;
        assert_eq!(cfg.theme, ThemeName::Light);
        assert_eq!(cfg.storage.capacity(), None);
        assert_eq!(cfg.storage.storage_key, "cards");
        assert!(cfg.storage.seed_defaults);
        Ok(())
    }
}
