use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Weather API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub api_key: String,

    /// Full current-weather endpoint; the city and key are sent as query parameters.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Where observations are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// cities = ["Paris", "Lyon", "Marseille"]
///
/// [api]
/// api_key = "..."
///
/// [database]
/// path = "/var/lib/weatherlog/weather.db"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Cities to ingest, in processing order.
    #[serde(default)]
    pub cities: Vec<String>,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Config {
    /// Load config from the default location, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = project_dirs()
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Checks that every input the ingestion run needs is present.
    ///
    /// Only non-emptiness is checked; city names are not looked up anywhere.
    pub fn validate(&self) -> Result<()> {
        if self.api.api_key.trim().is_empty() {
            bail!(
                "No API key configured.\n\
                 Hint: run `weatherlog configure` and enter your OpenWeather API key."
            );
        }

        if self.cities.is_empty() {
            bail!(
                "No cities configured.\n\
                 Hint: run `weatherlog configure` or pass cities to `weatherlog run`."
            );
        }

        if let Some(pos) = self.cities.iter().position(|c| c.trim().is_empty()) {
            bail!("City #{} in the configured list is empty", pos + 1);
        }

        if self.database.path.as_os_str().is_empty() {
            bail!("Database path is empty");
        }

        Ok(())
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "weatherlog", "weatherlog")
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_database_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("weather.db"))
        .unwrap_or_else(|| PathBuf::from("weather.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            cities: vec!["Paris".into(), "Lyon".into()],
            api: ApiConfig {
                api_key: "KEY".into(),
                ..ApiConfig::default()
            },
            database: DatabaseConfig {
                path: PathBuf::from("/tmp/weather.db"),
            },
        }
    }

    #[test]
    fn parses_minimal_toml_with_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            cities = ["Paris", "Lyon", "Marseille"]

            [api]
            api_key = "KEY"
            "#,
        )
        .expect("config should parse");

        assert_eq!(cfg.cities, vec!["Paris", "Lyon", "Marseille"]);
        assert_eq!(cfg.api.api_key, "KEY");
        assert_eq!(cfg.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.api.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(cfg.database.path.ends_with("weather.db"));
    }

    #[test]
    fn validate_accepts_complete_config() {
        valid_config().validate().expect("config should be valid");
    }

    #[test]
    fn validate_errors_when_api_key_missing() {
        let mut cfg = valid_config();
        cfg.api.api_key = "  ".into();

        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("No API key configured"));
        assert!(err.to_string().contains("Hint: run `weatherlog configure`"));
    }

    #[test]
    fn validate_errors_when_no_cities() {
        let mut cfg = valid_config();
        cfg.cities.clear();

        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("No cities configured"));
    }

    #[test]
    fn validate_errors_on_blank_city() {
        let mut cfg = valid_config();
        cfg.cities.push(String::new());

        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("City #3"));
    }

    #[test]
    fn load_returns_default_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn save_then_load_preserves_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let cfg = valid_config();
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, cfg);
    }
}
