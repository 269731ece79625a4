use std::fs;
use std::path::{Path, PathBuf};

use catalog_core::ProjectionSettings;
use serde::Deserialize;

use crate::error::{HostError, HostResult};

pub const CONFIG_ENV: &str = "INCIDENT_CATALOG_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub log_level: Option<String>,
    /// Append-mode JSON log; stdout when unset.
    pub log_file: Option<PathBuf>,
    pub projection: ProjectionSettings,
    pub fixtures: FixtureSettings,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            log_level: Some(String::from("info")),
            log_file: None,
            projection: ProjectionSettings::default(),
            fixtures: FixtureSettings::default(),
        }
    }
}

impl HostConfig {
    /// Explicit path first, then `INCIDENT_CATALOG_CONFIG`, then defaults.
    pub fn from_sources(cli_path: Option<&str>) -> HostResult<Self> {
        let env_path = std::env::var(CONFIG_ENV).ok();
        Self::resolve(cli_path, env_path.as_deref())
    }

    fn resolve(cli_path: Option<&str>, env_path: Option<&str>) -> HostResult<Self> {
        if let Some(path) = cli_path {
            if path.is_empty() {
                return Err(HostError::Config(
                    "configuration path must not be empty".into(),
                ));
            }
        }

        let config = if let Some(path) = cli_path {
            Self::load_from_path(path)?
        } else if let Some(path) = env_path.filter(|p| !p.is_empty()) {
            Self::load_from_path(path)?
        } else {
            let mut cfg = Self::default();
            cfg.normalize_paths(&std::env::current_dir()?);
            cfg
        };

        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> HostResult<Self> {
        let path = path.as_ref();
        let absolute_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let raw = fs::read_to_string(&absolute_path)?;
        let mut config: HostConfig = toml::from_str(&raw)?;
        let base = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.normalize_paths(&base);
        Ok(config)
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    pub fn fixtures(&self) -> &FixtureSettings {
        &self.fixtures
    }

    fn validate(&self) -> HostResult<()> {
        if let Some(level) = self.log_level.as_deref() {
            if level.trim().is_empty() {
                return Err(HostError::Config("log_level must not be empty".into()));
            }
        }

        let projection = &self.projection;
        for (name, value) in [
            ("projection.dpi", projection.dpi),
            ("projection.meters_per_inch", projection.meters_per_inch),
            ("projection.meters_per_degree", projection.meters_per_degree),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(HostError::Config(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }

        let step = projection.synthetic_step_degrees;
        if !step.is_finite() || step < 0.0 {
            return Err(HostError::Config(format!(
                "projection.synthetic_step_degrees must not be negative, got {step}"
            )));
        }

        Ok(())
    }

    fn normalize_paths(&mut self, base: &Path) {
        normalize_optional_path(&mut self.log_file, base);
        self.fixtures.normalize(base);
    }
}

fn normalize_optional_path(target: &mut Option<PathBuf>, base: &Path) {
    if let Some(path) = target {
        if path.is_relative() {
            *path = base.join(&*path);
        }
    }
}

/// Seed files loaded at startup. Each is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FixtureSettings {
    pub data_layers: Option<PathBuf>,
    pub roster: Option<PathBuf>,
}

impl FixtureSettings {
    fn normalize(&mut self, base: &Path) {
        normalize_optional_path(&mut self.data_layers, base);
        normalize_optional_path(&mut self.roster, base);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("catalog.toml");
        fs::write(&path, body).expect("write config");
        path
    }

    #[test]
    fn defaults_apply_without_sources() {
        let config = HostConfig::resolve(None, None).expect("defaults");

        assert_eq!(config.log_level.as_deref(), Some("info"));
        assert!(config.log_file().is_none());
        assert_eq!(config.projection, ProjectionSettings::default());
    }

    #[test]
    fn relative_paths_follow_the_config_file() {
        let dir = TempDir::new().expect("temp dir");
        let path = write_config(
            &dir,
            r#"
log_level = "debug"
log_file = "logs/catalog.log"

[fixtures]
data_layers = "fixtures/data_layers.toml"
"#,
        );

        let config = HostConfig::load_from_path(&path).expect("load");

        assert_eq!(config.log_file(), Some(dir.path().join("logs/catalog.log").as_path()));
        assert_eq!(
            config.fixtures().data_layers.as_deref(),
            Some(dir.path().join("fixtures/data_layers.toml").as_path())
        );
        assert!(config.fixtures().roster.is_none());
    }

    #[test]
    fn explicit_path_wins_over_env_path() {
        let dir = TempDir::new().expect("temp dir");
        let explicit = write_config(&dir, "log_level = \"warn\"\n");
        let explicit = explicit.to_str().expect("utf-8 path");

        let config =
            HostConfig::resolve(Some(explicit), Some("/nonexistent/catalog.toml")).expect("resolve");

        assert_eq!(config.log_level.as_deref(), Some("warn"));
    }

    #[test]
    fn env_path_is_used_when_no_explicit_path() {
        let dir = TempDir::new().expect("temp dir");
        let path = write_config(&dir, "[projection]\ndpi = 72.0\n");

        let config = HostConfig::resolve(None, path.to_str()).expect("resolve");

        assert_eq!(config.projection.dpi, 72.0);
        assert_eq!(config.projection.meters_per_degree, 111_320.0);
    }

    #[test]
    fn empty_explicit_path_is_rejected() {
        let err = HostConfig::resolve(Some(""), None).expect_err("empty path");
        assert!(matches!(err, HostError::Config(_)));
    }

    #[test]
    fn non_positive_projection_is_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let path = write_config(&dir, "[projection]\nmeters_per_degree = 0.0\n");

        let err = HostConfig::resolve(path.to_str(), None).expect_err("invalid projection");

        assert!(matches!(err, HostError::Config(message) if message.contains("meters_per_degree")));
    }

    #[test]
    fn malformed_toml_is_reported() {
        let dir = TempDir::new().expect("temp dir");
        let path = write_config(&dir, "log_level = [\n");

        let err = HostConfig::load_from_path(&path).expect_err("bad toml");

        assert!(matches!(err, HostError::Toml(_)));
    }
}
