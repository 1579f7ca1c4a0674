use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use coherence_router::DEFAULT_MIN_FREQUENCY;

pub const DEFAULT_CONFIG_FILE: &str = "coherence.toml";
pub const DEFAULT_ROOT: &str = "data_lake";
pub const DEFAULT_ROUTER_SCHEMA: &str = "builtin:agent";
pub const DEFAULT_MEMORY_SCHEMA: &str = "builtin:memory";

pub const ENV_ROOT: &str = "COHERENCE_ROOT";
pub const ENV_SCHEMA: &str = "COHERENCE_SCHEMA";
pub const ENV_CONFIG: &str = "COHERENCE_CONFIG";

/// Contents of `coherence.toml`. Every key is optional.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub root: Option<PathBuf>,
    pub schema: Option<String>,
    pub min_frequency: Option<f64>,
    pub agent_packets: Option<bool>,
}

impl FileConfig {
    pub fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Invalid coherence config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("In {}", path.display()))
    }
}

/// Values given on the command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub root: Option<PathBuf>,
    pub schema: Option<String>,
}

/// Settings after layering flags, environment, config file and defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub root: PathBuf,
    /// Explicitly chosen schema; `None` means the per-command default.
    pub schema: Option<String>,
    pub min_frequency: f64,
    pub agent_packets: bool,
}

impl Settings {
    pub fn resolve(overrides: Overrides) -> Result<Self> {
        let env_value = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());

        let config_path = overrides
            .config
            .clone()
            .or_else(|| env_value(ENV_CONFIG).map(PathBuf::from));
        let file = match config_path {
            Some(path) => FileConfig::load(&path)?,
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.is_file() {
                    log::debug!("Using {}", local.display());
                    FileConfig::load(local)?
                } else {
                    FileConfig::default()
                }
            }
        };

        Ok(Self::layer(
            overrides,
            env_value(ENV_ROOT).map(PathBuf::from),
            env_value(ENV_SCHEMA),
            file,
        ))
    }

    fn layer(
        overrides: Overrides,
        env_root: Option<PathBuf>,
        env_schema: Option<String>,
        file: FileConfig,
    ) -> Self {
        Self {
            root: overrides
                .root
                .or(env_root)
                .or(file.root)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT)),
            schema: overrides.schema.or(env_schema).or(file.schema),
            min_frequency: file.min_frequency.unwrap_or(DEFAULT_MIN_FREQUENCY),
            agent_packets: file.agent_packets.unwrap_or(false),
        }
    }

    pub fn router_schema(&self) -> &str {
        self.schema.as_deref().unwrap_or(DEFAULT_ROUTER_SCHEMA)
    }

    pub fn memory_schema(&self) -> &str {
        self.schema.as_deref().unwrap_or(DEFAULT_MEMORY_SCHEMA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_any_source() {
        let settings = Settings::layer(Overrides::default(), None, None, FileConfig::default());
        assert_eq!(settings.root, PathBuf::from(DEFAULT_ROOT));
        assert_eq!(settings.router_schema(), "builtin:agent");
        assert_eq!(settings.memory_schema(), "builtin:memory");
        assert_eq!(settings.min_frequency, 0.1);
        assert!(!settings.agent_packets);
    }

    #[test]
    fn flag_beats_env_beats_file() {
        let file = FileConfig::parse(
            r#"
            root = "from_file"
            schema = "file.json"
            min_frequency = 0.25
            agent_packets = true
            "#,
        )
        .unwrap();

        let settings = Settings::layer(
            Overrides {
                config: None,
                root: Some(PathBuf::from("from_flag")),
                schema: None,
            },
            Some(PathBuf::from("from_env")),
            Some("env.json".to_string()),
            file.clone(),
        );
        assert_eq!(settings.root, PathBuf::from("from_flag"));
        assert_eq!(settings.schema.as_deref(), Some("env.json"));
        assert_eq!(settings.min_frequency, 0.25);
        assert!(settings.agent_packets);

        let settings = Settings::layer(Overrides::default(), None, None, file);
        assert_eq!(settings.root, PathBuf::from("from_file"));
        assert_eq!(settings.memory_schema(), "file.json");
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        assert!(FileConfig::parse("rooot = \"typo\"").is_err());
    }
}
