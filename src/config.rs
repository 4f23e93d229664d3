use directories::UserDirs;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

use crate::selection::Timing;
use crate::tracker::Color;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the home directory")]
    NoHome,
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub waiting_ms: u64,
    pub chosen_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            waiting_ms: 2000,
            chosen_ms: 3000,
        }
    }
}

impl TimingConfig {
    pub fn to_timing(&self) -> Timing {
        Timing {
            waiting: Duration::from_millis(self.waiting_ms),
            chosen: Duration::from_millis(self.chosen_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawConfig {
    /// Fixed seed for reproducible draws; OS entropy when absent.
    pub seed: Option<u64>,
    pub palette: Vec<Color>,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            seed: None,
            palette: Color::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Sleep between device polls when no events arrived.
    pub poll_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self { poll_ms: 4 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PickerConfig {
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub draw: DrawConfig,
    #[serde(default)]
    pub input: InputConfig,
}

fn config_dir() -> Result<PathBuf, ConfigError> {
    let home = UserDirs::new().ok_or(ConfigError::NoHome)?;
    Ok(home.home_dir().join(".config").join("fingerpick"))
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

fn default_config_text() -> &'static str {
    include_str!("../config/default.toml")
}

impl PickerConfig {
    pub fn from_toml_str(txt: &str) -> Result<Self, ConfigError> {
        Self::parse(txt, Path::new("<inline>"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let txt = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&txt, path)
    }

    /// Loads `~/.config/fingerpick/config.toml`, writing the bundled default
    /// there first if it does not exist yet.
    pub fn load_or_install_default() -> Result<Self, ConfigError> {
        let path = default_config_path()?;
        if !path.exists() {
            let dir = config_dir()?;
            fs::create_dir_all(&dir).map_err(|source| ConfigError::Write {
                path: dir.clone(),
                source,
            })?;
            fs::write(&path, default_config_text()).map_err(|source| ConfigError::Write {
                path: path.clone(),
                source,
            })?;
            info!("installed default config at {}", path.display());
        }
        Self::load(&path)
    }

    /// Explicit path if given, the per-user default otherwise.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Self::load_or_install_default(),
        }
    }

    fn parse(txt: &str, path: &Path) -> Result<Self, ConfigError> {
        let cfg: PickerConfig = toml::from_str(txt).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timing.waiting_ms == 0 || self.timing.chosen_ms == 0 {
            return Err(ConfigError::Invalid(
                "timing windows must be positive durations".into(),
            ));
        }
        if self.draw.palette.is_empty() {
            return Err(ConfigError::Invalid("draw.palette must not be empty".into()));
        }
        if self.input.poll_ms == 0 {
            return Err(ConfigError::Invalid("input.poll_ms must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_default_parses() {
        let cfg = PickerConfig::from_toml_str(default_config_text()).unwrap();
        assert_eq!(cfg.timing, TimingConfig::default());
        assert_eq!(cfg.draw.palette, Color::ALL.to_vec());
        assert_eq!(cfg.draw.seed, None);
    }

    #[test]
    fn empty_file_means_defaults() {
        let cfg = PickerConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, PickerConfig::default());
        assert_eq!(cfg.timing.to_timing(), Timing::default());
    }

    #[test]
    fn overrides_apply() {
        let cfg = PickerConfig::from_toml_str(
            r#"
            [meta]
            name = "party"

            [timing]
            waiting_ms = 500

            [draw]
            seed = 3
            palette = ["red", "cyan"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.meta.name.as_deref(), Some("party"));
        assert_eq!(cfg.timing.waiting_ms, 500);
        assert_eq!(cfg.timing.chosen_ms, 3000);
        assert_eq!(cfg.draw.seed, Some(3));
        assert_eq!(cfg.draw.palette, vec![Color::Red, Color::Cyan]);
    }

    #[test]
    fn rejects_zero_window() {
        let err = PickerConfig::from_toml_str("[timing]\nchosen_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_empty_palette() {
        let err = PickerConfig::from_toml_str("[draw]\npalette = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_color() {
        let err = PickerConfig::from_toml_str("[draw]\npalette = [\"mauve\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
