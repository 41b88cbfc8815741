use std::env;
use std::path::PathBuf;

use lantern_core::{Destination, ModelDefaults, Settings, SpecialPage};
use thiserror::Error;

use crate::host::Bounds;

pub const ENV_STATE_FILE: &str = "LANTERN_STATE_FILE";
pub const ENV_HOME_URL: &str = "LANTERN_HOME_URL";
pub const ENV_CHROME_HEIGHT: &str = "LANTERN_CHROME_HEIGHT";
pub const ENV_WINDOW_WIDTH: &str = "LANTERN_WINDOW_WIDTH";
pub const ENV_WINDOW_HEIGHT: &str = "LANTERN_WINDOW_HEIGHT";
pub const ENV_DOWNLOAD_DIR: &str = "LANTERN_DOWNLOAD_DIR";
pub const ENV_LOG: &str = "LANTERN_LOG";

const DEFAULT_CHROME_HEIGHT: u32 = 90;
const DEFAULT_WINDOW_WIDTH: u32 = 1200;
const DEFAULT_WINDOW_HEIGHT: u32 = 800;
const DEFAULT_LOG_FILTER: &str = "info";
const STATE_FILE_NAME: &str = "lantern-data.json";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{var} is set but empty")]
    Empty { var: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    pub state_file: PathBuf,
    pub home: Destination,
    pub chrome_height: u32,
    pub window_width: u32,
    pub window_height: u32,
    pub download_dir: String,
}

impl ShellConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let state_file = match lookup(ENV_STATE_FILE) {
            Some(path) if path.trim().is_empty() => {
                return Err(ConfigError::Empty {
                    var: ENV_STATE_FILE,
                })
            }
            Some(path) => PathBuf::from(path),
            None => default_state_file(),
        };
        let home = lookup(ENV_HOME_URL)
            .map(|raw| Destination::parse(raw.trim()))
            .unwrap_or(Destination::Special(SpecialPage::Landing));
        let download_dir = lookup(ENV_DOWNLOAD_DIR).unwrap_or_else(default_download_dir);

        Ok(Self {
            state_file,
            home,
            chrome_height: number(&lookup, ENV_CHROME_HEIGHT, DEFAULT_CHROME_HEIGHT)?,
            window_width: number(&lookup, ENV_WINDOW_WIDTH, DEFAULT_WINDOW_WIDTH)?,
            window_height: number(&lookup, ENV_WINDOW_HEIGHT, DEFAULT_WINDOW_HEIGHT)?,
            download_dir,
        })
    }

    pub fn model_defaults(&self) -> ModelDefaults {
        ModelDefaults {
            home: self.home.clone(),
            settings: Settings {
                download_location: self.download_dir.clone(),
                ..Settings::default()
            },
        }
    }

    /// Region below the navigation chrome that the active surface fills.
    pub fn content_bounds(&self) -> Bounds {
        Bounds {
            x: 0,
            y: self.chrome_height,
            width: self.window_width,
            height: self.window_height.saturating_sub(self.chrome_height),
        }
    }
}

pub fn log_filter_from_env() -> String {
    env::var(ENV_LOG)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned())
}

fn number(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u32,
) -> Result<u32, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidNumber { var, value: raw }),
    }
}

fn default_state_file() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("lantern").join(STATE_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(STATE_FILE_NAME))
}

fn default_download_dir() -> String {
    dirs::download_dir()
        .map(|dir| dir.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use lantern_core::{Destination, SpecialPage};

    use super::{ConfigError, ShellConfig, ENV_CHROME_HEIGHT, ENV_HOME_URL, ENV_STATE_FILE};

    fn config_from(pairs: &[(&str, &str)]) -> Result<ShellConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        ShellConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_fill_missing_variables() {
        let config = config_from(&[]).expect("empty environment is valid");
        assert_eq!(config.home, Destination::Special(SpecialPage::Landing));
        assert_eq!(config.chrome_height, 90);
        let bounds = config.content_bounds();
        assert_eq!((bounds.y, bounds.width, bounds.height), (90, 1200, 710));
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            (ENV_STATE_FILE, "/tmp/lantern.json"),
            (ENV_HOME_URL, "https://start.example"),
            (ENV_CHROME_HEIGHT, " 120 "),
        ])
        .expect("overrides are valid");
        assert_eq!(config.state_file, PathBuf::from("/tmp/lantern.json"));
        assert_eq!(
            config.model_defaults().home,
            Destination::Web("https://start.example".to_owned())
        );
        assert_eq!(config.content_bounds().y, 120);
    }

    #[test]
    fn malformed_number_names_the_variable() {
        let error = config_from(&[(ENV_CHROME_HEIGHT, "tall")]).expect_err("must reject");
        assert_eq!(
            error,
            ConfigError::InvalidNumber {
                var: ENV_CHROME_HEIGHT,
                value: "tall".to_owned(),
            }
        );
        assert!(matches!(
            config_from(&[(ENV_STATE_FILE, "  ")]),
            Err(ConfigError::Empty { .. })
        ));
    }
}
