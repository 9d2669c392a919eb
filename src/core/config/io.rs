use crate::core::config::data::{path_display, Config};
use directories::ProjectDirs;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Errors that can occur when loading or locating configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse the configuration file as valid TOML.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// The platform offers no home or config directory.
    NoConfigDir,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(
                    f,
                    "Failed to read config at {}: {}",
                    path_display(path),
                    source
                )
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "Failed to parse config at {}: {}",
                    path_display(path),
                    source
                )
            }
            ConfigError::NoConfigDir => write!(f, "Failed to determine config directory"),
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::NoConfigDir => None,
        }
    }
}

pub(crate) fn project_dirs() -> Result<ProjectDirs, ConfigError> {
    ProjectDirs::from("org", "jamchat", "jamchat").ok_or(ConfigError::NoConfigDir)
}

impl Config {
    pub fn load() -> Result<Config, Box<dyn StdError>> {
        Self::load_from_path(&Self::get_config_path()?)
    }

    pub fn save(&self) -> Result<(), Box<dyn StdError>> {
        self.save_to_path(&Self::get_config_path()?)
    }

    pub fn load_from_path(config_path: &Path) -> Result<Config, Box<dyn StdError>> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
                path: config_path.to_path_buf(),
                source,
            })?;
            let config: Config =
                toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: config_path.to_path_buf(),
                    source,
                })?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub(crate) fn save_to_path(&self, config_path: &Path) -> Result<(), Box<dyn StdError>> {
        let parent = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir)?;
        }

        let contents = toml::to_string_pretty(self)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };

        temp_file.write_all(contents.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file
            .persist(config_path)
            .map_err(|err| -> Box<dyn StdError> { Box::new(err) })?;
        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf, ConfigError> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// Location of the saved conversation state: the configured override or
    /// `state.json` in the platform data directory.
    pub fn resolve_state_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.state_path {
            Some(path) => Ok(path.clone()),
            None => Ok(project_dirs()?.data_dir().join("state.json")),
        }
    }

    /// Applies a `jamchat set <key> <value>` assignment.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), String> {
        let value = value.trim();
        match key {
            "assistant-name" => self.assistant_name = value.to_string(),
            "response-language" => self.response_language = value.to_string(),
            "reveal-interval-ms" => {
                self.reveal_interval_ms = value
                    .parse()
                    .map_err(|_| format!("not a number of milliseconds: {value}"))?;
            }
            "state-path" => self.state_path = Some(PathBuf::from(value)),
            "primary-model" => self.primary.model = value.to_string(),
            "alternate-model" => self.alternate.model = value.to_string(),
            "voice-name" => self.voice.voice_name = value.to_string(),
            "input-device" => self.voice.input_device = Some(value.to_string()),
            "output-device" => self.voice.output_device = Some(value.to_string()),
            other => return Err(format!("unknown config key: {other}")),
        }
        Ok(())
    }

    /// Restores a key to its default value.
    pub fn unset_value(&mut self, key: &str) -> Result<(), String> {
        let defaults = Config::default();
        match key {
            "assistant-name" => self.assistant_name = defaults.assistant_name,
            "response-language" => self.response_language = defaults.response_language,
            "reveal-interval-ms" => self.reveal_interval_ms = defaults.reveal_interval_ms,
            "state-path" => self.state_path = None,
            "primary-model" => self.primary.model = defaults.primary.model,
            "alternate-model" => self.alternate.model = defaults.alternate.model,
            "voice-name" => self.voice.voice_name = defaults.voice.voice_name,
            "input-device" => self.voice.input_device = None,
            "output-device" => self.voice.output_device = None,
            other => return Err(format!("unknown config key: {other}")),
        }
        Ok(())
    }
}
