//! The single local state record: user profile plus both histories.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::core::backend::BackendId;
use crate::core::config::data::path_display;
use crate::core::history::HistoryStore;
use crate::core::message::Entry;
use crate::core::profile::UserProfile;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default)]
    pub user_profile: UserProfile,
    #[serde(default)]
    pub histories: BTreeMap<BackendId, Vec<Entry>>,
}

impl AppState {
    pub fn new(profile: &UserProfile, history: &HistoryStore) -> Self {
        Self {
            user_profile: profile.clone(),
            histories: history.logs().clone(),
        }
    }

    /// Builds the history store with the persisted backend preference active.
    pub fn into_parts(self) -> (UserProfile, HistoryStore) {
        let active = self.user_profile.current_model;
        (self.user_profile, HistoryStore::from_logs(self.histories, active))
    }
}

#[derive(Debug)]
pub enum StateError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    Encode(serde_json::Error),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::Read { path, source } => {
                write!(f, "Failed to read state at {}: {}", path_display(path), source)
            }
            StateError::Parse { path, source } => {
                write!(f, "Failed to parse state at {}: {}", path_display(path), source)
            }
            StateError::Write { path, source } => {
                write!(f, "Failed to write state at {}: {}", path_display(path), source)
            }
            StateError::Encode(source) => write!(f, "Failed to encode state: {source}"),
        }
    }
}

impl StdError for StateError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StateError::Read { source, .. } | StateError::Write { source, .. } => Some(source),
            StateError::Parse { source, .. } => Some(source),
            StateError::Encode(source) => Some(source),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the record; a missing file is the default state.
    pub fn load(&self) -> Result<AppState, StateError> {
        if !self.path.exists() {
            return Ok(AppState::default());
        }
        let contents = fs::read_to_string(&self.path).map_err(|source| StateError::Read {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| StateError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Like [`StateStore::load`], but an unreadable record is logged and
    /// replaced by the default state.
    pub fn load_or_default(&self) -> AppState {
        self.load().unwrap_or_else(|err| {
            warn!("{err}; starting with an empty state");
            AppState::default()
        })
    }

    pub fn save(&self, state: &AppState) -> Result<(), StateError> {
        let contents = serde_json::to_string(state).map_err(StateError::Encode)?;
        let write_err = |source: std::io::Error| StateError::Write {
            path: self.path.clone(),
            source,
        };

        let parent = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());
        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(write_err)?;
        }

        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(write_err)?;
        temp_file.write_all(contents.as_bytes()).map_err(write_err)?;
        temp_file.as_file_mut().sync_all().map_err(write_err)?;
        temp_file
            .persist(&self.path)
            .map_err(|err| write_err(err.error))?;
        debug!(path = %path_display(&self.path), "state saved");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StateError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StateError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
