//! Durable per-source state.
//!
//! Each source owns one slot: a file under the state directory holding the
//! last state that was successfully notified. A slot is either a JSON object
//! (the canonical record's fields, plus an optional `"_issue"` number) or a
//! bare version string, which is what `.txt` slots have always contained.
//! Saving replaces the whole file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use feedwatch_types::{PersistedState, PersistedValue, Scalar};

/// Reserved key holding the tracking-issue number in JSON slots.
pub const ISSUE_KEY: &str = "_issue";

/// Errors reading or writing a state slot.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Read error for state slot '{slot}': {source}")]
    Read {
        slot: String,
        #[source]
        source: io::Error,
    },

    #[error("Write error for state slot '{slot}': {source}")]
    Write {
        slot: String,
        #[source]
        source: io::Error,
    },

    #[error("Could not encode state for slot '{slot}': {source}")]
    Encode {
        slot: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Storage for the last known state of each source.
pub trait StateStore: Send + Sync {
    /// Read a slot. A missing slot is `Ok(None)`.
    fn load(&self, slot: &str) -> Result<Option<PersistedState>, StateError>;

    /// Replace the slot's contents.
    fn save(&self, slot: &str, state: &PersistedState) -> Result<(), StateError>;

    /// Forget a slot. Clearing a missing slot is not an error.
    fn clear(&self, slot: &str) -> Result<(), StateError>;
}

/// One file per slot under a directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a slot's file.
    pub fn path(&self, slot: &str) -> PathBuf {
        self.dir.join(slot)
    }
}

impl StateStore for FileStateStore {
    fn load(&self, slot: &str) -> Result<Option<PersistedState>, StateError> {
        match fs::read_to_string(self.path(slot)) {
            Ok(content) => Ok(decode(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StateError::Read {
                slot: slot.to_string(),
                source,
            }),
        }
    }

    fn save(&self, slot: &str, state: &PersistedState) -> Result<(), StateError> {
        let content = encode(slot, state)?;
        let path = self.path(slot);
        let write_err = |source| StateError::Write {
            slot: slot.to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        // Write a sibling, then rename over the slot.
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = path.with_file_name(format!(".{}.tmp", file_name));
        fs::write(&tmp, content).map_err(write_err)?;
        fs::rename(&tmp, &path).map_err(write_err)?;

        debug!(slot, path = %path.display(), "Saved state");
        Ok(())
    }

    fn clear(&self, slot: &str) -> Result<(), StateError> {
        match fs::remove_file(self.path(slot)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StateError::Write {
                slot: slot.to_string(),
                source,
            }),
        }
    }
}

/// Whether a slot stores a bare string rather than JSON.
pub fn is_raw_slot(slot: &str) -> bool {
    Path::new(slot)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
}

fn decode(content: &str) -> Option<PersistedState> {
    let content = content.trim();
    if content.is_empty() {
        return None;
    }

    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(content) else {
        return Some(PersistedState::raw(content));
    };

    let issue = map.get(ISSUE_KEY).and_then(Value::as_u64);
    let fields = map
        .into_iter()
        .filter(|(key, _)| key != ISSUE_KEY)
        .filter_map(|(key, value)| match serde_json::from_value::<Scalar>(value) {
            Ok(scalar) => Some((key, scalar)),
            Err(_) => {
                debug!(key = %key, "Skipping non-scalar value in state slot");
                None
            }
        })
        .collect();

    Some(PersistedState {
        value: PersistedValue::Record(fields),
        issue,
    })
}

fn encode(slot: &str, state: &PersistedState) -> Result<String, StateError> {
    if is_raw_slot(slot) {
        if let Some(version) = state.version() {
            return Ok(version.to_string());
        }
    }

    match &state.value {
        PersistedValue::Raw(raw) => Ok(raw.clone()),
        PersistedValue::Record(fields) => {
            let mut map = Map::new();
            for (key, value) in fields {
                let value = serde_json::to_value(value).map_err(|source| StateError::Encode {
                    slot: slot.to_string(),
                    source,
                })?;
                map.insert(key.clone(), value);
            }
            if let Some(issue) = state.issue {
                map.insert(ISSUE_KEY.to_string(), Value::from(issue));
            }
            Ok(Value::Object(map).to_string())
        }
    }
}
