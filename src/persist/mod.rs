//! Durable state management: explicit saves, debounced auto-save with
//! retry/backoff, export/import, and named profiles.

mod document;
mod store;

use std::rc::Rc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, warn};

pub use document::{Document, NestRecord, WidgetRecord};
pub use store::{FileStorage, MemoryStorage, Storage, StorageError};

use crate::clock::Clock;
use crate::grid::{Event, Events, GridSnapshot};
use crate::Options;

/// Key holding the current grid state.
const STATE_KEY: &str = "grid-state";
const PROFILE_PREFIX: &str = "profile-";

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("storage quota exceeded")]
    Quota,
    #[error("read-back verification failed for key `{key}`")]
    Verification { key: String },
    #[error("no profile named `{0}`")]
    MissingProfile(String),
    #[error("document codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("document is inconsistent: {0}")]
    InvalidDocument(String),
    #[error(transparent)]
    Backend(anyhow::Error),
}

impl From<StorageError> for PersistenceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Quota => Self::Quota,
            StorageError::Backend(err) => Self::Backend(err),
        }
    }
}

#[derive(Debug)]
struct Autosave {
    enabled: bool,
    /// Failed attempts since the last success.
    failures: u32,
    next_due: Duration,
}

pub struct PersistenceManager {
    storage: Box<dyn Storage>,
    clock: Clock,
    options: Rc<Options>,
    dirty: bool,
    active_profile: Option<String>,
    autosave: Autosave,
}

impl std::fmt::Debug for PersistenceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceManager")
            .field("dirty", &self.dirty)
            .field("active_profile", &self.active_profile)
            .field("autosave", &self.autosave)
            .finish_non_exhaustive()
    }
}

impl PersistenceManager {
    pub fn new(storage: Box<dyn Storage>, options: Rc<Options>, clock: Clock) -> Self {
        let next_due = clock.now() + options.autosave_interval;
        Self {
            storage,
            clock,
            options,
            dirty: false,
            active_profile: None,
            autosave: Autosave {
                enabled: true,
                failures: 0,
                next_due,
            },
        }
    }

    pub fn update_config(&mut self, options: Rc<Options>) {
        self.options = options;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_autosave_enabled(&self) -> bool {
        self.autosave.enabled
    }

    pub fn active_profile(&self) -> Option<&str> {
        self.active_profile.as_deref()
    }

    // =========================================================================
    // Saving
    // =========================================================================

    /// Explicit save: serialize, write, read back and byte-compare. Also
    /// updates the active named profile, if any.
    pub fn save(
        &mut self,
        snapshot: &GridSnapshot,
        events: &mut Events,
    ) -> Result<(), PersistenceError> {
        let result = self.write_state(snapshot).and_then(|()| {
            if let Some(profile) = self.active_profile.clone() {
                self.write_document(&profile_key(&profile), snapshot)?;
            }
            Ok(())
        });

        match &result {
            Ok(()) => events.emit(Event::SaveCompleted),
            Err(err) => events.emit(Event::SaveFailed {
                message: err.to_string(),
            }),
        }
        result
    }

    fn write_state(&mut self, snapshot: &GridSnapshot) -> Result<(), PersistenceError> {
        self.write_document(STATE_KEY, snapshot)?;

        self.dirty = false;
        self.autosave.failures = 0;
        self.autosave.next_due = self.clock.now() + self.options.autosave_interval;
        Ok(())
    }

    fn write_document(
        &mut self,
        key: &str,
        snapshot: &GridSnapshot,
    ) -> Result<(), PersistenceError> {
        let mut doc = Document::from_snapshot(snapshot, self.options.grid_size);
        doc.last_saved = Some(Utc::now());
        let bytes = doc.encode()?;

        self.storage.write(key, &bytes)?;

        let read_back = self.storage.read(key)?;
        if read_back.as_deref() != Some(bytes.as_slice()) {
            return Err(PersistenceError::Verification {
                key: key.to_owned(),
            });
        }

        debug!("wrote {} bytes to `{key}`", bytes.len());
        Ok(())
    }

    /// Whether an auto-save attempt is due. Lets the caller skip building a
    /// snapshot on ticks that won't write anything.
    pub fn wants_autosave(&self) -> bool {
        self.autosave.enabled && self.dirty && self.clock.now() >= self.autosave.next_due
    }

    /// Auto-save machinery, run from the scheduler tick.
    ///
    /// Only attempts a write when the state is dirty and the interval (or the
    /// current backoff) has elapsed. After `autosave_max_retries` consecutive
    /// failures, auto-save disables itself rather than retrying forever; the
    /// host has to re-enable it explicitly.
    pub fn tick(&mut self, snapshot: &GridSnapshot, events: &mut Events) {
        if !self.autosave.enabled || !self.dirty {
            return;
        }
        if self.clock.now() < self.autosave.next_due {
            return;
        }

        match self.write_state(snapshot) {
            Ok(()) => {
                debug!("auto-save completed");
            }
            Err(err) => {
                self.autosave.failures += 1;
                let attempt = self.autosave.failures;
                warn!("auto-save attempt {attempt} failed: {err}");
                events.emit(Event::AutoSaveFailed { attempt });

                if attempt >= self.options.autosave_max_retries {
                    self.autosave.enabled = false;
                    error!(
                        "auto-save disabled after {attempt} failed attempts; \
                         manual save required"
                    );
                    events.emit(Event::AutoSaveDisabled);
                } else {
                    // Exponential backoff: interval, 2x, 4x, ...
                    let backoff = self.options.autosave_interval * 2u32.pow(attempt);
                    self.autosave.next_due = self.clock.now() + backoff;
                }
            }
        }
    }

    /// Re-arms auto-save after it disabled itself.
    pub fn enable_autosave(&mut self) {
        self.autosave.enabled = true;
        self.autosave.failures = 0;
        self.autosave.next_due = self.clock.now() + self.options.autosave_interval;
    }

    // =========================================================================
    // Loading, export/import
    // =========================================================================

    /// Loads the current state, if one was ever saved.
    pub fn load(&self) -> Result<Option<GridSnapshot>, PersistenceError> {
        let Some(bytes) = self.storage.read(STATE_KEY)? else {
            return Ok(None);
        };
        Ok(Some(Document::decode(&bytes)?.into_snapshot()?))
    }

    /// Produces a self-contained export document.
    pub fn export(&self, snapshot: &GridSnapshot) -> Result<Vec<u8>, PersistenceError> {
        let mut doc = Document::from_snapshot(snapshot, self.options.grid_size);
        doc.exported_at = Some(Utc::now());
        doc.encode()
    }

    /// Parses an exported document back into a snapshot. The caller replaces
    /// the store state and resets history.
    pub fn import(&self, bytes: &[u8]) -> Result<GridSnapshot, PersistenceError> {
        Document::decode(bytes)?.into_snapshot()
    }

    // =========================================================================
    // Named profiles
    // =========================================================================

    pub fn save_profile(
        &mut self,
        name: &str,
        snapshot: &GridSnapshot,
        events: &mut Events,
    ) -> Result<(), PersistenceError> {
        let key = profile_key(name);
        self.write_document(&key, snapshot)?;
        self.active_profile = Some(name.to_owned());
        events.emit(Event::ProfileChanged {
            name: name.to_owned(),
        });
        Ok(())
    }

    pub fn load_profile(
        &mut self,
        name: &str,
        events: &mut Events,
    ) -> Result<GridSnapshot, PersistenceError> {
        let key = profile_key(name);
        let bytes = self
            .storage
            .read(&key)?
            .ok_or_else(|| PersistenceError::MissingProfile(name.to_owned()))?;
        let snapshot = Document::decode(&bytes)?.into_snapshot()?;

        self.active_profile = Some(name.to_owned());
        events.emit(Event::ProfileChanged {
            name: name.to_owned(),
        });
        Ok(snapshot)
    }

    pub fn delete_profile(&mut self, name: &str) -> Result<(), PersistenceError> {
        self.storage.remove(&profile_key(name))?;
        if self.active_profile.as_deref() == Some(name) {
            self.active_profile = None;
        }
        Ok(())
    }

    pub fn list_profiles(&self) -> Result<Vec<String>, PersistenceError> {
        let keys = self.storage.list(PROFILE_PREFIX)?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(PROFILE_PREFIX).map(str::to_owned))
            .collect())
    }
}

fn profile_key(name: &str) -> String {
    format!("{PROFILE_PREFIX}{name}")
}
