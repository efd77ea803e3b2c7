use std::sync::{Mutex, PoisonError};

use anyhow::Context;

use crate::db::Database;
use crate::error::SyncError;
use crate::identity::IdentityResolver;
use crate::models::{CalcState, StateDocument};

/// Synchronous local persistence of the full calc state.
///
/// Records are keyed per identity (see [`IdentityResolver`]). Failures never
/// propagate out of [`LocalStore::save`] / [`LocalStore::load`]; they are
/// logged and the caller carries on with in-memory state.
pub struct LocalStore {
    db: Mutex<Database>,
    identity: IdentityResolver,
}

impl LocalStore {
    pub fn new(db: Database, identity: IdentityResolver) -> Self {
        Self {
            db: Mutex::new(db),
            identity,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    /// Save under the current identity's key. Errors are logged, not raised.
    pub fn save(&self, state: &CalcState) {
        if let Err(e) = self.try_save(state) {
            tracing::warn!(error = %e, "local save failed; keeping in-memory state");
        }
    }

    pub fn try_save(&self, state: &CalcState) -> Result<(), SyncError> {
        let key = self.identity.resolve_storage_key();
        self.write(&key, state)
    }

    /// Save under the key of an already-resolved identity.
    pub fn save_for(&self, uid: Option<&str>, state: &CalcState) {
        let key = self.identity.storage_key_for(uid);
        if let Err(e) = self.write(&key, state) {
            tracing::warn!(error = %e, "local save failed; keeping in-memory state");
        }
    }

    /// Load the current identity's record, migrating from the legacy key when
    /// the current key is empty. `None` means "use defaults".
    #[must_use]
    pub fn load(&self) -> Option<CalcState> {
        let key = self.identity.resolve_storage_key();
        match self.read(&key) {
            Ok(Some(state)) => return Some(state),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "ignoring unreadable local record"),
        }

        let legacy_key = self.identity.keys().legacy_key.clone();
        if legacy_key == key {
            return None;
        }

        match self.read(&legacy_key) {
            Ok(Some(state)) => {
                self.migrate(&legacy_key, &key, &state);
                Some(state)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "legacy record is unreadable; leaving it in place");
                None
            }
        }
    }

    /// Read and validate the record under `key`.
    pub fn read(&self, key: &str) -> Result<Option<CalcState>, SyncError> {
        let raw = {
            let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
            db.get_value(key)
        }
        .map_err(|source| SyncError::LocalRead {
            key: key.to_string(),
            source,
        })?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let state = serde_json::from_str::<StateDocument>(&raw)
            .context("record is not a valid state document")
            .and_then(StateDocument::into_state)
            .map_err(|source| SyncError::LocalRead {
                key: key.to_string(),
                source,
            })?;
        Ok(Some(state))
    }

    fn write(&self, key: &str, state: &CalcState) -> Result<(), SyncError> {
        let json = serde_json::to_string(&StateDocument::from(state))
            .context("failed to serialize state")
            .map_err(|source| SyncError::LocalWrite {
                key: key.to_string(),
                source,
            })?;
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        db.put_value(key, &json)
            .map_err(|source| SyncError::LocalWrite {
                key: key.to_string(),
                source,
            })
    }

    fn migrate(&self, from: &str, to: &str, state: &CalcState) {
        // Only drop the legacy record once the copy is safely written.
        if let Err(e) = self.write(to, state) {
            tracing::warn!(error = %e, "legacy migration copy failed; keeping legacy record");
            return;
        }
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        match db.delete_value(from) {
            Ok(_) => tracing::info!(from, to, "migrated legacy local record"),
            Err(e) => tracing::warn!(error = %format!("{e:#}"), "failed to delete legacy record"),
        }
    }

    #[cfg(test)]
    pub(crate) fn raw_value(&self, key: &str) -> Option<String> {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        db.get_value(key).unwrap()
    }

    #[cfg(test)]
    pub(crate) fn put_raw(&self, key: &str, value: &str) {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        db.put_value(key, value).unwrap();
    }
}
