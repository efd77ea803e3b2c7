use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use tdee_core::identity::{AuthProvider, validate_user_id};

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    uid: String,
}

/// File-backed sign-in state. No file means a guest session.
pub struct SessionAuth {
    path: PathBuf,
}

impl SessionAuth {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn login(&self, uid: &str) -> Result<()> {
        validate_user_id(uid)?;
        let json = serde_json::to_string(&SessionFile {
            uid: uid.to_string(),
        })?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write session file: {}", self.path.display()))?;
        tracing::info!(uid, "signed in");
        Ok(())
    }

    /// Returns false when no one was signed in.
    pub fn logout(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).context("Failed to remove session file"),
        }
    }
}

impl AuthProvider for SessionAuth {
    fn current_user_id(&self) -> Result<Option<String>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context("Failed to read session file"),
        };
        let session: SessionFile =
            serde_json::from_str(&raw).context("Session file is corrupt")?;
        validate_user_id(&session.uid)?;
        Ok(Some(session.uid))
    }
}
