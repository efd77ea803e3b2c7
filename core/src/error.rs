use thiserror::Error;

use crate::models::DayField;

/// Failures of the persistence and sync paths.
///
/// None of these abort anything: local failures are logged and the in-memory
/// state stays authoritative, remote failures become notifications.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Writing the local record failed (storage error, serialization error).
    #[error("local write failed for '{key}': {source:#}")]
    LocalWrite {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// The local record exists but could not be read or parsed.
    #[error("local record '{key}' is unreadable: {source:#}")]
    LocalRead {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Loading the remote document failed. Not retried automatically.
    #[error("failed to load remote data for '{uid}': {source:#}")]
    RemoteFetch {
        uid: String,
        #[source]
        source: anyhow::Error,
    },

    /// Uploading the remote document failed after every retry.
    #[error("failed to sync to remote after {attempts} attempts: {source:#}")]
    RemoteSync {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// A document was well-formed JSON but violated the schema.
    #[error("invalid document: {0:#}")]
    InvalidDocument(anyhow::Error),
}

/// Rejected store mutations. State is left untouched when one of these is
/// returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("week {0} does not exist")]
    UnknownWeek(u32),

    #[error("day index {0} is out of range (expected 0-6)")]
    DayOutOfRange(usize),

    #[error("week {0} is locked")]
    WeekLocked(u32),

    /// Week 0 is derived from the start weight and holds no daily logs.
    #[error("week 0 is the baseline week and cannot be logged")]
    BaselineWeek,

    #[error("initial inputs are locked")]
    InitialInputsLocked,

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl StoreError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_day_value(field: DayField, reason: impl Into<String>) -> Self {
        Self::invalid(field.to_string(), reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_error_messages_include_context() {
        let err = SyncError::RemoteSync {
            attempts: 4,
            source: anyhow::anyhow!("connection refused"),
        };
        let msg = err.to_string();
        assert!(msg.contains("4 attempts"));
        assert!(msg.contains("connection refused"));

        let err = SyncError::LocalRead {
            key: "tdee-calc-guest".to_string(),
            source: anyhow::anyhow!("expected value at line 1"),
        };
        assert!(err.to_string().contains("tdee-calc-guest"));
    }

    #[test]
    fn test_store_error_messages() {
        assert_eq!(StoreError::WeekLocked(3).to_string(), "week 3 is locked");
        assert_eq!(
            StoreError::BaselineWeek.to_string(),
            "week 0 is the baseline week and cannot be logged"
        );
        assert_eq!(
            StoreError::DayOutOfRange(9).to_string(),
            "day index 9 is out of range (expected 0-6)"
        );
        assert_eq!(
            StoreError::invalid_day_value(DayField::Kcal, "must not be negative").to_string(),
            "invalid value for kcal: must not be negative"
        );
    }
}
