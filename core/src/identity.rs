use std::sync::Arc;

use anyhow::{Result, bail};

/// Source of the current session's user id.
///
/// `Ok(None)` is a guest session. Implementations may fail; the resolver
/// treats any failure as a guest.
pub trait AuthProvider: Send + Sync {
    fn current_user_id(&self) -> Result<Option<String>>;
}

/// Storage key layout for local records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub prefix: String,
    pub guest_key: String,
    /// Pre-identity key that older installs wrote to; migrated on first load.
    pub legacy_key: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            prefix: "tdee-calc".to_string(),
            guest_key: "tdee-calc-guest".to_string(),
            legacy_key: "tdee-calc-state".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct IdentityResolver {
    auth: Arc<dyn AuthProvider>,
    keys: StorageKeys,
}

impl IdentityResolver {
    pub fn new(auth: Arc<dyn AuthProvider>, keys: StorageKeys) -> Self {
        Self { auth, keys }
    }

    #[must_use]
    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    /// The authenticated user, or `None` for guests and failed lookups.
    #[must_use]
    pub fn current_user(&self) -> Option<String> {
        match self.auth.current_user_id() {
            Ok(Some(uid)) if !uid.trim().is_empty() => Some(uid),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "identity lookup failed, using guest session");
                None
            }
        }
    }

    /// `"<prefix>-<uid>"` for an authenticated user, the guest key otherwise.
    #[must_use]
    pub fn resolve_storage_key(&self) -> String {
        self.storage_key_for(self.current_user().as_deref())
    }

    #[must_use]
    pub fn storage_key_for(&self, uid: Option<&str>) -> String {
        match uid {
            Some(uid) => format!("{}-{uid}", self.keys.prefix),
            None => self.keys.guest_key.clone(),
        }
    }
}

pub const MAX_USER_ID_LEN: usize = 128;

/// Ids whose record key would land on the guest or legacy key.
const RESERVED_USER_IDS: [&str; 2] = ["guest", "state"];

/// User ids end up in storage keys and URL paths, so keep them to a safe
/// alphabet.
pub fn validate_user_id(uid: &str) -> Result<()> {
    if uid.is_empty() {
        bail!("User id must not be empty");
    }
    if uid.len() > MAX_USER_ID_LEN {
        bail!("User id must be at most {MAX_USER_ID_LEN} characters");
    }
    if RESERVED_USER_IDS.contains(&uid.to_ascii_lowercase().as_str()) {
        bail!("User id '{uid}' is reserved");
    }
    if uid.starts_with('.') {
        bail!("User id must not start with '.'");
    }
    if let Some(c) = uid
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@')))
    {
        bail!("User id contains invalid character '{c}'");
    }
    Ok(())
}

/// Auth provider for sessions that never sign in.
pub struct GuestAuth;

impl AuthProvider for GuestAuth {
    fn current_user_id(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedAuth(Option<&'static str>);

    impl AuthProvider for FixedAuth {
        fn current_user_id(&self) -> Result<Option<String>> {
            Ok(self.0.map(str::to_string))
        }
    }

    struct BrokenAuth;

    impl AuthProvider for BrokenAuth {
        fn current_user_id(&self) -> Result<Option<String>> {
            anyhow::bail!("token expired")
        }
    }

    fn resolver(auth: impl AuthProvider + 'static) -> IdentityResolver {
        IdentityResolver::new(Arc::new(auth), StorageKeys::default())
    }

    #[test]
    fn test_authenticated_user_key() {
        let r = resolver(FixedAuth(Some("abc123")));
        assert_eq!(r.current_user().as_deref(), Some("abc123"));
        assert_eq!(r.resolve_storage_key(), "tdee-calc-abc123");
    }

    #[test]
    fn test_guest_key() {
        let r = resolver(FixedAuth(None));
        assert!(r.current_user().is_none());
        assert_eq!(r.resolve_storage_key(), "tdee-calc-guest");
        assert_eq!(resolver(GuestAuth).resolve_storage_key(), "tdee-calc-guest");
    }

    #[test]
    fn test_blank_uid_is_guest() {
        let r = resolver(FixedAuth(Some("  ")));
        assert!(r.current_user().is_none());
        assert_eq!(r.resolve_storage_key(), "tdee-calc-guest");
    }

    #[test]
    fn test_lookup_failure_degrades_to_guest() {
        let r = resolver(BrokenAuth);
        assert!(r.current_user().is_none());
        assert_eq!(r.resolve_storage_key(), "tdee-calc-guest");
    }

    #[test]
    fn test_validate_user_id() {
        assert!(validate_user_id("alice@example.com").is_ok());
        assert!(validate_user_id("u_1-2.3").is_ok());
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("../etc").is_err());
        assert!(validate_user_id("..").is_err());
        assert!(validate_user_id("a b").is_err());
        assert!(validate_user_id("guest").is_err());
        assert!(validate_user_id("State").is_err());
        assert!(validate_user_id(&"x".repeat(MAX_USER_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_custom_prefix() {
        let keys = StorageKeys {
            prefix: "scale".to_string(),
            guest_key: "scale-guest".to_string(),
            legacy_key: "scale-legacy".to_string(),
        };
        let r = IdentityResolver::new(Arc::new(FixedAuth(Some("u9"))), keys);
        assert_eq!(r.resolve_storage_key(), "scale-u9");
        assert_eq!(r.storage_key_for(None), "scale-guest");
    }
}
