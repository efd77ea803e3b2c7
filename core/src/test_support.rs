//! Shared fakes for the sync and store tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;

use crate::db::Database;
use crate::identity::{AuthProvider, IdentityResolver, StorageKeys};
use crate::storage::LocalStore;
use crate::sync::{Notifier, RemoteStore};
use crate::models::StateDocument;

/// Auth provider whose user can be switched mid-test.
#[derive(Default)]
pub struct SwitchableAuth {
    uid: Mutex<Option<String>>,
}

impl SwitchableAuth {
    pub fn signed_in(uid: &str) -> Arc<Self> {
        let auth = Arc::new(Self::default());
        auth.set(Some(uid));
        auth
    }

    pub fn guest() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, uid: Option<&str>) {
        *self.uid.lock().unwrap() = uid.map(str::to_string);
    }
}

impl AuthProvider for SwitchableAuth {
    fn current_user_id(&self) -> Result<Option<String>> {
        Ok(self.uid.lock().unwrap().clone())
    }
}

#[derive(Debug, Clone)]
pub struct UploadCall {
    pub uid: String,
    pub doc: StateDocument,
    pub at: Instant,
}

/// In-memory remote store with scriptable failures and latency.
#[derive(Default)]
pub struct MockRemote {
    pub uploads: Mutex<Vec<UploadCall>>,
    pub docs: Mutex<HashMap<String, StateDocument>>,
    /// Number of upcoming uploads that fail; `u32::MAX` fails forever.
    pub failures_left: Mutex<u32>,
    pub fail_fetch: Mutex<bool>,
    pub latency: Mutex<Duration>,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(times: u32) -> Arc<Self> {
        let remote = Self::default();
        *remote.failures_left.lock().unwrap() = times;
        Arc::new(remote)
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        let remote = Self::default();
        *remote.latency.lock().unwrap() = latency;
        Arc::new(remote)
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn upload_calls(&self) -> Vec<UploadCall> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn fetch(&self, uid: &str) -> Result<Option<StateDocument>> {
        if *self.fail_fetch.lock().unwrap() {
            anyhow::bail!("remote unavailable");
        }
        Ok(self.docs.lock().unwrap().get(uid).cloned())
    }

    async fn upload(&self, uid: &str, doc: &StateDocument) -> Result<()> {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.uploads.lock().unwrap().push(UploadCall {
            uid: uid.to_string(),
            doc: doc.clone(),
            at: Instant::now(),
        });
        {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                if *left != u32::MAX {
                    *left -= 1;
                }
                anyhow::bail!("503 service unavailable");
            }
        }
        self.docs
            .lock()
            .unwrap()
            .insert(uid.to_string(), doc.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub successes: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn success_count(&self) -> usize {
        self.successes.lock().unwrap().len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_success(&self, message: &str) {
        self.successes.lock().unwrap().push(message.to_string());
    }

    fn notify_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

pub fn local_store(auth: Arc<SwitchableAuth>) -> Arc<LocalStore> {
    let identity = IdentityResolver::new(auth, StorageKeys::default());
    Arc::new(LocalStore::new(Database::open_in_memory().unwrap(), identity))
}
