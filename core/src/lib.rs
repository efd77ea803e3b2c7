pub mod calc;
pub mod db;
pub mod error;
pub mod identity;
pub mod models;
pub mod storage;
pub mod store;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use calc::{DerivedMetrics, DerivedWeekMetric, compute};
pub use error::{StoreError, SyncError};
pub use identity::{AuthProvider, GuestAuth, IdentityResolver, StorageKeys, validate_user_id};
pub use models::{CalcState, DayEntry, DayField, Profile, StateDocument, WeekEntry};
pub use storage::LocalStore;
pub use store::CalcStore;
pub use sync::{Notifier, RemoteStore, SyncConfig, SyncCoordinator, SyncStatus};
