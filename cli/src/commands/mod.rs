mod helpers;
mod log;
mod profile;
mod status;
mod sync;
mod week;

use tdee_core::store::CalcStore;

pub(crate) use log::{cmd_clear, cmd_log};
pub(crate) use profile::{
    cmd_profile_avg_window, cmd_profile_daily_change, cmd_profile_goal_weight, cmd_profile_lock,
    cmd_profile_show, cmd_profile_start_date, cmd_profile_start_weight, cmd_profile_units,
    cmd_profile_week_start, cmd_profile_weekly_change,
};
pub(crate) use status::cmd_status;
pub(crate) use sync::{cmd_login, cmd_logout, cmd_pull, cmd_push};
pub(crate) use week::{cmd_week_add, cmd_week_lock, cmd_week_show, cmd_weeks};

/// Push whatever the command changed before the process exits. A failed
/// upload has already been reported by the notifier and the change is safe
/// on disk, so it does not fail the command.
pub(super) async fn flush(store: &CalcStore) {
    if let Err(e) = store.flush().await {
        tracing::debug!(error = %e, "remote sync did not complete");
    }
}
