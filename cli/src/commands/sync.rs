use anyhow::{Context, Result};

use tdee_core::store::CalcStore;

use super::helpers::print_json;
use crate::session::SessionAuth;

fn signed_in_user(store: &CalcStore) -> Result<String> {
    store
        .sync()
        .local()
        .identity()
        .current_user()
        .context("Not signed in. Use `tdee login <user-id>` first")
}

fn print_outcome(store: &CalcStore, action: &str, message: &str, json: bool) -> Result<()> {
    if json {
        return print_json(&serde_json::json!({
            "action": action,
            "user": store.sync().local().identity().current_user(),
            "syncStatus": store.sync_status().to_string(),
            "weeks": store.snapshot().weeks.len().saturating_sub(1),
        }));
    }
    println!("{message}");
    Ok(())
}

/// Switching identity loads that user's local record, then pulls the remote
/// copy. A failed pull leaves the local record in place and is reported by
/// the notifier.
async fn reload(store: &CalcStore) {
    if let Err(e) = store.handle_auth_change().await {
        tracing::debug!(error = %e, "remote load after identity change failed");
    }
}

pub(crate) async fn cmd_login(
    session: &SessionAuth,
    store: &CalcStore,
    uid: &str,
    json: bool,
) -> Result<()> {
    session.login(uid)?;
    reload(store).await;
    print_outcome(store, "login", &format!("Signed in as {uid}"), json)
}

pub(crate) async fn cmd_logout(session: &SessionAuth, store: &CalcStore, json: bool) -> Result<()> {
    if !session.logout()? {
        eprintln!("Not signed in");
    }
    reload(store).await;
    print_outcome(store, "logout", "Signed out. Now using the guest session", json)
}

pub(crate) async fn cmd_pull(store: &CalcStore, json: bool) -> Result<()> {
    let uid = signed_in_user(store)?;
    let found = store.fetch_remote(&uid).await?;
    let message = if found {
        format!("Loaded remote data for {uid}")
    } else {
        format!("No remote data for {uid} yet. Local data kept")
    };
    print_outcome(store, "pull", &message, json)
}

pub(crate) async fn cmd_push(store: &CalcStore, json: bool) -> Result<()> {
    let uid = signed_in_user(store)?;
    store.sync().schedule(store.snapshot());
    store.flush().await?;
    print_outcome(store, "push", &format!("Uploaded data for {uid}"), json)
}
