use anyhow::Result;
use serde::Serialize;

use tdee_core::store::CalcStore;

use super::helpers::{fmt_signed, print_json};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    user: Option<String>,
    sync_status: String,
    unit: &'static str,
    start_weight: f64,
    goal_weight: f64,
    is_weight_loss: Option<bool>,
    daily_kcal_change: f64,
    weekly_change_target: f64,
    weeks_tracked: usize,
    initial_tdee: f64,
    current_tdee: f64,
    recommended_daily_intake: f64,
    weeks_to_goal: u32,
    current_avg_weight: f64,
    total_weight_change: f64,
    average_weekly_change: f64,
}

pub(crate) fn cmd_status(store: &CalcStore, json: bool) -> Result<()> {
    let snapshot = store.snapshot();
    let metrics = store.metrics();
    let p = &snapshot.profile;

    let report = StatusReport {
        user: store.sync().local().identity().current_user(),
        sync_status: store.sync_status().to_string(),
        unit: p.mass_unit(),
        start_weight: p.start_weight,
        goal_weight: p.goal_weight,
        is_weight_loss: p.is_weight_loss,
        daily_kcal_change: p.daily_kcal_change,
        weekly_change_target: p.weekly_change_target,
        weeks_tracked: snapshot.weeks.len().saturating_sub(1),
        initial_tdee: metrics.initial_tdee,
        current_tdee: metrics.current_tdee,
        recommended_daily_intake: metrics.recommended_daily_intake,
        weeks_to_goal: metrics.weeks_to_goal,
        current_avg_weight: metrics.current_avg_weight,
        total_weight_change: metrics.total_weight_change,
        average_weekly_change: metrics.average_weekly_change,
    };

    if json {
        return print_json(&report);
    }

    let unit = report.unit;
    let who = report.user.as_deref().unwrap_or("guest (local only)");
    println!("=== TDEE status ===\n");
    println!("  User:            {who}");
    println!("  Sync:            {}", report.sync_status);

    if p.start_weight <= 0.0 {
        println!();
        eprintln!("No start weight yet. Use `tdee profile start-weight <value>` to begin.");
        return Ok(());
    }

    let goal = match p.is_weight_loss {
        Some(true) => format!("lose to {:.1} {unit}", p.goal_weight),
        Some(false) => format!("gain to {:.1} {unit}", p.goal_weight),
        None => "maintain".to_string(),
    };
    println!("  Goal:            {goal}");
    println!(
        "  Pace:            {:.2} {unit}/week ({:.0} kcal/day)",
        p.weekly_change_target, p.daily_kcal_change
    );
    println!();
    println!(
        "  Weight:          {:.1} {unit} ({} {unit} total, {} {unit}/week)",
        report.current_avg_weight,
        fmt_signed(report.total_weight_change, 1),
        fmt_signed(report.average_weekly_change, 2)
    );
    println!("  Initial TDEE:    {:.0} kcal", report.initial_tdee);
    println!("  Current TDEE:    {:.0} kcal", report.current_tdee);
    println!(
        "  Eat per day:     {:.0} kcal",
        report.recommended_daily_intake
    );
    if report.weeks_to_goal > 0 {
        println!("  Weeks to goal:   {}", report.weeks_to_goal);
    }
    Ok(())
}
