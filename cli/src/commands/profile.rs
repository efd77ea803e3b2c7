use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};

use tdee_core::store::CalcStore;

use super::flush;
use super::helpers::{fmt_signed, print_json};

pub(crate) fn cmd_profile_show(store: &CalcStore, json: bool) -> Result<()> {
    let snapshot = store.snapshot();
    let p = &snapshot.profile;

    if json {
        return print_json(p);
    }

    let unit = p.mass_unit();
    let start_date = p
        .start_date
        .map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d").to_string());
    let direction = match p.is_weight_loss {
        Some(true) => "lose",
        Some(false) => "gain",
        None => "-",
    };
    let locked = if p.initial_inputs_locked { " (locked)" } else { "" };

    println!("=== Profile ===\n");
    println!("  Start date:      {start_date}{locked}");
    println!("  Start weight:    {:.1} {unit}{locked}", p.start_weight);
    println!("  Goal weight:     {:.1} {unit}", p.goal_weight);
    println!("  Direction:       {direction}");
    println!("  Weekly change:   {:.2} {unit}", p.weekly_change_target);
    println!("  Daily change:    {:.0} kcal", p.daily_kcal_change);
    println!("  Avg window:      {} weeks", p.weeks_for_avg);
    println!(
        "  Week starts on:  {}",
        if p.calendar_week_starts_on_monday { "Monday" } else { "Sunday" }
    );
    println!("  Units:           {unit}");
    Ok(())
}

fn report(store: &CalcStore, message: &str, json: bool) -> Result<()> {
    if json {
        return print_json(&store.snapshot().profile);
    }
    println!("{message}");
    Ok(())
}

pub(crate) async fn cmd_profile_start_weight(store: &CalcStore, weight: f64, json: bool) -> Result<()> {
    store.set_start_weight(weight)?;
    flush(store).await;
    let unit = store.snapshot().profile.mass_unit();
    report(store, &format!("Start weight set to {weight:.1} {unit}"), json)
}

pub(crate) async fn cmd_profile_goal_weight(store: &CalcStore, weight: f64, json: bool) -> Result<()> {
    store.set_goal_weight(weight)?;
    flush(store).await;
    let unit = store.snapshot().profile.mass_unit();
    report(store, &format!("Goal weight set to {weight:.1} {unit}"), json)
}

pub(crate) async fn cmd_profile_weekly_change(store: &CalcStore, change: f64, json: bool) -> Result<()> {
    store.set_weekly_change(change)?;
    flush(store).await;
    let snapshot = store.snapshot();
    let p = &snapshot.profile;
    let message = format!(
        "Weekly change set to {:.2} {} ({:.0} kcal/day)",
        p.weekly_change_target,
        p.mass_unit(),
        p.daily_kcal_change
    );
    report(store, &message, json)
}

pub(crate) async fn cmd_profile_daily_change(store: &CalcStore, kcal: f64, json: bool) -> Result<()> {
    store.set_daily_kcal_change(kcal)?;
    flush(store).await;
    let snapshot = store.snapshot();
    let p = &snapshot.profile;
    let message = format!(
        "Daily change set to {:.0} kcal ({} {}/week)",
        p.daily_kcal_change,
        fmt_signed(p.weekly_change_target, 2),
        p.mass_unit()
    );
    report(store, &message, json)
}

/// `None` toggles; `kg` or `lb` switches only when the unit differs.
pub(crate) async fn cmd_profile_units(store: &CalcStore, unit: Option<&str>, json: bool) -> Result<()> {
    let is_metric = store.snapshot().profile.is_metric_system;
    let want_metric = match unit.map(str::to_lowercase).as_deref() {
        None => !is_metric,
        Some("kg" | "metric") => true,
        Some("lb" | "lbs" | "imperial") => false,
        Some(other) => bail!("Unknown unit '{other}'. Use kg or lb"),
    };
    if want_metric != is_metric {
        store.toggle_measurement_system()?;
        flush(store).await;
    }
    let unit = store.snapshot().profile.mass_unit();
    report(store, &format!("Units: {unit}"), json)
}

fn parse_start_date(s: &str) -> Result<Option<NaiveDate>> {
    match s.trim().to_lowercase().as_str() {
        "" | "none" => Ok(None),
        "today" => Ok(Some(Local::now().date_naive())),
        other => NaiveDate::parse_from_str(other, "%Y-%m-%d")
            .map(Some)
            .with_context(|| format!("Invalid date '{other}'. Use YYYY-MM-DD, 'today' or 'none'")),
    }
}

pub(crate) async fn cmd_profile_start_date(store: &CalcStore, date: &str, json: bool) -> Result<()> {
    let date = parse_start_date(date)?;
    store.set_start_date(date)?;
    flush(store).await;
    let message = match date {
        Some(d) => format!("Start date set to {}", d.format("%Y-%m-%d")),
        None => "Start date cleared".to_string(),
    };
    report(store, &message, json)
}

pub(crate) async fn cmd_profile_avg_window(store: &CalcStore, weeks: u32, json: bool) -> Result<()> {
    store.set_weeks_for_avg(weeks)?;
    flush(store).await;
    report(store, &format!("TDEE averaged over the last {weeks} weeks"), json)
}

pub(crate) async fn cmd_profile_week_start(store: &CalcStore, day: &str, json: bool) -> Result<()> {
    let monday = match day.trim().to_lowercase().as_str() {
        "mon" | "monday" => true,
        "sun" | "sunday" => false,
        other => bail!("Week can start on monday or sunday, got '{other}'"),
    };
    store.set_calendar_week_starts_on_monday(monday)?;
    flush(store).await;
    let name = if monday { "Monday" } else { "Sunday" };
    report(store, &format!("Weeks start on {name}"), json)
}

pub(crate) async fn cmd_profile_lock(store: &CalcStore, json: bool) -> Result<()> {
    if store.snapshot().profile.initial_inputs_locked {
        eprintln!("Initial inputs are already locked");
        return if json { print_json(&store.snapshot().profile) } else { Ok(()) };
    }
    store.lock_initial_inputs()?;
    flush(store).await;
    report(store, "Start weight and start date are now locked", json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_date() {
        assert_eq!(parse_start_date("none").unwrap(), None);
        assert_eq!(parse_start_date("").unwrap(), None);
        assert_eq!(
            parse_start_date("2025-01-06").unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 6)
        );
        assert!(parse_start_date("today").unwrap().is_some());
        assert!(parse_start_date("06/01/2025").is_err());
    }
}
