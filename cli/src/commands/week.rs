use anyhow::{Result, bail};
use chrono::Days;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use tdee_core::store::CalcStore;

use super::flush;
use super::helpers::{day_labels, fmt_nonzero, fmt_opt, fmt_signed, print_json, week_start_date};

pub(crate) fn cmd_weeks(store: &CalcStore, json: bool) -> Result<()> {
    let snapshot = store.snapshot();
    let metrics = store.metrics();

    if json {
        let tracked: Vec<_> = metrics.per_week.iter().filter(|m| m.week_number > 0).collect();
        return print_json(&tracked);
    }

    #[derive(Tabled)]
    struct WeekRow {
        #[tabled(rename = "Week")]
        week: u32,
        #[tabled(rename = "Starts")]
        starts: String,
        #[tabled(rename = "Avg weight")]
        weight: String,
        #[tabled(rename = "Change")]
        change: String,
        #[tabled(rename = "Avg kcal")]
        kcal: String,
        #[tabled(rename = "TDEE")]
        tdee: String,
        #[tabled(rename = "Target")]
        target: String,
        #[tabled(rename = "Locked")]
        locked: String,
    }

    let rows: Vec<WeekRow> = metrics
        .per_week
        .iter()
        .zip(&snapshot.weeks)
        .filter(|(m, _)| m.week_number > 0)
        .map(|(m, entry)| WeekRow {
            week: m.week_number,
            starts: week_start_date(&snapshot.profile, m.week_number)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            weight: fmt_nonzero(m.avg_weight, 1),
            change: if m.avg_weight > 0.0 {
                fmt_signed(m.weight_change, 2)
            } else {
                "-".to_string()
            },
            kcal: fmt_nonzero(m.avg_kcal, 0),
            tdee: if m.has_data() {
                format!("{:.0}", m.weekly_tdee)
            } else {
                "-".to_string()
            },
            target: fmt_nonzero(m.weekly_target, 0),
            locked: if entry.locked { "yes" } else { "" }.to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..7)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_week_show(store: &CalcStore, week: u32, json: bool) -> Result<()> {
    let snapshot = store.snapshot();
    let Some(entry) = snapshot.week(week) else {
        bail!("Week {week} does not exist");
    };

    if json {
        return print_json(entry);
    }

    #[derive(Tabled)]
    struct DayRow {
        #[tabled(rename = "Day")]
        day: String,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Weight")]
        weight: String,
        #[tabled(rename = "kcal")]
        kcal: String,
    }

    let labels = day_labels(snapshot.profile.calendar_week_starts_on_monday);
    let first_day = week_start_date(&snapshot.profile, week);
    let rows: Vec<DayRow> = entry
        .days
        .iter()
        .enumerate()
        .map(|(i, d)| DayRow {
            day: format!("{} {}", i + 1, labels[i]),
            date: first_day
                .and_then(|start| start.checked_add_days(Days::new(i as u64)))
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            weight: fmt_opt(d.kg, 1),
            kcal: fmt_opt(d.kcal, 0),
        })
        .collect();

    let lock_note = if entry.locked { " (locked)" } else { "" };
    println!("Week {week}{lock_note}, weights in {}", snapshot.profile.mass_unit());
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) async fn cmd_week_add(store: &CalcStore, json: bool) -> Result<()> {
    let week = store.add_new_week()?;
    flush(store).await;

    if json {
        print_json(&serde_json::json!({ "week": week }))
    } else {
        println!("Added week {week}");
        Ok(())
    }
}

pub(crate) async fn cmd_week_lock(store: &CalcStore, week: u32, json: bool) -> Result<()> {
    let locked = store.toggle_week_lock(week)?;
    flush(store).await;

    if json {
        print_json(&serde_json::json!({ "week": week, "locked": locked }))
    } else {
        let state = if locked { "Locked" } else { "Unlocked" };
        println!("{state} week {week}");
        Ok(())
    }
}
