use anyhow::{Result, bail};

use tdee_core::models::{DayField, validate_non_negative};
use tdee_core::store::CalcStore;

use super::flush;
use super::helpers::{day_labels, fmt_opt, parse_day, print_json};

fn print_day(store: &CalcStore, week: u32, day: usize, verb: &str, json: bool) -> Result<()> {
    let snapshot = store.snapshot();
    let entry = snapshot.weeks[week as usize].days[day];

    if json {
        return print_json(&serde_json::json!({
            "week": week,
            "day": day + 1,
            "weight": entry.kg,
            "kcal": entry.kcal,
        }));
    }

    let label = day_labels(snapshot.profile.calendar_week_starts_on_monday)[day];
    let unit = snapshot.profile.mass_unit();
    println!(
        "{verb} week {week} {label}: {} {unit}, {} kcal",
        fmt_opt(entry.kg, 1),
        fmt_opt(entry.kcal, 0)
    );
    Ok(())
}

pub(crate) async fn cmd_log(
    store: &CalcStore,
    week: u32,
    day: &str,
    weight: Option<f64>,
    kcal: Option<f64>,
    json: bool,
) -> Result<()> {
    if weight.is_none() && kcal.is_none() {
        bail!("Nothing to log. Pass --weight and/or --kcal");
    }
    // Validate both up front so a bad value never leaves half a day written
    if let Some(w) = weight {
        validate_non_negative("Weight", w)?;
    }
    if let Some(k) = kcal {
        validate_non_negative("Calories", k)?;
    }

    let day = parse_day(day, store.snapshot().profile.calendar_week_starts_on_monday)?;
    if let Some(w) = weight {
        store.update_day(week, day, DayField::Kg, Some(w))?;
    }
    if let Some(k) = kcal {
        store.update_day(week, day, DayField::Kcal, Some(k))?;
    }
    flush(store).await;

    print_day(store, week, day, "Logged", json)
}

pub(crate) async fn cmd_clear(
    store: &CalcStore,
    week: u32,
    day: &str,
    weight: bool,
    kcal: bool,
    json: bool,
) -> Result<()> {
    let day = parse_day(day, store.snapshot().profile.calendar_week_starts_on_monday)?;
    let (weight, kcal) = if weight || kcal {
        (weight, kcal)
    } else {
        (true, true)
    };

    if weight {
        store.clear_day(week, day, DayField::Kg)?;
    }
    if kcal {
        store.clear_day(week, day, DayField::Kcal)?;
    }
    flush(store).await;

    print_day(store, week, day, "Cleared", json)
}
