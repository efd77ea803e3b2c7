//! Weekly TDEE pipeline.
//!
//! Everything here is a pure function of a profile and its weekly logs. A
//! week's target is derived only from observations made before that week, so
//! editing a week never moves its own target.

use serde::Serialize;

use crate::models::{Profile, WeekEntry, ceil_kcal};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedWeekMetric {
    pub week_number: u32,
    pub avg_weight: f64,
    pub avg_kcal: f64,
    pub weight_change: f64,
    pub weekly_tdee: f64,
    pub weekly_target: f64,
}

impl DerivedWeekMetric {
    /// Both an average weight and an average intake are known.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.avg_weight > 0.0 && self.avg_kcal > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetrics {
    /// One entry per week, week 0 seeded from the profile.
    pub per_week: Vec<DerivedWeekMetric>,
    /// Accepted TDEE observations in week order, seed first.
    pub tdee_series: Vec<f64>,
    pub initial_tdee: f64,
    pub current_tdee: f64,
    pub recommended_daily_intake: f64,
    pub weeks_to_goal: u32,
    pub current_avg_weight: f64,
    pub total_weight_change: f64,
    pub average_weekly_change: f64,
}

impl DerivedMetrics {
    #[must_use]
    pub fn week(&self, week: u32) -> Option<&DerivedWeekMetric> {
        self.per_week.iter().find(|m| m.week_number == week)
    }
}

/// Mean of the populated (`> 0`) values, 0 when none are populated.
fn mean_populated(values: impl Iterator<Item = Option<f64>>) -> f64 {
    let (sum, count) = values
        .flatten()
        .filter(|v| *v > 0.0)
        .fold((0.0, 0u32), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { 0.0 } else { sum / f64::from(count) }
}

/// Mean of the last `window` values, 0 for an empty slice.
#[must_use]
pub fn moving_average(values: &[f64], window: u32) -> f64 {
    let window = (window.max(1) as usize).min(values.len());
    if window == 0 {
        return 0.0;
    }
    let tail = &values[values.len() - window..];
    tail.iter().sum::<f64>() / tail.len() as f64
}

/// Signed daily adjustment: a deficit when losing, a surplus when gaining,
/// nothing while the direction is unknown.
#[must_use]
pub fn daily_adjustment(profile: &Profile) -> f64 {
    let magnitude = profile.daily_kcal_change.abs();
    match profile.is_weight_loss {
        Some(true) => -magnitude,
        Some(false) => magnitude,
        None => 0.0,
    }
}

fn intake_for(tdee: f64, adjustment: f64) -> f64 {
    if tdee <= 0.0 {
        return 0.0;
    }
    ceil_kcal(tdee + adjustment).max(0.0)
}

#[must_use]
pub fn compute(profile: &Profile, weeks: &[WeekEntry]) -> DerivedMetrics {
    let k = profile.kcal_per_unit_weekly();
    let window = profile.weeks_for_avg;
    let adjustment = daily_adjustment(profile);
    let initial_tdee = profile.initial_tdee_estimate();

    let mut series = Vec::with_capacity(weeks.len());
    if initial_tdee > 0.0 {
        series.push(initial_tdee);
    }

    let mut per_week = Vec::with_capacity(weeks.len());
    let mut previous_weight = profile.start_weight;
    let mut last_week_contributed = false;
    let mut populated_changes = Vec::new();

    for (idx, entry) in weeks.iter().enumerate() {
        if entry.week == 0 {
            per_week.push(DerivedWeekMetric {
                week_number: 0,
                avg_weight: profile.start_weight,
                avg_kcal: initial_tdee,
                weight_change: 0.0,
                weekly_tdee: initial_tdee,
                weekly_target: 0.0,
            });
            continue;
        }

        let avg_weight = mean_populated(entry.days.iter().map(|d| d.kg));
        let avg_kcal = mean_populated(entry.days.iter().map(|d| d.kcal));
        let weight_change = if avg_weight > 0.0 {
            let change = avg_weight - previous_weight;
            previous_weight = avg_weight;
            populated_changes.push(change);
            change
        } else {
            0.0
        };

        // Target first: it may only see earlier observations.
        let weekly_target = intake_for(moving_average(&series, window), adjustment);

        let mut metric = DerivedWeekMetric {
            week_number: entry.week,
            avg_weight,
            avg_kcal,
            weight_change,
            weekly_tdee: 0.0,
            weekly_target,
        };
        let contributed = if metric.has_data() {
            metric.weekly_tdee = avg_kcal - weight_change * k;
            if metric.weekly_tdee > 0.0 {
                series.push(metric.weekly_tdee);
                true
            } else {
                false
            }
        } else {
            false
        };
        last_week_contributed = contributed && idx + 1 == weeks.len();
        per_week.push(metric);
    }

    // The week still being logged does not feed its own recommendation.
    let eligible = if last_week_contributed {
        &series[..series.len() - 1]
    } else {
        &series[..]
    };
    let current_tdee = moving_average(eligible, window);
    let recommended_daily_intake = intake_for(current_tdee, adjustment);

    let current_avg_weight = per_week
        .iter()
        .rev()
        .find(|m| m.week_number > 0 && m.avg_weight > 0.0)
        .map_or(profile.start_weight, |m| m.avg_weight);
    let total_weight_change = if populated_changes.is_empty() {
        0.0
    } else {
        current_avg_weight - profile.start_weight
    };
    let average_weekly_change = if populated_changes.is_empty() {
        0.0
    } else {
        populated_changes.iter().sum::<f64>() / populated_changes.len() as f64
    };

    DerivedMetrics {
        per_week,
        tdee_series: series,
        initial_tdee,
        current_tdee,
        recommended_daily_intake,
        weeks_to_goal: weeks_to_goal(profile, current_avg_weight),
        current_avg_weight,
        total_weight_change,
        average_weekly_change,
    }
}

#[allow(clippy::cast_sign_loss)]
fn weeks_to_goal(profile: &Profile, current_avg_weight: f64) -> u32 {
    if profile.goal_weight <= 0.0 || profile.weekly_change_target <= 0.0 {
        return 0;
    }
    let remaining = (current_avg_weight - profile.goal_weight).abs();
    ceil_kcal(remaining / profile.weekly_change_target) as u32
}
