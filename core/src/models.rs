use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

pub const DAYS_PER_WEEK: usize = 7;

/// Daily energy per unit of weekly mass change (7700 kcal/kg spread over 7 days).
pub const KCAL_PER_KG_WEEKLY: f64 = 1100.0;
pub const KCAL_PER_LB_WEEKLY: f64 = 500.0;

/// Starting TDEE estimate per unit of body mass.
pub const TDEE_MULTIPLIER_KG: f64 = 33.0;
pub const TDEE_MULTIPLIER_LB: f64 = 15.0;

pub const LBS_PER_KG: f64 = 2.20462;
pub const KG_PER_LB: f64 = 0.453_592;

pub const DEFAULT_WEEKS_FOR_AVG: u32 = 3;

/// Current version of the persisted document shape.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DayEntry {
    pub kg: Option<f64>,
    pub kcal: Option<f64>,
}

impl DayEntry {
    #[must_use]
    pub fn get(&self, field: DayField) -> Option<f64> {
        match field {
            DayField::Kg => self.kg,
            DayField::Kcal => self.kcal,
        }
    }

    pub fn set(&mut self, field: DayField, value: Option<f64>) {
        match field {
            DayField::Kg => self.kg = value,
            DayField::Kcal => self.kcal = value,
        }
    }
}

/// Which half of a [`DayEntry`] a write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayField {
    Kg,
    Kcal,
}

impl std::fmt::Display for DayField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DayField::Kg => write!(f, "kg"),
            DayField::Kcal => write!(f, "kcal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekEntry {
    pub week: u32,
    pub days: [DayEntry; DAYS_PER_WEEK],
    pub locked: bool,
}

impl WeekEntry {
    #[must_use]
    pub fn empty(week: u32) -> Self {
        Self {
            week,
            days: [DayEntry::default(); DAYS_PER_WEEK],
            locked: false,
        }
    }

    #[must_use]
    pub fn has_any_data(&self) -> bool {
        self.days
            .iter()
            .any(|d| d.kg.is_some_and(|v| v > 0.0) || d.kcal.is_some_and(|v| v > 0.0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub start_date: Option<NaiveDate>,
    pub start_weight: f64,
    pub goal_weight: f64,
    pub weekly_change_target: f64,
    pub daily_kcal_change: f64,
    pub weeks_for_avg: u32,
    pub is_metric_system: bool,
    pub initial_inputs_locked: bool,
    pub calendar_week_starts_on_monday: bool,
    pub is_weight_loss: Option<bool>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            start_date: None,
            start_weight: 0.0,
            goal_weight: 0.0,
            weekly_change_target: 0.0,
            daily_kcal_change: 0.0,
            weeks_for_avg: DEFAULT_WEEKS_FOR_AVG,
            is_metric_system: true,
            initial_inputs_locked: false,
            calendar_week_starts_on_monday: true,
            is_weight_loss: None,
        }
    }
}

impl Profile {
    /// Recompute `is_weight_loss` from the start and goal weights.
    pub fn refresh_direction(&mut self) {
        self.is_weight_loss = if self.start_weight > 0.0 && self.goal_weight > 0.0 {
            Some(self.start_weight > self.goal_weight)
        } else {
            None
        };
    }

    #[must_use]
    pub fn kcal_per_unit_weekly(&self) -> f64 {
        kcal_per_unit_weekly(self.is_metric_system)
    }

    #[must_use]
    pub fn tdee_multiplier(&self) -> f64 {
        if self.is_metric_system {
            TDEE_MULTIPLIER_KG
        } else {
            TDEE_MULTIPLIER_LB
        }
    }

    #[must_use]
    pub fn mass_unit(&self) -> &'static str {
        if self.is_metric_system { "kg" } else { "lb" }
    }

    /// The first TDEE observation, derived from the starting weight alone.
    #[must_use]
    pub fn initial_tdee_estimate(&self) -> f64 {
        self.start_weight * self.tdee_multiplier()
    }
}

/// The full mutable state owned by the calc store.
#[derive(Debug, Clone, PartialEq)]
pub struct CalcState {
    pub profile: Profile,
    pub weeks: Vec<WeekEntry>,
}

impl Default for CalcState {
    fn default() -> Self {
        Self {
            profile: Profile::default(),
            weeks: vec![WeekEntry::empty(0), WeekEntry::empty(1)],
        }
    }
}

impl CalcState {
    #[must_use]
    pub fn week(&self, week: u32) -> Option<&WeekEntry> {
        self.weeks.get(week as usize)
    }
}

#[must_use]
pub fn kcal_per_unit_weekly(is_metric_system: bool) -> f64 {
    if is_metric_system {
        KCAL_PER_KG_WEEKLY
    } else {
        KCAL_PER_LB_WEEKLY
    }
}

/// Round up to a whole kcal, ignoring floating noise below a millionth
/// (`0.3 * 1100` is 330, not 331).
#[must_use]
pub fn ceil_kcal(value: f64) -> f64 {
    ((value * 1e6).round() / 1e6).ceil()
}

#[must_use]
pub fn daily_kcal_for_weekly_change(weekly_change: f64, is_metric_system: bool) -> f64 {
    ceil_kcal(weekly_change.abs() * kcal_per_unit_weekly(is_metric_system))
}

#[must_use]
pub fn weekly_change_for_daily_kcal(daily_kcal: f64, is_metric_system: bool) -> f64 {
    daily_kcal.abs() / kcal_per_unit_weekly(is_metric_system)
}

/// Convert a mass between unit systems. `to_metric` selects lb→kg.
#[must_use]
pub fn convert_mass(value: f64, to_metric: bool) -> f64 {
    if to_metric {
        value * KG_PER_LB
    } else {
        value * LBS_PER_KG
    }
}

pub fn validate_non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        bail!("{name} must be a finite number");
    }
    if value < 0.0 {
        bail!("{name} must not be negative");
    }
    Ok(())
}

// --- Persisted document ---

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn default_schema_version() -> u32 {
    1
}

/// Wire and storage shape of a [`CalcState`]: profile fields flattened
/// alongside `weekData`. Used for the local record and the remote document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct StateDocument {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(deserialize_with = "empty_string_as_none")]
    pub start_date: Option<NaiveDate>,
    pub start_weight: f64,
    pub goal_weight: f64,
    pub weekly_change_target: f64,
    pub daily_kcal_change: f64,
    pub weeks_for_avg: u32,
    pub is_metric_system: bool,
    pub initial_inputs_locked: bool,
    pub calendar_week_starts_on_monday: bool,
    pub is_weight_loss: Option<bool>,
    pub week_data: Vec<WeekEntry>,
}

impl Default for StateDocument {
    fn default() -> Self {
        Self::from(&CalcState::default())
    }
}

impl From<&CalcState> for StateDocument {
    fn from(state: &CalcState) -> Self {
        let p = &state.profile;
        Self {
            schema_version: SCHEMA_VERSION,
            start_date: p.start_date,
            start_weight: p.start_weight,
            goal_weight: p.goal_weight,
            weekly_change_target: p.weekly_change_target,
            daily_kcal_change: p.daily_kcal_change,
            weeks_for_avg: p.weeks_for_avg,
            is_metric_system: p.is_metric_system,
            initial_inputs_locked: p.initial_inputs_locked,
            calendar_week_starts_on_monday: p.calendar_week_starts_on_monday,
            is_weight_loss: p.is_weight_loss,
            week_data: state.weeks.clone(),
        }
    }
}

impl StateDocument {
    /// Validate every field and build the state it describes.
    ///
    /// `isWeightLoss` is recomputed rather than trusted.
    pub fn into_state(self) -> Result<CalcState> {
        validate_document(&self)?;
        let mut profile = Profile {
            start_date: self.start_date,
            start_weight: self.start_weight,
            goal_weight: self.goal_weight,
            weekly_change_target: self.weekly_change_target,
            daily_kcal_change: self.daily_kcal_change,
            weeks_for_avg: self.weeks_for_avg,
            is_metric_system: self.is_metric_system,
            initial_inputs_locked: self.initial_inputs_locked,
            calendar_week_starts_on_monday: self.calendar_week_starts_on_monday,
            is_weight_loss: None,
        };
        profile.refresh_direction();
        Ok(CalcState {
            profile,
            weeks: self.week_data,
        })
    }
}

/// Validate a document: supported schema, sane scalars, contiguous weeks.
pub fn validate_document(doc: &StateDocument) -> Result<()> {
    if doc.schema_version == 0 || doc.schema_version > SCHEMA_VERSION {
        bail!(
            "Unsupported schemaVersion {} (expected 1..={SCHEMA_VERSION})",
            doc.schema_version
        );
    }
    validate_non_negative("startWeight", doc.start_weight)?;
    validate_non_negative("goalWeight", doc.goal_weight)?;
    validate_non_negative("weeklyChangeTarget", doc.weekly_change_target)?;
    validate_non_negative("dailyKcalChange", doc.daily_kcal_change)?;
    if doc.weeks_for_avg == 0 {
        bail!("weeksForAvg must be at least 1");
    }
    if doc.week_data.is_empty() {
        bail!("weekData must contain at least the baseline week");
    }
    for (idx, week) in doc.week_data.iter().enumerate() {
        if week.week as usize != idx {
            bail!(
                "weekData must be contiguous from 0 (found week {} at position {idx})",
                week.week
            );
        }
        for (day, entry) in week.days.iter().enumerate() {
            if let Some(kg) = entry.kg {
                validate_non_negative(&format!("week {idx} day {day} kg"), kg)?;
            }
            if let Some(kcal) = entry.kcal {
                validate_non_negative(&format!("week {idx} day {day} kcal"), kcal)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> CalcState {
        let mut state = CalcState::default();
        state.profile.start_date = NaiveDate::from_ymd_opt(2024, 6, 3);
        state.profile.start_weight = 80.0;
        state.profile.goal_weight = 70.0;
        state.profile.weekly_change_target = 0.5;
        state.profile.daily_kcal_change = 550.0;
        state.profile.refresh_direction();
        state.weeks[1].days[0] = DayEntry {
            kg: Some(79.6),
            kcal: Some(2100.0),
        };
        state.weeks[1].days[3].kcal = Some(1900.0);
        state
    }

    #[test]
    fn test_default_state_has_baseline_and_first_week() {
        let state = CalcState::default();
        assert_eq!(state.weeks.len(), 2);
        assert_eq!(state.weeks[0].week, 0);
        assert_eq!(state.weeks[1].week, 1);
        assert!(state.weeks.iter().all(|w| !w.locked));
        assert_eq!(state.profile.weeks_for_avg, DEFAULT_WEEKS_FOR_AVG);
        assert!(state.profile.is_weight_loss.is_none());
    }

    #[test]
    fn test_direction_requires_both_weights() {
        let mut profile = Profile {
            start_weight: 80.0,
            ..Profile::default()
        };
        profile.refresh_direction();
        assert!(profile.is_weight_loss.is_none());

        profile.goal_weight = 70.0;
        profile.refresh_direction();
        assert_eq!(profile.is_weight_loss, Some(true));

        profile.goal_weight = 90.0;
        profile.refresh_direction();
        assert_eq!(profile.is_weight_loss, Some(false));
    }

    #[test]
    fn test_initial_tdee_estimate_by_unit() {
        let mut profile = Profile {
            start_weight: 80.0,
            ..Profile::default()
        };
        assert!((profile.initial_tdee_estimate() - 2640.0).abs() < f64::EPSILON);

        profile.is_metric_system = false;
        profile.start_weight = 176.0;
        assert!((profile.initial_tdee_estimate() - 2640.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_weekly_daily_conversion() {
        assert!((daily_kcal_for_weekly_change(0.5, true) - 550.0).abs() < f64::EPSILON);
        assert!((weekly_change_for_daily_kcal(550.0, true) - 0.5).abs() < 1e-9);
        assert!((daily_kcal_for_weekly_change(1.0, false) - 500.0).abs() < f64::EPSILON);
        // Magnitude only
        assert!((daily_kcal_for_weekly_change(-0.5, true) - 550.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ceil_kcal_ignores_float_noise() {
        assert!((ceil_kcal(0.3 * 1100.0) - 330.0).abs() < f64::EPSILON);
        assert!((ceil_kcal(330.2) - 331.0).abs() < f64::EPSILON);
        assert!((ceil_kcal(2570.0) - 2570.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_convert_mass_reciprocal() {
        let lb = convert_mass(80.0, false);
        assert!((lb - 176.3696).abs() < 1e-4);
        let kg = convert_mass(lb, true);
        assert!((kg - 80.0).abs() < 1e-3);
    }

    #[test]
    fn test_document_uses_camel_case_and_week_data() {
        let doc = StateDocument::from(&sample_state());
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["schemaVersion"], 1);
        assert_eq!(json["startWeight"], 80.0);
        assert_eq!(json["startDate"], "2024-06-03");
        assert_eq!(json["isWeightLoss"], true);
        assert_eq!(json["weekData"][1]["days"][0]["kg"], 79.6);
        assert!(json["weekData"][1]["days"][1]["kg"].is_null());
        assert_eq!(json["weekData"][1]["days"].as_array().unwrap().len(), 7);
    }

    #[test]
    fn test_document_into_state_preserves_everything() {
        let state = sample_state();
        let json = serde_json::to_string(&StateDocument::from(&state)).unwrap();
        let doc: StateDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(doc.into_state().unwrap(), state);
    }

    #[test]
    fn test_document_rejects_unknown_fields() {
        let mut json = serde_json::to_value(StateDocument::from(&sample_state())).unwrap();
        json["isAdmin"] = serde_json::json!(true);
        assert!(serde_json::from_value::<StateDocument>(json).is_err());
    }

    #[test]
    fn test_document_rejects_wrong_day_count() {
        let mut json = serde_json::to_value(StateDocument::from(&sample_state())).unwrap();
        json["weekData"][1]["days"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!({ "kg": null, "kcal": null }));
        assert!(serde_json::from_value::<StateDocument>(json).is_err());
    }

    #[test]
    fn test_document_empty_start_date_is_unset() {
        let json = serde_json::json!({
            "startDate": "",
            "startWeight": 80.0,
            "weekData": [
                { "week": 0, "days": [{}, {}, {}, {}, {}, {}, {}], "locked": false }
            ]
        });
        let doc: StateDocument = serde_json::from_value(json).unwrap();
        assert_eq!(doc.schema_version, 1);
        let state = doc.into_state().unwrap();
        assert!(state.profile.start_date.is_none());
        assert!((state.profile.start_weight - 80.0).abs() < f64::EPSILON);
        assert_eq!(state.profile.weeks_for_avg, DEFAULT_WEEKS_FOR_AVG);
    }

    #[test]
    fn test_document_recomputes_direction() {
        let mut doc = StateDocument::from(&sample_state());
        doc.is_weight_loss = Some(false);
        let state = doc.into_state().unwrap();
        assert_eq!(state.profile.is_weight_loss, Some(true));
    }

    #[test]
    fn test_validate_document_non_contiguous_weeks() {
        let mut doc = StateDocument::from(&sample_state());
        doc.week_data[1].week = 5;
        assert!(validate_document(&doc).is_err());
    }

    #[test]
    fn test_validate_document_negative_values() {
        let mut doc = StateDocument::from(&sample_state());
        doc.goal_weight = -1.0;
        assert!(validate_document(&doc).is_err());

        let mut doc = StateDocument::from(&sample_state());
        doc.week_data[1].days[2].kcal = Some(-20.0);
        assert!(validate_document(&doc).is_err());
    }

    #[test]
    fn test_validate_document_schema_and_window() {
        let mut doc = StateDocument::from(&sample_state());
        doc.schema_version = SCHEMA_VERSION + 1;
        assert!(validate_document(&doc).is_err());

        let mut doc = StateDocument::from(&sample_state());
        doc.weeks_for_avg = 0;
        assert!(validate_document(&doc).is_err());

        let mut doc = StateDocument::from(&sample_state());
        doc.week_data.clear();
        assert!(validate_document(&doc).is_err());
    }

    #[test]
    fn test_validate_non_negative() {
        assert!(validate_non_negative("w", 0.0).is_ok());
        assert!(validate_non_negative("w", 12.5).is_ok());
        assert!(validate_non_negative("w", -0.1).is_err());
        assert!(validate_non_negative("w", f64::NAN).is_err());
        assert!(validate_non_negative("w", f64::INFINITY).is_err());
    }

    #[test]
    fn test_week_has_any_data() {
        let mut week = WeekEntry::empty(3);
        assert!(!week.has_any_data());
        week.days[2].kcal = Some(0.0);
        assert!(!week.has_any_data());
        week.days[2].kg = Some(81.0);
        assert!(week.has_any_data());
    }
}
