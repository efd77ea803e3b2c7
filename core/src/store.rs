use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::NaiveDate;

use crate::calc::{self, DerivedMetrics};
use crate::error::{StoreError, SyncError};
use crate::models::{
    CalcState, DAYS_PER_WEEK, DayField, WeekEntry, convert_mass, daily_kcal_for_weekly_change,
    validate_non_negative, weekly_change_for_daily_kcal,
};
use crate::sync::{SyncCoordinator, SyncStatus};

struct Versioned {
    revision: u64,
    state: Arc<CalcState>,
}

/// Single source of truth for the profile and weekly logs.
///
/// Every mutation builds a new snapshot, hands it to the sync coordinator
/// (local write now, remote upload debounced) and then publishes it. A
/// rejected mutation leaves the state untouched and persists nothing.
pub struct CalcStore {
    current: RwLock<Versioned>,
    metrics: Mutex<Option<(u64, Arc<DerivedMetrics>)>>,
    sync: SyncCoordinator,
}

fn check_value(field: &str, value: f64) -> Result<(), StoreError> {
    validate_non_negative(field, value).map_err(|e| StoreError::invalid(field, e.to_string()))
}

fn check_day(state: &CalcState, week: u32, day: usize) -> Result<(), StoreError> {
    if day >= DAYS_PER_WEEK {
        return Err(StoreError::DayOutOfRange(day));
    }
    if week == 0 {
        return Err(StoreError::BaselineWeek);
    }
    match state.week(week) {
        None => Err(StoreError::UnknownWeek(week)),
        Some(entry) if entry.locked => Err(StoreError::WeekLocked(week)),
        Some(_) => Ok(()),
    }
}

fn check_initial_inputs(state: &CalcState) -> Result<(), StoreError> {
    if state.profile.initial_inputs_locked {
        return Err(StoreError::InitialInputsLocked);
    }
    Ok(())
}

impl CalcStore {
    /// A store holding the default state. Nothing is read or written.
    pub fn new(sync: SyncCoordinator) -> Self {
        Self {
            current: RwLock::new(Versioned {
                revision: 0,
                state: Arc::new(CalcState::default()),
            }),
            metrics: Mutex::new(None),
            sync,
        }
    }

    /// A store primed from the local record of the current identity.
    pub fn open(sync: SyncCoordinator) -> Self {
        let store = Self::new(sync);
        store.load_local();
        store
    }

    #[must_use]
    pub fn sync(&self) -> &SyncCoordinator {
        &self.sync
    }

    #[must_use]
    pub fn sync_status(&self) -> SyncStatus {
        self.sync.status()
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<CalcState> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&current.state)
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .revision
    }

    /// Derived metrics for the current snapshot, computed once per revision.
    #[must_use]
    pub fn metrics(&self) -> Arc<DerivedMetrics> {
        let (revision, state) = {
            let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
            (current.revision, Arc::clone(&current.state))
        };
        let mut memo = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((rev, metrics)) = memo.as_ref() {
            if *rev == revision {
                return Arc::clone(metrics);
            }
        }
        let metrics = Arc::new(calc::compute(&state.profile, &state.weeks));
        *memo = Some((revision, Arc::clone(&metrics)));
        metrics
    }

    /// Run a transition against a copy of the current state. On success the
    /// copy is persisted and becomes the current snapshot.
    fn mutate<T>(
        &self,
        op: &'static str,
        transition: impl FnOnce(&mut CalcState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = CalcState::clone(&current.state);
        let out = transition(&mut next).inspect_err(|e| {
            tracing::debug!(op, error = %e, "mutation rejected");
        })?;

        let snapshot = Arc::new(next);
        self.sync.schedule(Arc::clone(&snapshot));
        current.state = snapshot;
        current.revision += 1;
        tracing::debug!(op, revision = current.revision, "state updated");
        Ok(out)
    }

    /// Swap in a state that came from storage. Nothing is persisted.
    fn replace(&self, state: CalcState) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        current.state = Arc::new(state);
        current.revision += 1;
    }

    // --- Weekly logs ---

    pub fn update_day(
        &self,
        week: u32,
        day: usize,
        field: DayField,
        value: Option<f64>,
    ) -> Result<(), StoreError> {
        if let Some(v) = value {
            validate_non_negative(&field.to_string(), v)
                .map_err(|e| StoreError::invalid_day_value(field, e.to_string()))?;
        }
        self.mutate("update_day", |state| {
            check_day(state, week, day)?;
            state.weeks[week as usize].days[day].set(field, value);
            Ok(())
        })
    }

    pub fn clear_day(&self, week: u32, day: usize, field: DayField) -> Result<(), StoreError> {
        self.update_day(week, day, field, None)
    }

    /// Append the next week and return its number.
    pub fn add_new_week(&self) -> Result<u32, StoreError> {
        self.mutate("add_new_week", |state| {
            let week = u32::try_from(state.weeks.len())
                .map_err(|_| StoreError::invalid("week", "too many weeks"))?;
            state.weeks.push(WeekEntry::empty(week));
            Ok(week)
        })
    }

    /// Flip the lock on an existing week and return the new lock state.
    pub fn toggle_week_lock(&self, week: u32) -> Result<bool, StoreError> {
        self.mutate("toggle_week_lock", |state| {
            let entry = state
                .weeks
                .get_mut(week as usize)
                .ok_or(StoreError::UnknownWeek(week))?;
            entry.locked = !entry.locked;
            Ok(entry.locked)
        })
    }

    // --- Profile ---

    pub fn set_start_weight(&self, weight: f64) -> Result<(), StoreError> {
        check_value("startWeight", weight)?;
        self.mutate("set_start_weight", |state| {
            check_initial_inputs(state)?;
            state.profile.start_weight = weight;
            state.profile.refresh_direction();
            if state.weeks.is_empty() {
                state.weeks.push(WeekEntry::empty(0));
            }
            Ok(())
        })
    }

    pub fn set_goal_weight(&self, weight: f64) -> Result<(), StoreError> {
        check_value("goalWeight", weight)?;
        self.mutate("set_goal_weight", |state| {
            state.profile.goal_weight = weight;
            state.profile.refresh_direction();
            Ok(())
        })
    }

    pub fn set_start_date(&self, date: Option<NaiveDate>) -> Result<(), StoreError> {
        self.mutate("set_start_date", |state| {
            check_initial_inputs(state)?;
            state.profile.start_date = date;
            Ok(())
        })
    }

    /// Set the weekly mass change; the daily calorie change follows.
    /// The sign is dropped, direction comes from start and goal weight.
    pub fn set_weekly_change(&self, change: f64) -> Result<(), StoreError> {
        check_value("weeklyChangeTarget", change.abs())?;
        self.mutate("set_weekly_change", |state| {
            let p = &mut state.profile;
            p.weekly_change_target = change.abs();
            p.daily_kcal_change = daily_kcal_for_weekly_change(change, p.is_metric_system);
            Ok(())
        })
    }

    /// Set the daily calorie change; the weekly mass change follows.
    pub fn set_daily_kcal_change(&self, kcal: f64) -> Result<(), StoreError> {
        check_value("dailyKcalChange", kcal.abs())?;
        self.mutate("set_daily_kcal_change", |state| {
            let p = &mut state.profile;
            p.daily_kcal_change = kcal.abs();
            p.weekly_change_target = weekly_change_for_daily_kcal(kcal, p.is_metric_system);
            Ok(())
        })
    }

    pub fn set_weeks_for_avg(&self, weeks: u32) -> Result<(), StoreError> {
        if weeks == 0 {
            return Err(StoreError::invalid("weeksForAvg", "must be at least 1"));
        }
        self.mutate("set_weeks_for_avg", |state| {
            state.profile.weeks_for_avg = weeks;
            Ok(())
        })
    }

    pub fn set_calendar_week_starts_on_monday(&self, monday: bool) -> Result<(), StoreError> {
        self.mutate("set_calendar_week_starts_on_monday", |state| {
            state.profile.calendar_week_starts_on_monday = monday;
            Ok(())
        })
    }

    /// Switch kg <-> lb. Profile masses and logged weights are converted and
    /// the daily calorie change is re-derived in the new unit.
    pub fn toggle_measurement_system(&self) -> Result<(), StoreError> {
        self.mutate("toggle_measurement_system", |state| {
            let to_metric = !state.profile.is_metric_system;
            let p = &mut state.profile;
            p.start_weight = convert_mass(p.start_weight, to_metric);
            p.goal_weight = convert_mass(p.goal_weight, to_metric);
            p.weekly_change_target = convert_mass(p.weekly_change_target, to_metric);
            p.is_metric_system = to_metric;
            p.daily_kcal_change = daily_kcal_for_weekly_change(p.weekly_change_target, to_metric);
            p.refresh_direction();
            for day in state.weeks.iter_mut().flat_map(|w| w.days.iter_mut()) {
                day.kg = day.kg.map(|kg| convert_mass(kg, to_metric));
            }
            Ok(())
        })
    }

    /// One-way latch on start weight and start date.
    pub fn lock_initial_inputs(&self) -> Result<(), StoreError> {
        self.mutate("lock_initial_inputs", |state| {
            state.profile.initial_inputs_locked = true;
            Ok(())
        })
    }

    // --- Loading ---

    /// Replace the state with the current identity's local record, if any.
    pub fn load_local(&self) -> bool {
        match self.sync.local().load() {
            Some(state) => {
                self.replace(state);
                true
            }
            None => false,
        }
    }

    /// Replace the state with `uid`'s remote document, if one exists. The
    /// document is written locally but not uploaded again.
    ///
    /// A pending upload is flushed first so the fetch sees it and no stale
    /// snapshot lands on the remote afterwards. If that upload fails the
    /// fetch is abandoned and local state is kept.
    pub async fn fetch_remote(&self, uid: &str) -> Result<bool, SyncError> {
        self.sync.flush().await?;
        let Some(state) = self.sync.fetch(uid).await? else {
            tracing::debug!(uid, "no remote document");
            return Ok(false);
        };
        self.sync.local().save_for(Some(uid), &state);
        self.replace(state);
        tracing::info!(uid, "loaded remote document");
        Ok(true)
    }

    /// React to a sign-in, sign-out or user switch: finish the previous
    /// user's pending upload, load the new identity's local record (defaults
    /// if none) and, when signed in, pull the remote document.
    pub async fn handle_auth_change(&self) -> Result<(), SyncError> {
        // The pending upload carries its own uid. A failure is already
        // notified and must not block the switch.
        if let Err(e) = self.sync.flush().await {
            tracing::warn!(error = %e, "previous user's upload failed during auth change");
        }
        let uid = self.sync.local().identity().current_user();
        let state = self.sync.local().load().unwrap_or_default();
        self.replace(state);
        match uid {
            Some(uid) => self.fetch_remote(&uid).await.map(|_| ()),
            None => Ok(()),
        }
    }

    /// Upload any pending change now and wait for in-flight uploads.
    pub async fn flush(&self) -> Result<bool, SyncError> {
        self.sync.flush().await
    }
}
