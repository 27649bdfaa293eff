// libs/scheduling-cell/src/services/recommender.rs
use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};
use tracing::debug;

use crate::models::{
    weekday_index, Appointment, SchedulingError, ScoredSlot, SearchMetadata, ServiceTypeRules,
    SuggestSlotsRequest, SuggestionOutcome,
};
use crate::repositories::{BookingRepository, ScheduleRepository};
use crate::services::conflict::ConflictDetectionService;

const SLOT_GRID_MINUTES: i64 = 30;
const DEFAULT_WINDOW_DAYS: i64 = 7;
const MAX_WINDOW_DAYS: i64 = 30;
const DEFAULT_MAX_SUGGESTIONS: usize = 5;
const MAX_SUGGESTIONS_CAP: usize = 20;

const BASE_SCORE: f64 = 100.0;
const DISTANCE_PENALTY_PER_MINUTE: f64 = 0.1;
const SAME_DAY_BONUS: f64 = 20.0;
const NEXT_DAY_BONUS: f64 = 10.0;
const PREFERRED_TIME_BONUS: f64 = 15.0;
const PREFERRED_TIME_TOLERANCE_MINUTES: i64 = 30;
const MORNING_BONUS: f64 = 5.0;
const OFF_HOURS_PENALTY: f64 = 10.0;
const BUFFERED_SERVICE_BONUS: f64 = 3.0;

/// Scans the professional's calendar on a fixed 30-minute grid and scores
/// each free slot by closeness to the patient's preference. The scan is
/// bounded both by the day window and by a wall-clock budget so a loaded
/// calendar can never stall the request.
pub struct SlotRecommenderService {
    schedules: Arc<dyn ScheduleRepository>,
    bookings: Arc<dyn BookingRepository>,
    budget: StdDuration,
}

impl SlotRecommenderService {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        bookings: Arc<dyn BookingRepository>,
        budget_ms: u64,
    ) -> Self {
        Self {
            schedules,
            bookings,
            budget: StdDuration::from_millis(budget_ms),
        }
    }

    pub async fn suggest(
        &self,
        request: &SuggestSlotsRequest,
        auth_token: &str,
    ) -> Result<SuggestionOutcome, SchedulingError> {
        Self::guard_input(request)?;

        let window_days = request
            .window_days
            .unwrap_or(DEFAULT_WINDOW_DAYS)
            .clamp(1, MAX_WINDOW_DAYS);
        let max_suggestions = request
            .max_suggestions
            .unwrap_or(DEFAULT_MAX_SUGGESTIONS)
            .clamp(1, MAX_SUGGESTIONS_CAP);
        let duration = Duration::minutes(request.duration_minutes);
        let grid_step = Duration::minutes(SLOT_GRID_MINUTES);

        let rules = self
            .schedules
            .service_rules(request.clinic_id, request.service_type_id, auth_token)
            .await?
            .unwrap_or_else(|| {
                ServiceTypeRules::defaults_for(request.service_type_id, request.clinic_id)
            });

        let now = Utc::now();
        let started = Instant::now();
        let mut suggestions: Vec<ScoredSlot> = Vec::new();
        let mut search = SearchMetadata::default();

        debug!(
            "Scanning {} days from {} for professional {}",
            window_days, request.preferred_start, request.professional_id
        );

        'days: for day_offset in 0..window_days {
            if started.elapsed() >= self.budget {
                search.budget_exhausted = true;
                break;
            }

            let date = request.preferred_start.date_naive() + Duration::days(day_offset);
            search.days_scanned += 1;

            let schedule = match self
                .schedules
                .weekday_schedule(
                    request.clinic_id,
                    request.professional_id,
                    weekday_index(date),
                    auth_token,
                )
                .await?
                .filter(|s| s.is_available)
            {
                Some(s) => s,
                None => continue,
            };

            let holidays = self
                .schedules
                .holidays_on(request.clinic_id, date, auth_token)
                .await?;

            // Full-day closures make every grid point on this date unviable.
            if holidays.iter().any(|h| h.is_full_day()) {
                continue;
            }

            let day_start = date.and_time(schedule.start_time).and_utc();
            let day_end = date.and_time(schedule.end_time).and_utc();

            let existing = self
                .bookings
                .appointments_in_range(
                    request.clinic_id,
                    request.professional_id,
                    day_start - Duration::days(1),
                    day_end + Duration::days(1),
                    auth_token,
                )
                .await?;
            let active: Vec<&Appointment> =
                existing.iter().filter(|a| a.status.blocks_calendar()).collect();

            let mut cursor = day_start;
            while cursor + duration <= day_end {
                if started.elapsed() >= self.budget {
                    search.budget_exhausted = true;
                    break 'days;
                }

                let slot_start = cursor;
                let slot_end = cursor + duration;
                cursor += grid_step;

                if slot_start <= now {
                    continue;
                }
                search.candidates_examined += 1;

                let conflicts = ConflictDetectionService::slot_hard_conflicts(
                    &schedule,
                    &holidays,
                    &rules,
                    &active,
                    request.service_type_id,
                    slot_start,
                    slot_end,
                );
                if !conflicts.is_empty() {
                    continue;
                }

                let (score, reasons) = Self::score_slot(
                    slot_start,
                    request.preferred_start,
                    &request.preferred_times,
                    &rules,
                );
                suggestions.push(ScoredSlot {
                    start_time: slot_start,
                    end_time: slot_end,
                    score,
                    reasons,
                });

                // Early exit keeps the scan O(windowDays x slotsPerDay).
                if suggestions.len() >= max_suggestions {
                    break 'days;
                }
            }
        }

        debug!(
            "Found {} viable slots over {} days ({} candidates)",
            suggestions.len(),
            search.days_scanned,
            search.candidates_examined
        );

        Ok(SuggestionOutcome { suggestions, search })
    }

    fn guard_input(request: &SuggestSlotsRequest) -> Result<(), SchedulingError> {
        let mut missing = Vec::new();
        if request.clinic_id.is_nil() {
            missing.push("clinic_id");
        }
        if request.professional_id.is_nil() {
            missing.push("professional_id");
        }
        if request.service_type_id.is_nil() {
            missing.push("service_type_id");
        }
        if !missing.is_empty() {
            return Err(SchedulingError::MissingParameters(missing.join(", ")));
        }
        if request.duration_minutes <= 0 {
            return Err(SchedulingError::InvalidTimeRange);
        }
        Ok(())
    }

    /// Additive scoring over a fixed base. Each adjustment also records a
    /// human-readable reason so callers can explain the ranking.
    fn score_slot(
        candidate: DateTime<Utc>,
        preferred: DateTime<Utc>,
        preferred_times: &[NaiveTime],
        rules: &ServiceTypeRules,
    ) -> (f64, Vec<String>) {
        let mut score = BASE_SCORE;
        let mut reasons = Vec::new();

        let distance_minutes = (candidate - preferred).num_minutes().abs();
        score -= DISTANCE_PENALTY_PER_MINUTE * distance_minutes as f64;
        reasons.push(format!("{} minutes from preferred start", distance_minutes));

        let day_offset = (candidate.date_naive() - preferred.date_naive()).num_days();
        if day_offset == 0 {
            score += SAME_DAY_BONUS;
            reasons.push("same day as preferred".to_string());
        } else if day_offset == 1 {
            score += NEXT_DAY_BONUS;
            reasons.push("day after preferred".to_string());
        }

        let time_of_day = candidate.time();
        let near_preferred_time = preferred_times.iter().any(|t| {
            (time_of_day - *t).num_minutes().abs() <= PREFERRED_TIME_TOLERANCE_MINUTES
        });
        if near_preferred_time {
            score += PREFERRED_TIME_BONUS;
            reasons.push("matches a preferred time of day".to_string());
        }

        let hour = candidate.hour();
        if (8..12).contains(&hour) {
            score += MORNING_BONUS;
            reasons.push("morning slot".to_string());
        }
        if !(8..17).contains(&hour) {
            score -= OFF_HOURS_PENALTY;
            reasons.push("outside core hours".to_string());
        }

        if rules.has_buffers() {
            score += BUFFERED_SERVICE_BONUS;
            reasons.push("buffer time reserved around this slot".to_string());
        }

        (score, reasons)
    }
}
