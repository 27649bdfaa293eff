// libs/scheduling-cell/src/services/conflict.rs
use chrono::{DateTime, Duration, Timelike, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    weekday_index, Appointment, BookingRequest, ClinicHoliday, Conflict, ProfessionalSchedule,
    SchedulingError, ServiceTypeRules, ValidationOutcome, Warning,
};
use crate::repositories::{BookingRepository, ScheduleRepository};

/// Lead time required when neither the service rules nor the schedule row
/// configure one.
const DEFAULT_MIN_NOTICE_HOURS: i64 = 2;
/// Booking horizon when neither the service rules nor the schedule row
/// configure one.
const DEFAULT_MAX_DAYS_AHEAD: i64 = 90;

/// Validates a candidate appointment against every business rule. Pure over
/// repository reads: no writes, no side effects. All checks run even after
/// an earlier one fails, so the caller always sees the full conflict set.
pub struct ConflictDetectionService {
    schedules: Arc<dyn ScheduleRepository>,
    bookings: Arc<dyn BookingRepository>,
}

impl ConflictDetectionService {
    pub fn new(schedules: Arc<dyn ScheduleRepository>, bookings: Arc<dyn BookingRepository>) -> Self {
        Self { schedules, bookings }
    }

    pub async fn validate(
        &self,
        request: &BookingRequest,
        auth_token: &str,
    ) -> Result<ValidationOutcome, SchedulingError> {
        Self::guard_input(request)?;

        let now = Utc::now();
        debug!(
            "Validating booking for professional {} from {} to {}",
            request.professional_id, request.start_time, request.end_time
        );

        let mut conflicts = Vec::new();
        let mut warnings = Vec::new();

        // 1. Past-time check.
        if request.start_time <= now {
            conflicts.push(Conflict::PastAppointment {
                requested_start: request.start_time,
            });
        }

        let date = request.start_time.date_naive();
        let weekday = weekday_index(date);

        let schedule = self
            .schedules
            .weekday_schedule(request.clinic_id, request.professional_id, weekday, auth_token)
            .await?
            .filter(|s| s.is_available);

        let rules = self
            .schedules
            .service_rules(request.clinic_id, request.service_type_id, auth_token)
            .await?
            .unwrap_or_else(|| {
                ServiceTypeRules::defaults_for(request.service_type_id, request.clinic_id)
            });

        let holidays = self
            .schedules
            .holidays_on(request.clinic_id, date, auth_token)
            .await?;

        // Widened by a day on each side so buffers and appointments spanning
        // midnight are visible to the interval checks.
        let existing = self
            .bookings
            .appointments_in_range(
                request.clinic_id,
                request.professional_id,
                request.start_time - Duration::days(1),
                request.end_time + Duration::days(1),
                auth_token,
            )
            .await?;
        let active: Vec<&Appointment> =
            existing.iter().filter(|a| a.status.blocks_calendar()).collect();

        // 2-4. Schedule existence, working hours, break.
        match &schedule {
            None => conflicts.push(Conflict::NoSchedule { weekday }),
            Some(s) => conflicts.extend(Self::working_hours_conflicts(
                s,
                request.start_time,
                request.end_time,
            )),
        }

        // 5. Holiday.
        conflicts.extend(Self::holiday_conflicts(
            &holidays,
            request.start_time,
            request.end_time,
        ));

        // 6. Notice period (soft).
        let required_hours = Self::effective_notice_hours(&rules, schedule.as_ref());
        if request.start_time < now + Duration::hours(required_hours) {
            warnings.push(Warning::ShortNotice { required_hours });
        }

        // 7. Advance limit (hard).
        let max_days_ahead = Self::effective_max_days_ahead(&rules, schedule.as_ref());
        if request.start_time > now + Duration::days(max_days_ahead) {
            conflicts.push(Conflict::TooFarAhead { max_days_ahead });
        }

        // 8-12. Overlap, buffers, hourly capacity, simultaneous bookings.
        conflicts.extend(Self::booking_conflicts(
            &rules,
            schedule.as_ref(),
            &active,
            request.service_type_id,
            request.start_time,
            request.end_time,
        ));

        if !conflicts.is_empty() {
            warn!(
                "Booking for professional {} rejected with {} conflicts",
                request.professional_id,
                conflicts.len()
            );
        }

        Ok(ValidationOutcome { conflicts, warnings })
    }

    /// Input errors are rejected before any rule evaluation.
    fn guard_input(request: &BookingRequest) -> Result<(), SchedulingError> {
        let mut missing = Vec::new();
        if request.clinic_id.is_nil() {
            missing.push("clinic_id");
        }
        if request.patient_id.is_nil() {
            missing.push("patient_id");
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
        if request.start_time >= request.end_time {
            return Err(SchedulingError::InvalidTimeRange);
        }
        Ok(())
    }

    fn effective_notice_hours(
        rules: &ServiceTypeRules,
        schedule: Option<&ProfessionalSchedule>,
    ) -> i64 {
        rules
            .min_booking_notice_hours
            .into_iter()
            .chain(schedule.and_then(|s| s.min_booking_notice_hours))
            .chain(std::iter::once(DEFAULT_MIN_NOTICE_HOURS))
            .max()
            .unwrap_or(DEFAULT_MIN_NOTICE_HOURS)
    }

    fn effective_max_days_ahead(
        rules: &ServiceTypeRules,
        schedule: Option<&ProfessionalSchedule>,
    ) -> i64 {
        rules
            .max_booking_days_ahead
            .into_iter()
            .chain(schedule.and_then(|s| s.max_booking_days_ahead))
            .chain(std::iter::once(DEFAULT_MAX_DAYS_AHEAD))
            .max()
            .unwrap_or(DEFAULT_MAX_DAYS_AHEAD)
    }

    // ==============================================================================
    // PURE CHECKS (shared with the slot recommender)
    // ==============================================================================

    /// Standard three-way interval overlap on half-open intervals.
    pub(crate) fn intervals_overlap(
        a_start: DateTime<Utc>,
        a_end: DateTime<Utc>,
        b_start: DateTime<Utc>,
        b_end: DateTime<Utc>,
    ) -> bool {
        a_start < b_end && b_start < a_end
    }

    /// Working-hours and break checks against the weekday schedule row.
    pub(crate) fn working_hours_conflicts(
        schedule: &ProfessionalSchedule,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        let starts_tod = start.time();
        let ends_tod = end.time();
        let crosses_midnight = start.date_naive() != end.date_naive();

        if crosses_midnight || starts_tod < schedule.start_time || ends_tod > schedule.end_time {
            conflicts.push(Conflict::OutsideWorkingHours {
                opens_at: schedule.start_time,
                closes_at: schedule.end_time,
            });
        }

        // Any intersection with the break window counts, including the
        // request fully containing the break. Midnight-crossing requests are
        // skipped here only because the working-hours check above already
        // flags every one of them.
        if let (Some(break_start), Some(break_end)) = (schedule.break_start, schedule.break_end) {
            if !crosses_midnight && starts_tod < break_end && break_start < ends_tod {
                conflicts.push(Conflict::DuringBreak {
                    break_start,
                    break_end,
                });
            }
        }

        conflicts
    }

    pub(crate) fn holiday_conflicts(
        holidays: &[ClinicHoliday],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Conflict> {
        holidays
            .iter()
            .filter(|h| {
                if h.is_full_day() {
                    return true;
                }
                // Partial closure: compare times of day on the holiday date.
                let closed_from = h.start_time.unwrap_or_default();
                let closed_until = h.end_time.unwrap_or_default();
                start.time() < closed_until && closed_from < end.time()
            })
            .map(|h| Conflict::ClinicHoliday {
                date: h.date,
                name: h.name.clone(),
            })
            .collect()
    }

    /// Checks 8-12: overlap count, pre/post buffers, hourly capacity, and
    /// the simultaneous-booking rule, over the already-loaded day window.
    pub(crate) fn booking_conflicts(
        rules: &ServiceTypeRules,
        schedule: Option<&ProfessionalSchedule>,
        active: &[&Appointment],
        service_type_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        let conflict_count = active
            .iter()
            .filter(|a| Self::intervals_overlap(start, end, a.start_time, a.end_time))
            .count();
        if conflict_count > 0 {
            conflicts.push(Conflict::AppointmentOverlap { conflict_count });
        }

        if rules.pre_buffer_minutes > 0 {
            let window = Duration::minutes(rules.pre_buffer_minutes);
            let blocked = active
                .iter()
                .any(|a| a.end_time > start - window && a.end_time <= start);
            if blocked {
                conflicts.push(Conflict::PreBufferConflict {
                    buffer_minutes: rules.pre_buffer_minutes,
                });
            }
        }

        if rules.post_buffer_minutes > 0 {
            let window = Duration::minutes(rules.post_buffer_minutes);
            let blocked = active
                .iter()
                .any(|a| a.start_time >= end && a.start_time < end + window);
            if blocked {
                conflicts.push(Conflict::PostBufferConflict {
                    buffer_minutes: rules.post_buffer_minutes,
                });
            }
        }

        // Bucketed by wall-clock hour, not a rolling window.
        if let Some(limit) = schedule
            .and_then(|s| s.max_appointments_per_hour)
            .filter(|limit| *limit > 0)
        {
            let hour_start = start
                .with_minute(0)
                .and_then(|t| t.with_second(0))
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(start);
            let hour_end = hour_start + Duration::hours(1);
            let booked = active
                .iter()
                .filter(|a| a.start_time >= hour_start && a.start_time < hour_end)
                .count();
            if booked >= limit as usize {
                conflicts.push(Conflict::HourlyCapacityExceeded { limit, booked });
            }
        }

        if !rules.allow_simultaneous_bookings {
            let same_service_overlap = active.iter().any(|a| {
                a.service_type_id == service_type_id
                    && Self::intervals_overlap(start, end, a.start_time, a.end_time)
            });
            if same_service_overlap {
                conflicts.push(Conflict::ServiceSimultaneousNotAllowed { service_type_id });
            }
        }

        conflicts
    }

    /// Viability checks for a recommender candidate: everything except the
    /// notice/advance policy, which is evaluated against the original
    /// request rather than each candidate.
    pub(crate) fn slot_hard_conflicts(
        schedule: &ProfessionalSchedule,
        holidays: &[ClinicHoliday],
        rules: &ServiceTypeRules,
        active: &[&Appointment],
        service_type_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Conflict> {
        let mut conflicts = Self::working_hours_conflicts(schedule, start, end);
        conflicts.extend(Self::holiday_conflicts(holidays, start, end));
        conflicts.extend(Self::booking_conflicts(
            rules,
            Some(schedule),
            active,
            service_type_id,
            start,
            end,
        ));
        conflicts
    }
}
