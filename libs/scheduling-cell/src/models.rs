// libs/scheduling-cell/src/models.rs
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::repositories::RepositoryError;

// ==============================================================================
// CORE SCHEDULING MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub service_type_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub cancellation_reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Whether an appointment in this status occupies the professional's
    /// calendar for overlap and capacity purposes.
    pub fn blocks_calendar(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Scheduled
                | AppointmentStatus::Confirmed
                | AppointmentStatus::Completed
        )
    }

    /// Terminal states cannot be cancelled again.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

/// One row per professional per weekday. `day_of_week` runs 0 (Sunday)
/// through 6 (Saturday). Edited by staff out of band; read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfessionalSchedule {
    pub professional_id: Uuid,
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub break_start: Option<NaiveTime>,
    pub break_end: Option<NaiveTime>,
    pub is_available: bool,
    pub min_booking_notice_hours: Option<i64>,
    pub max_booking_days_ahead: Option<i64>,
    pub max_appointments_per_hour: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceTypeRules {
    pub service_type_id: Uuid,
    pub clinic_id: Uuid,
    pub pre_buffer_minutes: i64,
    pub post_buffer_minutes: i64,
    pub min_booking_notice_hours: Option<i64>,
    pub max_booking_days_ahead: Option<i64>,
    pub allow_simultaneous_bookings: bool,
}

impl ServiceTypeRules {
    /// Fallback when a service type has no configured rules row.
    pub fn defaults_for(service_type_id: Uuid, clinic_id: Uuid) -> Self {
        Self {
            service_type_id,
            clinic_id,
            pre_buffer_minutes: 0,
            post_buffer_minutes: 0,
            min_booking_notice_hours: None,
            max_booking_days_ahead: None,
            allow_simultaneous_bookings: true,
        }
    }

    pub fn has_buffers(&self) -> bool {
        self.pre_buffer_minutes > 0 || self.post_buffer_minutes > 0
    }
}

/// Clinic closure. Absent times mean the clinic is closed the whole day;
/// otherwise only the given range is closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicHoliday {
    pub clinic_id: Uuid,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub name: Option<String>,
}

impl ClinicHoliday {
    pub fn is_full_day(&self) -> bool {
        self.start_time.is_none() || self.end_time.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationPolicy {
    pub minimum_hours: i64,
    pub fee_amount: f64,
    pub fee_applies: bool,
    /// Reason codes that waive both the fee and the minimum-hours rule.
    pub emergency_exceptions: Vec<String>,
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self {
            minimum_hours: 24,
            fee_amount: 0.0,
            fee_applies: false,
            emergency_exceptions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub service_type_id: Uuid,
    pub preferred_professional_id: Option<Uuid>,
    pub preferred_from: NaiveDate,
    pub preferred_until: NaiveDate,
    #[serde(default)]
    pub preferred_times: Vec<NaiveTime>,
    pub status: WaitlistStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WaitlistStatus {
    Active,
    Notified,
    Fulfilled,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub appointment_id: Uuid,
    pub requested_start: DateTime<Utc>,
    pub reason: Option<String>,
    pub status: RescheduleStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RescheduleStatus {
    PendingReview,
    Rejected,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub service_type_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestSlotsRequest {
    pub clinic_id: Uuid,
    pub professional_id: Uuid,
    pub service_type_id: Uuid,
    pub preferred_start: DateTime<Utc>,
    pub duration_minutes: i64,
    pub window_days: Option<i64>,
    pub max_suggestions: Option<usize>,
    /// Caller-supplied preferred times of day, used only for scoring.
    #[serde(default)]
    pub preferred_times: Vec<NaiveTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: String,
    #[serde(default)]
    pub is_emergency: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleRequestBody {
    pub new_start_time: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Insert payload for the booking repository. Status is always Scheduled on
/// the booking path; ids and timestamps are assigned by storage.
#[derive(Debug, Clone, Serialize)]
pub struct NewAppointment {
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub service_type_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewRescheduleRequest {
    pub clinic_id: Uuid,
    pub appointment_id: Uuid,
    pub requested_start: DateTime<Utc>,
    pub reason: Option<String>,
}

// ==============================================================================
// CONFLICTS AND WARNINGS
// ==============================================================================

/// Hard conflict: blocks booking. Each variant carries the structured
/// payload a caller needs to render a precise message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Conflict {
    PastAppointment {
        requested_start: DateTime<Utc>,
    },
    NoSchedule {
        weekday: i32,
    },
    OutsideWorkingHours {
        opens_at: NaiveTime,
        closes_at: NaiveTime,
    },
    DuringBreak {
        break_start: NaiveTime,
        break_end: NaiveTime,
    },
    ClinicHoliday {
        date: NaiveDate,
        name: Option<String>,
    },
    TooFarAhead {
        max_days_ahead: i64,
    },
    AppointmentOverlap {
        conflict_count: usize,
    },
    PreBufferConflict {
        buffer_minutes: i64,
    },
    PostBufferConflict {
        buffer_minutes: i64,
    },
    HourlyCapacityExceeded {
        limit: i32,
        booked: usize,
    },
    ServiceSimultaneousNotAllowed {
        service_type_id: Uuid,
    },
}

/// Soft warning: surfaced to the caller but never blocks booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Warning {
    ShortNotice { required_hours: i64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValidationOutcome {
    pub conflicts: Vec<Conflict>,
    pub warnings: Vec<Warning>,
}

impl ValidationOutcome {
    pub fn is_bookable(&self) -> bool {
        self.conflicts.is_empty()
    }
}

// ==============================================================================
// SLOT RECOMMENDATION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub score: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchMetadata {
    pub days_scanned: u32,
    pub candidates_examined: u32,
    pub budget_exhausted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionOutcome {
    pub suggestions: Vec<ScoredSlot>,
    pub search: SearchMetadata,
}

// ==============================================================================
// CANCELLATION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationOutcome {
    pub fee_applied: bool,
    pub fee_amount: f64,
    /// Waitlist entry promoted for the freed slot, if any.
    pub waitlist_promoted: Option<Uuid>,
}

/// Result of a booking attempt: either the persisted appointment or the
/// full set of reasons it was rejected.
#[derive(Debug, Clone)]
pub enum BookingOutcome {
    Booked {
        appointment: Appointment,
        warnings: Vec<Warning>,
    },
    Rejected(ValidationOutcome),
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("Missing parameters: {0}")]
    MissingParameters(String),

    #[error("Invalid time range: start must be before end")]
    InvalidTimeRange,

    #[error("Appointment not found")]
    NotFound,

    #[error("Appointment cannot be cancelled in status {0}")]
    NotCancellable(AppointmentStatus),

    #[error("Reschedule requests must be submitted at least {required_hours} hours before the appointment")]
    RescheduleWindowClosed { required_hours: i64 },

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<SchedulingError> for shared_models::error::AppError {
    fn from(err: SchedulingError) -> Self {
        use shared_models::error::AppError;
        match err {
            SchedulingError::NotFound => AppError::NotFound(err.to_string()),
            SchedulingError::MissingParameters(_) | SchedulingError::InvalidTimeRange => {
                AppError::BadRequest(err.to_string())
            }
            // State conflicts surface as 409 with the reason in the body.
            SchedulingError::NotCancellable(_)
            | SchedulingError::RescheduleWindowClosed { .. } => {
                AppError::SchedulingConflict(serde_json::json!({ "error": err.to_string() }))
            }
            SchedulingError::Repository(inner) => AppError::Database(inner.to_string()),
        }
    }
}

// ==============================================================================
// HELPERS
// ==============================================================================

/// Weekday index used by `ProfessionalSchedule.day_of_week` (Sunday = 0).
pub fn weekday_index(date: NaiveDate) -> i32 {
    match date.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}
