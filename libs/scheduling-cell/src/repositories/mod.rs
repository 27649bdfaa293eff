// libs/scheduling-cell/src/repositories/mod.rs
//
// Narrow persistence seams for the scheduling engine. Every method takes the
// clinic id explicitly: the engine never reads or writes across clinics.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{
    Appointment, CancellationPolicy, ClinicHoliday, NewAppointment, NewRescheduleRequest,
    ProfessionalSchedule, ServiceTypeRules, WaitlistEntry,
};

pub mod supabase;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    /// A uniqueness/exclusion constraint rejected a write at commit time.
    #[error("exclusion constraint violated: {0}")]
    ExclusionViolation(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("malformed row: {0}")]
    Malformed(String),
}

/// Read-only access to working hours, service rules, holidays and the
/// cancellation policy. All of these are edited by staff out of band.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn weekday_schedule(
        &self,
        clinic_id: Uuid,
        professional_id: Uuid,
        day_of_week: i32,
        auth_token: &str,
    ) -> Result<Option<ProfessionalSchedule>, RepositoryError>;

    async fn service_rules(
        &self,
        clinic_id: Uuid,
        service_type_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<ServiceTypeRules>, RepositoryError>;

    async fn holidays_on(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<ClinicHoliday>, RepositoryError>;

    async fn cancellation_policy(
        &self,
        clinic_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<CancellationPolicy>, RepositoryError>;
}

/// Appointment reads and writes. `insert_appointment` must be atomic with
/// respect to the storage-level exclusion constraint on
/// (professional_id, [start_time, end_time)): a concurrent overlapping
/// insert surfaces as `ExclusionViolation`.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn appointments_in_range(
        &self,
        clinic_id: Uuid,
        professional_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, RepositoryError>;

    async fn find_appointment(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<Appointment>, RepositoryError>;

    async fn insert_appointment(
        &self,
        appointment: NewAppointment,
        auth_token: &str,
    ) -> Result<Appointment, RepositoryError>;

    /// Soft delete: flips status to cancelled with the reason and timestamp.
    async fn mark_cancelled(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        reason: &str,
        cancelled_at: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, RepositoryError>;

    async fn record_cancellation_fee(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        amount: f64,
        auth_token: &str,
    ) -> Result<(), RepositoryError>;

    async fn insert_reschedule_request(
        &self,
        request: NewRescheduleRequest,
        auth_token: &str,
    ) -> Result<Uuid, RepositoryError>;
}

/// Waitlist reads and the promotion status flip. Entries come back ordered
/// by `created_at` ascending so promotion stays FIFO-fair.
#[async_trait]
pub trait WaitlistRepository: Send + Sync {
    async fn active_entries_for_service(
        &self,
        clinic_id: Uuid,
        service_type_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<WaitlistEntry>, RepositoryError>;

    /// Idempotent single-row update; safe to retry with the cancellation.
    async fn mark_notified(
        &self,
        clinic_id: Uuid,
        entry_id: Uuid,
        auth_token: &str,
    ) -> Result<(), RepositoryError>;
}

/// Fire-and-forget notification dispatch. Delivery is external and
/// best-effort; failures are logged by the caller, never propagated.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn waitlist_slot_available(
        &self,
        entry: &WaitlistEntry,
        freed: &Appointment,
        auth_token: &str,
    ) -> Result<(), RepositoryError>;
}
