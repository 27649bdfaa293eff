// libs/scheduling-cell/src/services/booking.rs
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{
    AppointmentStatus, BookingOutcome, BookingRequest, Conflict, NewAppointment, SchedulingError,
    ValidationOutcome,
};
use crate::repositories::{BookingRepository, RepositoryError, ScheduleRepository};
use crate::services::conflict::ConflictDetectionService;

/// Validate-then-insert orchestration. Validation runs first so callers get
/// the full conflict set; the storage exclusion constraint is the backstop
/// for the race between validation and commit.
pub struct BookingService {
    detector: ConflictDetectionService,
    bookings: Arc<dyn BookingRepository>,
}

impl BookingService {
    pub fn new(schedules: Arc<dyn ScheduleRepository>, bookings: Arc<dyn BookingRepository>) -> Self {
        Self {
            detector: ConflictDetectionService::new(schedules, Arc::clone(&bookings)),
            bookings,
        }
    }

    /// Dry-run validation without any write.
    pub async fn validate(
        &self,
        request: &BookingRequest,
        auth_token: &str,
    ) -> Result<ValidationOutcome, SchedulingError> {
        self.detector.validate(request, auth_token).await
    }

    pub async fn book(
        &self,
        request: &BookingRequest,
        auth_token: &str,
    ) -> Result<BookingOutcome, SchedulingError> {
        let outcome = self.detector.validate(request, auth_token).await?;
        if !outcome.is_bookable() {
            return Ok(BookingOutcome::Rejected(outcome));
        }

        let insert = self
            .bookings
            .insert_appointment(
                NewAppointment {
                    clinic_id: request.clinic_id,
                    patient_id: request.patient_id,
                    professional_id: request.professional_id,
                    service_type_id: request.service_type_id,
                    start_time: request.start_time,
                    end_time: request.end_time,
                    status: AppointmentStatus::Scheduled,
                    notes: request.notes.clone(),
                },
                auth_token,
            )
            .await;

        match insert {
            Ok(appointment) => {
                info!(
                    "Appointment {} booked for professional {} from {} to {}",
                    appointment.id, appointment.professional_id, appointment.start_time,
                    appointment.end_time
                );
                Ok(BookingOutcome::Booked {
                    appointment,
                    warnings: outcome.warnings,
                })
            }
            // A concurrent insert won the slot between validation and commit.
            Err(RepositoryError::ExclusionViolation(detail)) => {
                warn!(
                    "Exclusion constraint rejected booking for professional {}: {}",
                    request.professional_id, detail
                );
                Ok(BookingOutcome::Rejected(ValidationOutcome {
                    conflicts: vec![Conflict::AppointmentOverlap { conflict_count: 1 }],
                    warnings: outcome.warnings,
                }))
            }
            Err(err) => Err(err.into()),
        }
    }
}
