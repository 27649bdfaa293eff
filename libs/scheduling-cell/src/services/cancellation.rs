// libs/scheduling-cell/src/services/cancellation.rs
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    Appointment, CancelAppointmentRequest, CancellationOutcome, NewRescheduleRequest,
    RescheduleRequestBody, SchedulingError, WaitlistEntry,
};
use crate::repositories::{
    BookingRepository, Notifier, ScheduleRepository, WaitlistRepository,
};

/// Notice a reschedule request must give before the original start time.
const RESCHEDULE_MIN_NOTICE_HOURS: i64 = 48;

/// Applies the clinic's cancellation policy, persists the cancellation, and
/// promotes the longest-waiting eligible waitlist entry for the freed slot.
pub struct CancellationService {
    schedules: Arc<dyn ScheduleRepository>,
    bookings: Arc<dyn BookingRepository>,
    waitlist: Arc<dyn WaitlistRepository>,
    notifier: Arc<dyn Notifier>,
}

impl CancellationService {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        bookings: Arc<dyn BookingRepository>,
        waitlist: Arc<dyn WaitlistRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            schedules,
            bookings,
            waitlist,
            notifier,
        }
    }

    pub async fn cancel(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        request: &CancelAppointmentRequest,
        auth_token: &str,
    ) -> Result<CancellationOutcome, SchedulingError> {
        let appointment = self
            .bookings
            .find_appointment(clinic_id, appointment_id, auth_token)
            .await?
            .ok_or(SchedulingError::NotFound)?;

        if !appointment.status.is_cancellable() {
            return Err(SchedulingError::NotCancellable(appointment.status));
        }

        let policy = self
            .schedules
            .cancellation_policy(clinic_id, auth_token)
            .await?
            .unwrap_or_default();

        let now = Utc::now();
        // Truncating division: 23h59m counts as 23 hours of notice.
        let hours_until = (appointment.start_time - now).num_hours();
        let emergency = request.is_emergency
            || policy
                .emergency_exceptions
                .iter()
                .any(|code| code == &request.reason);

        let fee_applied =
            hours_until < policy.minimum_hours && !emergency && policy.fee_applies;
        let fee_amount = if fee_applied { policy.fee_amount } else { 0.0 };

        debug!(
            "Cancelling appointment {} with {}h notice (policy minimum {}h, fee applied: {})",
            appointment_id, hours_until, policy.minimum_hours, fee_applied
        );

        let cancelled = self
            .bookings
            .mark_cancelled(clinic_id, appointment_id, &request.reason, now, auth_token)
            .await?;

        if fee_applied {
            self.bookings
                .record_cancellation_fee(clinic_id, appointment_id, fee_amount, auth_token)
                .await?;
        }

        let waitlist_promoted = self.promote_waitlist(&cancelled, auth_token).await;

        info!(
            "Appointment {} cancelled (fee: {}, waitlist promoted: {:?})",
            appointment_id, fee_amount, waitlist_promoted
        );

        Ok(CancellationOutcome {
            fee_applied,
            fee_amount,
            waitlist_promoted,
        })
    }

    /// Promotes the oldest active entry matching the freed slot. Promotion is
    /// best-effort: a waitlist or notification failure never unwinds the
    /// cancellation that already committed.
    async fn promote_waitlist(&self, freed: &Appointment, auth_token: &str) -> Option<Uuid> {
        let entries = match self
            .waitlist
            .active_entries_for_service(freed.clinic_id, freed.service_type_id, auth_token)
            .await
        {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Waitlist lookup failed after cancellation: {}", err);
                return None;
            }
        };

        let entry = entries
            .into_iter()
            .find(|e| Self::entry_matches(e, freed))?;

        if let Err(err) = self
            .waitlist
            .mark_notified(freed.clinic_id, entry.id, auth_token)
            .await
        {
            warn!("Failed to mark waitlist entry {} notified: {}", entry.id, err);
            return None;
        }

        if let Err(err) = self
            .notifier
            .waitlist_slot_available(&entry, freed, auth_token)
            .await
        {
            // The entry is already flipped; delivery retries happen downstream.
            warn!(
                "Notification dispatch failed for waitlist entry {}: {}",
                entry.id, err
            );
        }

        Some(entry.id)
    }

    // Entries arrive ordered by created_at ascending, so the first match is
    // the longest-waiting one.
    fn entry_matches(entry: &WaitlistEntry, freed: &Appointment) -> bool {
        let professional_ok = entry
            .preferred_professional_id
            .map(|id| id == freed.professional_id)
            .unwrap_or(true);
        let date = freed.start_time.date_naive();
        professional_ok && entry.preferred_from <= date && date <= entry.preferred_until
    }

    /// Files a reschedule request for staff review. No automatic re-booking
    /// happens here; the request is only accepted when the original
    /// appointment is still at least 48 hours away.
    pub async fn request_reschedule(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        body: &RescheduleRequestBody,
        auth_token: &str,
    ) -> Result<Uuid, SchedulingError> {
        let appointment = self
            .bookings
            .find_appointment(clinic_id, appointment_id, auth_token)
            .await?
            .ok_or(SchedulingError::NotFound)?;

        if !appointment.status.is_cancellable() {
            return Err(SchedulingError::NotCancellable(appointment.status));
        }

        let hours_until = (appointment.start_time - Utc::now()).num_hours();
        if hours_until < RESCHEDULE_MIN_NOTICE_HOURS {
            return Err(SchedulingError::RescheduleWindowClosed {
                required_hours: RESCHEDULE_MIN_NOTICE_HOURS,
            });
        }

        let id = self
            .bookings
            .insert_reschedule_request(
                NewRescheduleRequest {
                    clinic_id,
                    appointment_id,
                    requested_start: body.new_start_time,
                    reason: body.reason.clone(),
                },
                auth_token,
            )
            .await?;

        info!(
            "Reschedule request {} filed for appointment {} ({}h notice)",
            id, appointment_id, hours_until
        );

        Ok(id)
    }
}
