// libs/scheduling-cell/src/repositories/supabase.rs
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::{ConstraintViolation, SupabaseClient};

use crate::models::{
    Appointment, CancellationPolicy, ClinicHoliday, NewAppointment, NewRescheduleRequest,
    ProfessionalSchedule, ServiceTypeRules, WaitlistEntry,
};
use crate::repositories::{
    BookingRepository, Notifier, RepositoryError, ScheduleRepository, WaitlistRepository,
};

/// PostgREST-backed implementation of all repository seams. Every query
/// carries `clinic_id=eq.{}` so tenant scoping holds even without RLS.
pub struct SupabaseRepositories {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseRepositories {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    // PostgREST needs timestamps without '+' so they survive the query string.
    fn ts(t: DateTime<Utc>) -> String {
        t.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    fn map_err(err: anyhow::Error) -> RepositoryError {
        if let Some(violation) = err.downcast_ref::<ConstraintViolation>() {
            return RepositoryError::ExclusionViolation(violation.0.clone());
        }
        RepositoryError::Unavailable(err.to_string())
    }

    fn parse_rows<T: serde::de::DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, RepositoryError> {
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| RepositoryError::Malformed(e.to_string()))
    }

    fn representation_headers() -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );
        headers
    }
}

#[async_trait]
impl ScheduleRepository for SupabaseRepositories {
    async fn weekday_schedule(
        &self,
        clinic_id: Uuid,
        professional_id: Uuid,
        day_of_week: i32,
        auth_token: &str,
    ) -> Result<Option<ProfessionalSchedule>, RepositoryError> {
        let path = format!(
            "/rest/v1/professional_schedules?clinic_id=eq.{}&professional_id=eq.{}&day_of_week=eq.{}&limit=1",
            clinic_id, professional_id, day_of_week
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(Self::map_err)?;

        Ok(Self::parse_rows::<ProfessionalSchedule>(result)?.into_iter().next())
    }

    async fn service_rules(
        &self,
        clinic_id: Uuid,
        service_type_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<ServiceTypeRules>, RepositoryError> {
        let path = format!(
            "/rest/v1/service_type_rules?clinic_id=eq.{}&service_type_id=eq.{}&limit=1",
            clinic_id, service_type_id
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(Self::map_err)?;

        Ok(Self::parse_rows::<ServiceTypeRules>(result)?.into_iter().next())
    }

    async fn holidays_on(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<ClinicHoliday>, RepositoryError> {
        let path = format!(
            "/rest/v1/clinic_holidays?clinic_id=eq.{}&date=eq.{}",
            clinic_id, date
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(Self::map_err)?;

        Self::parse_rows(result)
    }

    async fn cancellation_policy(
        &self,
        clinic_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<CancellationPolicy>, RepositoryError> {
        let path = format!(
            "/rest/v1/cancellation_policies?clinic_id=eq.{}&limit=1",
            clinic_id
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(Self::map_err)?;

        Ok(Self::parse_rows::<CancellationPolicy>(result)?.into_iter().next())
    }
}

#[async_trait]
impl BookingRepository for SupabaseRepositories {
    async fn appointments_in_range(
        &self,
        clinic_id: Uuid,
        professional_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        // Interval query: anything whose span intersects [from, to).
        let path = format!(
            "/rest/v1/appointments?clinic_id=eq.{}&professional_id=eq.{}&start_time=lte.{}&end_time=gte.{}&order=start_time.asc",
            clinic_id,
            professional_id,
            Self::ts(to),
            Self::ts(from)
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(Self::map_err)?;

        Self::parse_rows(result)
    }

    async fn find_appointment(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<Appointment>, RepositoryError> {
        let path = format!(
            "/rest/v1/appointments?clinic_id=eq.{}&id=eq.{}",
            clinic_id, appointment_id
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(Self::map_err)?;

        Ok(Self::parse_rows::<Appointment>(result)?.into_iter().next())
    }

    async fn insert_appointment(
        &self,
        appointment: NewAppointment,
        auth_token: &str,
    ) -> Result<Appointment, RepositoryError> {
        debug!(
            "Inserting appointment for professional {} from {} to {}",
            appointment.professional_id, appointment.start_time, appointment.end_time
        );

        let now = Utc::now();
        let body = json!({
            "clinic_id": appointment.clinic_id,
            "patient_id": appointment.patient_id,
            "professional_id": appointment.professional_id,
            "service_type_id": appointment.service_type_id,
            "start_time": appointment.start_time.to_rfc3339(),
            "end_time": appointment.end_time.to_rfc3339(),
            "status": appointment.status.to_string(),
            "notes": appointment.notes,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(body),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(Self::map_err)?;

        Self::parse_rows::<Appointment>(result)?
            .into_iter()
            .next()
            .ok_or_else(|| RepositoryError::Malformed("insert returned no row".to_string()))
    }

    async fn mark_cancelled(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        reason: &str,
        cancelled_at: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, RepositoryError> {
        let path = format!(
            "/rest/v1/appointments?clinic_id=eq.{}&id=eq.{}",
            clinic_id, appointment_id
        );

        let body = json!({
            "status": "cancelled",
            "cancellation_reason": reason,
            "updated_at": cancelled_at.to_rfc3339()
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(Self::map_err)?;

        Self::parse_rows::<Appointment>(result)?
            .into_iter()
            .next()
            .ok_or_else(|| RepositoryError::Malformed("update returned no row".to_string()))
    }

    async fn record_cancellation_fee(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        amount: f64,
        auth_token: &str,
    ) -> Result<(), RepositoryError> {
        let body = json!({
            "clinic_id": clinic_id,
            "appointment_id": appointment_id,
            "amount": amount,
            "created_at": Utc::now().to_rfc3339()
        });

        let _: Vec<Value> = self
            .supabase
            .request(Method::POST, "/rest/v1/cancellation_fees", Some(auth_token), Some(body))
            .await
            .map_err(Self::map_err)?;

        Ok(())
    }

    async fn insert_reschedule_request(
        &self,
        request: NewRescheduleRequest,
        auth_token: &str,
    ) -> Result<Uuid, RepositoryError> {
        let body = json!({
            "clinic_id": request.clinic_id,
            "appointment_id": request.appointment_id,
            "requested_start": request.requested_start.to_rfc3339(),
            "reason": request.reason,
            "status": "pending_review",
            "created_at": Utc::now().to_rfc3339()
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/reschedule_requests",
                Some(auth_token),
                Some(body),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(Self::map_err)?;

        result
            .first()
            .and_then(|row| row.get("id"))
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| RepositoryError::Malformed("insert returned no id".to_string()))
    }
}

#[async_trait]
impl WaitlistRepository for SupabaseRepositories {
    async fn active_entries_for_service(
        &self,
        clinic_id: Uuid,
        service_type_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<WaitlistEntry>, RepositoryError> {
        let path = format!(
            "/rest/v1/waitlist_entries?clinic_id=eq.{}&service_type_id=eq.{}&status=eq.active&order=created_at.asc",
            clinic_id, service_type_id
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(Self::map_err)?;

        Self::parse_rows(result)
    }

    async fn mark_notified(
        &self,
        clinic_id: Uuid,
        entry_id: Uuid,
        auth_token: &str,
    ) -> Result<(), RepositoryError> {
        let path = format!(
            "/rest/v1/waitlist_entries?clinic_id=eq.{}&id=eq.{}",
            clinic_id, entry_id
        );

        let body = json!({
            "status": "notified",
            "updated_at": Utc::now().to_rfc3339()
        });

        let _: Vec<Value> = self
            .supabase
            .request(Method::PATCH, &path, Some(auth_token), Some(body))
            .await
            .map_err(Self::map_err)?;

        Ok(())
    }
}

#[async_trait]
impl Notifier for SupabaseRepositories {
    async fn waitlist_slot_available(
        &self,
        entry: &WaitlistEntry,
        freed: &Appointment,
        auth_token: &str,
    ) -> Result<(), RepositoryError> {
        // Delivery itself (email/SMS/push) is handled downstream; the engine
        // only records the event.
        let body = json!({
            "clinic_id": entry.clinic_id,
            "event_type": "waitlist_slot_available",
            "waitlist_entry_id": entry.id,
            "patient_id": entry.patient_id,
            "professional_id": freed.professional_id,
            "slot_start": freed.start_time.to_rfc3339(),
            "slot_end": freed.end_time.to_rfc3339(),
            "created_at": Utc::now().to_rfc3339()
        });

        let _: Vec<Value> = self
            .supabase
            .request(Method::POST, "/rest/v1/notification_events", Some(auth_token), Some(body))
            .await
            .map_err(Self::map_err)?;

        Ok(())
    }
}
