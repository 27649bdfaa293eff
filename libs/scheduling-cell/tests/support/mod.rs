// libs/scheduling-cell/tests/support/mod.rs
//
// In-memory repository fakes and fixtures shared by the service-level tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use scheduling_cell::models::{
    Appointment, AppointmentStatus, BookingRequest, CancellationPolicy, ClinicHoliday,
    NewAppointment, NewRescheduleRequest, ProfessionalSchedule, ServiceTypeRules, WaitlistEntry,
    WaitlistStatus,
};
use scheduling_cell::repositories::{
    BookingRepository, Notifier, RepositoryError, ScheduleRepository, WaitlistRepository,
};

pub const TOKEN: &str = "test-token";

// ==============================================================================
// IN-MEMORY REPOSITORY
// ==============================================================================

#[derive(Default)]
pub struct InMemoryRepo {
    pub schedules: Vec<ProfessionalSchedule>,
    pub rules: Vec<ServiceTypeRules>,
    pub holidays: Vec<ClinicHoliday>,
    pub policy: Option<CancellationPolicy>,
    pub appointments: Mutex<Vec<Appointment>>,
    pub waitlist: Mutex<Vec<WaitlistEntry>>,
    pub fees: Mutex<Vec<(Uuid, f64)>>,
    pub reschedule_requests: Mutex<Vec<NewRescheduleRequest>>,
    pub notified_entries: Mutex<Vec<Uuid>>,
    /// When set, every insert fails as if the storage exclusion constraint
    /// rejected it.
    pub reject_inserts: bool,
}

#[async_trait]
impl ScheduleRepository for InMemoryRepo {
    async fn weekday_schedule(
        &self,
        _clinic_id: Uuid,
        professional_id: Uuid,
        day_of_week: i32,
        _auth_token: &str,
    ) -> Result<Option<ProfessionalSchedule>, RepositoryError> {
        Ok(self
            .schedules
            .iter()
            .find(|s| s.professional_id == professional_id && s.day_of_week == day_of_week)
            .cloned())
    }

    async fn service_rules(
        &self,
        clinic_id: Uuid,
        service_type_id: Uuid,
        _auth_token: &str,
    ) -> Result<Option<ServiceTypeRules>, RepositoryError> {
        Ok(self
            .rules
            .iter()
            .find(|r| r.clinic_id == clinic_id && r.service_type_id == service_type_id)
            .cloned())
    }

    async fn holidays_on(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
        _auth_token: &str,
    ) -> Result<Vec<ClinicHoliday>, RepositoryError> {
        Ok(self
            .holidays
            .iter()
            .filter(|h| h.clinic_id == clinic_id && h.date == date)
            .cloned()
            .collect())
    }

    async fn cancellation_policy(
        &self,
        _clinic_id: Uuid,
        _auth_token: &str,
    ) -> Result<Option<CancellationPolicy>, RepositoryError> {
        Ok(self.policy.clone())
    }
}

#[async_trait]
impl BookingRepository for InMemoryRepo {
    async fn appointments_in_range(
        &self,
        clinic_id: Uuid,
        professional_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        _auth_token: &str,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let mut rows: Vec<Appointment> = self
            .appointments
            .lock()
            .unwrap()
            .iter()
            .filter(|a| {
                a.clinic_id == clinic_id
                    && a.professional_id == professional_id
                    && a.start_time <= to
                    && a.end_time >= from
            })
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.start_time);
        Ok(rows)
    }

    async fn find_appointment(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        _auth_token: &str,
    ) -> Result<Option<Appointment>, RepositoryError> {
        Ok(self
            .appointments
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.clinic_id == clinic_id && a.id == appointment_id)
            .cloned())
    }

    async fn insert_appointment(
        &self,
        appointment: NewAppointment,
        _auth_token: &str,
    ) -> Result<Appointment, RepositoryError> {
        if self.reject_inserts {
            return Err(RepositoryError::ExclusionViolation(
                "conflicting key value violates exclusion constraint".to_string(),
            ));
        }

        let now = Utc::now();
        let row = Appointment {
            id: Uuid::new_v4(),
            clinic_id: appointment.clinic_id,
            patient_id: appointment.patient_id,
            professional_id: appointment.professional_id,
            service_type_id: appointment.service_type_id,
            start_time: appointment.start_time,
            end_time: appointment.end_time,
            status: appointment.status,
            cancellation_reason: None,
            notes: appointment.notes,
            created_at: now,
            updated_at: now,
        };
        self.appointments.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn mark_cancelled(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        reason: &str,
        cancelled_at: DateTime<Utc>,
        _auth_token: &str,
    ) -> Result<Appointment, RepositoryError> {
        let mut rows = self.appointments.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|a| a.clinic_id == clinic_id && a.id == appointment_id)
            .ok_or_else(|| RepositoryError::Malformed("update returned no row".to_string()))?;
        row.status = AppointmentStatus::Cancelled;
        row.cancellation_reason = Some(reason.to_string());
        row.updated_at = cancelled_at;
        Ok(row.clone())
    }

    async fn record_cancellation_fee(
        &self,
        _clinic_id: Uuid,
        appointment_id: Uuid,
        amount: f64,
        _auth_token: &str,
    ) -> Result<(), RepositoryError> {
        self.fees.lock().unwrap().push((appointment_id, amount));
        Ok(())
    }

    async fn insert_reschedule_request(
        &self,
        request: NewRescheduleRequest,
        _auth_token: &str,
    ) -> Result<Uuid, RepositoryError> {
        self.reschedule_requests.lock().unwrap().push(request);
        Ok(Uuid::new_v4())
    }
}

#[async_trait]
impl WaitlistRepository for InMemoryRepo {
    async fn active_entries_for_service(
        &self,
        clinic_id: Uuid,
        service_type_id: Uuid,
        _auth_token: &str,
    ) -> Result<Vec<WaitlistEntry>, RepositoryError> {
        let mut rows: Vec<WaitlistEntry> = self
            .waitlist
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                e.clinic_id == clinic_id
                    && e.service_type_id == service_type_id
                    && e.status == WaitlistStatus::Active
            })
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.created_at);
        Ok(rows)
    }

    async fn mark_notified(
        &self,
        clinic_id: Uuid,
        entry_id: Uuid,
        _auth_token: &str,
    ) -> Result<(), RepositoryError> {
        let mut rows = self.waitlist.lock().unwrap();
        if let Some(entry) = rows
            .iter_mut()
            .find(|e| e.clinic_id == clinic_id && e.id == entry_id)
        {
            entry.status = WaitlistStatus::Notified;
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for InMemoryRepo {
    async fn waitlist_slot_available(
        &self,
        entry: &WaitlistEntry,
        _freed: &Appointment,
        _auth_token: &str,
    ) -> Result<(), RepositoryError> {
        self.notified_entries.lock().unwrap().push(entry.id);
        Ok(())
    }
}

// ==============================================================================
// FIXTURES
// ==============================================================================

/// Stable ids plus time helpers for one clinic under test.
pub struct TestClinic {
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub service_type_id: Uuid,
}

impl TestClinic {
    pub fn new() -> Self {
        Self {
            clinic_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            professional_id: Uuid::new_v4(),
            service_type_id: Uuid::new_v4(),
        }
    }

    /// A timestamp `days_ahead` days from today at the given time of day.
    pub fn at(&self, days_ahead: i64, time: &str) -> DateTime<Utc> {
        let date = Utc::now().date_naive() + Duration::days(days_ahead);
        date.and_time(parse_time(time)).and_utc()
    }

    pub fn booking_request(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> BookingRequest {
        BookingRequest {
            clinic_id: self.clinic_id,
            patient_id: self.patient_id,
            professional_id: self.professional_id,
            service_type_id: self.service_type_id,
            start_time: start,
            end_time: end,
            notes: None,
        }
    }

    /// One schedule row per weekday so tests are independent of today's date.
    pub fn full_week_schedule(&self, start: &str, end: &str) -> Vec<ProfessionalSchedule> {
        (0..7)
            .map(|day| ProfessionalSchedule {
                professional_id: self.professional_id,
                day_of_week: day,
                start_time: parse_time(start),
                end_time: parse_time(end),
                break_start: None,
                break_end: None,
                is_available: true,
                min_booking_notice_hours: None,
                max_booking_days_ahead: None,
                max_appointments_per_hour: None,
            })
            .collect()
    }

    pub fn appointment(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            clinic_id: self.clinic_id,
            patient_id: Uuid::new_v4(),
            professional_id: self.professional_id,
            service_type_id: self.service_type_id,
            start_time: start,
            end_time: end,
            status: AppointmentStatus::Scheduled,
            cancellation_reason: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn waitlist_entry(
        &self,
        preferred_professional_id: Option<Uuid>,
        created_at: DateTime<Utc>,
    ) -> WaitlistEntry {
        let today = Utc::now().date_naive();
        WaitlistEntry {
            id: Uuid::new_v4(),
            clinic_id: self.clinic_id,
            patient_id: Uuid::new_v4(),
            service_type_id: self.service_type_id,
            preferred_professional_id,
            preferred_from: today,
            preferred_until: today + Duration::days(365),
            preferred_times: Vec::new(),
            status: WaitlistStatus::Active,
            created_at,
        }
    }
}

pub fn parse_time(time: &str) -> NaiveTime {
    NaiveTime::parse_from_str(time, "%H:%M").unwrap()
}

pub fn default_rules(clinic: &TestClinic) -> ServiceTypeRules {
    ServiceTypeRules::defaults_for(clinic.service_type_id, clinic.clinic_id)
}

pub fn shared(repo: InMemoryRepo) -> Arc<InMemoryRepo> {
    Arc::new(repo)
}
