// libs/scheduling-cell/tests/conflict_detection_test.rs
//
// Service-level tests for the conflict detector over in-memory repositories.

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use std::sync::Arc;

use scheduling_cell::models::{
    weekday_index, Conflict, SchedulingError, Warning,
};
use scheduling_cell::services::conflict::ConflictDetectionService;

mod support;
use support::{parse_time, shared, InMemoryRepo, TestClinic, TOKEN};

fn detector(repo: Arc<InMemoryRepo>) -> ConflictDetectionService {
    ConflictDetectionService::new(repo.clone(), repo)
}

// ==============================================================================
// WORKING HOURS, BREAKS, HOLIDAYS
// ==============================================================================

#[tokio::test]
async fn clean_request_inside_working_hours_is_bookable() {
    let clinic = TestClinic::new();
    let repo = shared(InMemoryRepo {
        schedules: clinic.full_week_schedule("09:00", "17:00"),
        ..Default::default()
    });

    let request = clinic.booking_request(clinic.at(7, "10:00"), clinic.at(7, "10:30"));
    let outcome = detector(repo).validate(&request, TOKEN).await.unwrap();

    assert!(outcome.is_bookable());
    assert!(outcome.warnings.is_empty());
}

#[tokio::test]
async fn request_overlapping_break_is_rejected() {
    let clinic = TestClinic::new();
    let mut schedules = clinic.full_week_schedule("09:00", "17:00");
    for row in &mut schedules {
        row.break_start = Some(parse_time("12:00"));
        row.break_end = Some(parse_time("13:00"));
    }
    let repo = shared(InMemoryRepo {
        schedules,
        ..Default::default()
    });

    let request = clinic.booking_request(clinic.at(7, "12:30"), clinic.at(7, "13:00"));
    let outcome = detector(repo).validate(&request, TOKEN).await.unwrap();

    assert_eq!(
        outcome.conflicts,
        vec![Conflict::DuringBreak {
            break_start: parse_time("12:00"),
            break_end: parse_time("13:00"),
        }]
    );
}

#[tokio::test]
async fn request_fully_containing_break_is_rejected() {
    let clinic = TestClinic::new();
    let mut schedules = clinic.full_week_schedule("09:00", "17:00");
    for row in &mut schedules {
        row.break_start = Some(parse_time("12:00"));
        row.break_end = Some(parse_time("13:00"));
    }
    let repo = shared(InMemoryRepo {
        schedules,
        ..Default::default()
    });

    // The break sits entirely inside the requested interval.
    let request = clinic.booking_request(clinic.at(7, "11:30"), clinic.at(7, "13:30"));
    let outcome = detector(repo).validate(&request, TOKEN).await.unwrap();

    assert!(outcome.conflicts.contains(&Conflict::DuringBreak {
        break_start: parse_time("12:00"),
        break_end: parse_time("13:00"),
    }));
}

#[tokio::test]
async fn request_outside_working_hours_is_rejected() {
    let clinic = TestClinic::new();
    let repo = shared(InMemoryRepo {
        schedules: clinic.full_week_schedule("09:00", "17:00"),
        ..Default::default()
    });

    let request = clinic.booking_request(clinic.at(7, "18:00"), clinic.at(7, "18:30"));
    let outcome = detector(repo).validate(&request, TOKEN).await.unwrap();

    assert_eq!(
        outcome.conflicts,
        vec![Conflict::OutsideWorkingHours {
            opens_at: parse_time("09:00"),
            closes_at: parse_time("17:00"),
        }]
    );
}

#[tokio::test]
async fn missing_schedule_row_is_rejected() {
    let clinic = TestClinic::new();
    let repo = shared(InMemoryRepo::default());

    let start = clinic.at(7, "10:00");
    let request = clinic.booking_request(start, clinic.at(7, "10:30"));
    let outcome = detector(repo).validate(&request, TOKEN).await.unwrap();

    let weekday = weekday_index(start.date_naive());
    assert_eq!(outcome.conflicts, vec![Conflict::NoSchedule { weekday }]);
}

#[tokio::test]
async fn unavailable_schedule_row_counts_as_no_schedule() {
    let clinic = TestClinic::new();
    let mut schedules = clinic.full_week_schedule("09:00", "17:00");
    for row in &mut schedules {
        row.is_available = false;
    }
    let repo = shared(InMemoryRepo {
        schedules,
        ..Default::default()
    });

    let start = clinic.at(7, "10:00");
    let request = clinic.booking_request(start, clinic.at(7, "10:30"));
    let outcome = detector(repo).validate(&request, TOKEN).await.unwrap();

    assert_matches!(outcome.conflicts.as_slice(), [Conflict::NoSchedule { .. }]);
}

#[tokio::test]
async fn full_day_holiday_blocks_the_whole_day() {
    let clinic = TestClinic::new();
    let start = clinic.at(7, "10:00");
    let repo = shared(InMemoryRepo {
        schedules: clinic.full_week_schedule("09:00", "17:00"),
        holidays: vec![scheduling_cell::models::ClinicHoliday {
            clinic_id: clinic.clinic_id,
            date: start.date_naive(),
            start_time: None,
            end_time: None,
            name: Some("Staff training".to_string()),
        }],
        ..Default::default()
    });

    let request = clinic.booking_request(start, clinic.at(7, "10:30"));
    let outcome = detector(repo).validate(&request, TOKEN).await.unwrap();

    assert_matches!(outcome.conflicts.as_slice(), [Conflict::ClinicHoliday { .. }]);
}

#[tokio::test]
async fn partial_holiday_outside_request_does_not_block() {
    let clinic = TestClinic::new();
    let start = clinic.at(7, "10:00");
    let repo = shared(InMemoryRepo {
        schedules: clinic.full_week_schedule("09:00", "17:00"),
        holidays: vec![scheduling_cell::models::ClinicHoliday {
            clinic_id: clinic.clinic_id,
            date: start.date_naive(),
            start_time: Some(parse_time("14:00")),
            end_time: Some(parse_time("16:00")),
            name: None,
        }],
        ..Default::default()
    });

    let request = clinic.booking_request(start, clinic.at(7, "10:30"));
    let outcome = detector(repo).validate(&request, TOKEN).await.unwrap();

    assert!(outcome.is_bookable());
}

// ==============================================================================
// NOTICE AND ADVANCE LIMITS
// ==============================================================================

#[tokio::test]
async fn short_notice_is_a_warning_not_a_conflict() {
    let clinic = TestClinic::new();
    // Around-the-clock schedule so only the notice rule can fire.
    let repo = shared(InMemoryRepo {
        schedules: clinic.full_week_schedule("00:00", "23:59"),
        ..Default::default()
    });

    let start = Utc::now() + Duration::minutes(30);
    let request = clinic.booking_request(start, start + Duration::minutes(20));
    let outcome = detector(repo).validate(&request, TOKEN).await.unwrap();

    assert!(outcome
        .warnings
        .contains(&Warning::ShortNotice { required_hours: 2 }));
    assert!(!outcome
        .conflicts
        .iter()
        .any(|c| matches!(c, Conflict::PastAppointment { .. })));
}

#[tokio::test]
async fn booking_beyond_the_advance_limit_is_rejected() {
    let clinic = TestClinic::new();
    let repo = shared(InMemoryRepo {
        schedules: clinic.full_week_schedule("09:00", "17:00"),
        ..Default::default()
    });

    let request = clinic.booking_request(clinic.at(120, "10:00"), clinic.at(120, "10:30"));
    let outcome = detector(repo).validate(&request, TOKEN).await.unwrap();

    assert!(outcome
        .conflicts
        .contains(&Conflict::TooFarAhead { max_days_ahead: 90 }));
}

#[tokio::test]
async fn past_start_time_is_rejected() {
    let clinic = TestClinic::new();
    let repo = shared(InMemoryRepo {
        schedules: clinic.full_week_schedule("00:00", "23:59"),
        ..Default::default()
    });

    let start = Utc::now() - Duration::hours(1);
    let request = clinic.booking_request(start, start + Duration::minutes(30));
    let outcome = detector(repo).validate(&request, TOKEN).await.unwrap();

    assert!(outcome
        .conflicts
        .iter()
        .any(|c| matches!(c, Conflict::PastAppointment { .. })));
}

// ==============================================================================
// OVERLAPS, BUFFERS, CAPACITY
// ==============================================================================

#[tokio::test]
async fn overlapping_appointment_is_counted() {
    let clinic = TestClinic::new();
    let repo = shared(InMemoryRepo {
        schedules: clinic.full_week_schedule("09:00", "17:00"),
        appointments: vec![clinic.appointment(clinic.at(7, "10:00"), clinic.at(7, "10:30"))].into(),
        ..Default::default()
    });

    let request = clinic.booking_request(clinic.at(7, "10:15"), clinic.at(7, "10:45"));
    let outcome = detector(repo).validate(&request, TOKEN).await.unwrap();

    assert_eq!(
        outcome.conflicts,
        vec![Conflict::AppointmentOverlap { conflict_count: 1 }]
    );
}

#[tokio::test]
async fn back_to_back_appointments_do_not_overlap() {
    let clinic = TestClinic::new();
    let repo = shared(InMemoryRepo {
        schedules: clinic.full_week_schedule("09:00", "17:00"),
        appointments: vec![clinic.appointment(clinic.at(7, "10:00"), clinic.at(7, "10:30"))].into(),
        ..Default::default()
    });

    let request = clinic.booking_request(clinic.at(7, "10:30"), clinic.at(7, "11:00"));
    let outcome = detector(repo).validate(&request, TOKEN).await.unwrap();

    assert!(outcome.is_bookable());
}

#[tokio::test]
async fn cancelled_appointments_do_not_block_the_calendar() {
    let clinic = TestClinic::new();
    let mut existing = clinic.appointment(clinic.at(7, "10:00"), clinic.at(7, "10:30"));
    existing.status = scheduling_cell::models::AppointmentStatus::Cancelled;
    let repo = shared(InMemoryRepo {
        schedules: clinic.full_week_schedule("09:00", "17:00"),
        appointments: vec![existing].into(),
        ..Default::default()
    });

    let request = clinic.booking_request(clinic.at(7, "10:15"), clinic.at(7, "10:45"));
    let outcome = detector(repo).validate(&request, TOKEN).await.unwrap();

    assert!(outcome.is_bookable());
}

#[tokio::test]
async fn candidate_inside_pre_buffer_is_rejected() {
    let clinic = TestClinic::new();
    let mut rules = support::default_rules(&clinic);
    rules.pre_buffer_minutes = 15;
    let repo = shared(InMemoryRepo {
        schedules: clinic.full_week_schedule("09:00", "17:00"),
        rules: vec![rules],
        appointments: vec![clinic.appointment(clinic.at(7, "09:30"), clinic.at(7, "10:00"))].into(),
        ..Default::default()
    });

    let request = clinic.booking_request(clinic.at(7, "10:10"), clinic.at(7, "10:40"));
    let outcome = detector(repo).validate(&request, TOKEN).await.unwrap();

    assert_eq!(
        outcome.conflicts,
        vec![Conflict::PreBufferConflict { buffer_minutes: 15 }]
    );
}

#[tokio::test]
async fn candidate_inside_post_buffer_is_rejected() {
    let clinic = TestClinic::new();
    let mut rules = support::default_rules(&clinic);
    rules.post_buffer_minutes = 15;
    let repo = shared(InMemoryRepo {
        schedules: clinic.full_week_schedule("09:00", "17:00"),
        rules: vec![rules],
        appointments: vec![clinic.appointment(clinic.at(7, "11:00"), clinic.at(7, "11:30"))].into(),
        ..Default::default()
    });

    // Ends at 10:50; the next appointment starts 10 minutes later.
    let request = clinic.booking_request(clinic.at(7, "10:20"), clinic.at(7, "10:50"));
    let outcome = detector(repo).validate(&request, TOKEN).await.unwrap();

    assert_eq!(
        outcome.conflicts,
        vec![Conflict::PostBufferConflict { buffer_minutes: 15 }]
    );
}

#[tokio::test]
async fn hourly_capacity_limit_is_enforced() {
    let clinic = TestClinic::new();
    let mut schedules = clinic.full_week_schedule("09:00", "17:00");
    for row in &mut schedules {
        row.max_appointments_per_hour = Some(2);
    }
    let repo = shared(InMemoryRepo {
        schedules,
        appointments: vec![
            clinic.appointment(clinic.at(7, "10:00"), clinic.at(7, "10:15")),
            clinic.appointment(clinic.at(7, "10:20"), clinic.at(7, "10:35")),
        ]
        .into(),
        ..Default::default()
    });

    let request = clinic.booking_request(clinic.at(7, "10:40"), clinic.at(7, "10:55"));
    let outcome = detector(repo).validate(&request, TOKEN).await.unwrap();

    assert_eq!(
        outcome.conflicts,
        vec![Conflict::HourlyCapacityExceeded {
            limit: 2,
            booked: 2,
        }]
    );
}

#[tokio::test]
async fn simultaneous_bookings_can_be_disallowed_per_service() {
    let clinic = TestClinic::new();
    let mut rules = support::default_rules(&clinic);
    rules.allow_simultaneous_bookings = false;
    let repo = shared(InMemoryRepo {
        schedules: clinic.full_week_schedule("09:00", "17:00"),
        rules: vec![rules],
        appointments: vec![clinic.appointment(clinic.at(7, "10:00"), clinic.at(7, "11:00"))].into(),
        ..Default::default()
    });

    let request = clinic.booking_request(clinic.at(7, "10:15"), clinic.at(7, "10:45"));
    let outcome = detector(repo).validate(&request, TOKEN).await.unwrap();

    assert!(outcome
        .conflicts
        .contains(&Conflict::ServiceSimultaneousNotAllowed {
            service_type_id: clinic.service_type_id,
        }));
    // The plain overlap is reported as well; checks never short-circuit.
    assert!(outcome
        .conflicts
        .contains(&Conflict::AppointmentOverlap { conflict_count: 1 }));
}

// ==============================================================================
// INPUT GUARDS
// ==============================================================================

#[tokio::test]
async fn inverted_time_range_is_an_error() {
    let clinic = TestClinic::new();
    let repo = shared(InMemoryRepo::default());

    let request = clinic.booking_request(clinic.at(7, "11:00"), clinic.at(7, "10:00"));
    let err = detector(repo).validate(&request, TOKEN).await.unwrap_err();

    assert_matches!(err, SchedulingError::InvalidTimeRange);
}

#[tokio::test]
async fn nil_identifiers_are_an_error() {
    let clinic = TestClinic::new();
    let repo = shared(InMemoryRepo::default());

    let mut request = clinic.booking_request(clinic.at(7, "10:00"), clinic.at(7, "10:30"));
    request.professional_id = uuid::Uuid::nil();
    let err = detector(repo).validate(&request, TOKEN).await.unwrap_err();

    assert_matches!(err, SchedulingError::MissingParameters(ref fields) if fields.contains("professional_id"));
}
