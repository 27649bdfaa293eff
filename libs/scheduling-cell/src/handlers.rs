// libs/scheduling-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    BookingOutcome, BookingRequest, CancelAppointmentRequest, RescheduleRequestBody,
    SuggestSlotsRequest,
};
use crate::repositories::supabase::SupabaseRepositories;
use crate::services::booking::BookingService;
use crate::services::cancellation::CancellationService;
use crate::services::recommender::SlotRecommenderService;

// ==============================================================================
// SERVICE CONSTRUCTION
// ==============================================================================

fn repositories(config: &AppConfig) -> Arc<SupabaseRepositories> {
    let supabase = Arc::new(SupabaseClient::new(config));
    Arc::new(SupabaseRepositories::new(supabase))
}

/// The caller's clinic claim gates every operation: a token without one, or
/// with a different clinic than the request, gets a 403.
fn clinic_claim(user: &User) -> Result<Uuid, AppError> {
    user.clinic_id
        .ok_or_else(|| AppError::Forbidden("Token carries no clinic claim".to_string()))
}

fn authorize_clinic(user: &User, clinic_id: Uuid) -> Result<(), AppError> {
    if clinic_claim(user)? != clinic_id {
        return Err(AppError::Forbidden(
            "Cannot act on another clinic's data".to_string(),
        ));
    }
    Ok(())
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

/// Dry-run validation: returns the full conflict/warning set without writing.
#[axum::debug_handler]
pub async fn validate_booking(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookingRequest>,
) -> Result<Json<Value>, AppError> {
    authorize_clinic(&user, request.clinic_id)?;

    let repos = repositories(&config);
    let service = BookingService::new(repos.clone(), repos);
    let outcome = service.validate(&request, auth.token()).await?;

    Ok(Json(json!({
        "bookable": outcome.is_bookable(),
        "conflicts": outcome.conflicts,
        "warnings": outcome.warnings
    })))
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookingRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    authorize_clinic(&user, request.clinic_id)?;

    let repos = repositories(&config);
    let service = BookingService::new(repos.clone(), repos);

    match service.book(&request, auth.token()).await? {
        BookingOutcome::Booked {
            appointment,
            warnings,
        } => Ok((
            StatusCode::CREATED,
            Json(json!({
                "appointment": appointment,
                "warnings": warnings
            })),
        )),
        BookingOutcome::Rejected(outcome) => Err(AppError::SchedulingConflict(json!({
            "conflicts": outcome.conflicts,
            "warnings": outcome.warnings
        }))),
    }
}

/// Alternative-slot search. Suggestions come back sorted by descending score.
#[axum::debug_handler]
pub async fn suggest_slots(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<SuggestSlotsRequest>,
) -> Result<Json<Value>, AppError> {
    authorize_clinic(&user, request.clinic_id)?;

    let repos = repositories(&config);
    let service =
        SlotRecommenderService::new(repos.clone(), repos, config.suggestion_budget_ms);
    let mut outcome = service.suggest(&request, auth.token()).await?;

    outcome.suggestions.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.start_time.cmp(&b.start_time))
    });

    Ok(Json(json!({
        "suggestions": outcome.suggestions,
        "search": outcome.search
    })))
}

// ==============================================================================
// CANCELLATION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let clinic_id = clinic_claim(&user)?;

    let repos = repositories(&config);
    let service =
        CancellationService::new(repos.clone(), repos.clone(), repos.clone(), repos);
    let outcome = service
        .cancel(clinic_id, appointment_id, &request, auth.token())
        .await?;

    Ok(Json(json!({
        "cancelled": true,
        "fee_applied": outcome.fee_applied,
        "fee_amount": outcome.fee_amount,
        "waitlist_promoted": outcome.waitlist_promoted
    })))
}

/// Files a reschedule request for staff review; never re-books automatically.
#[axum::debug_handler]
pub async fn request_reschedule(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleRequestBody>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let clinic_id = clinic_claim(&user)?;

    let repos = repositories(&config);
    let service =
        CancellationService::new(repos.clone(), repos.clone(), repos.clone(), repos);
    let request_id = service
        .request_reschedule(clinic_id, appointment_id, &request, auth.token())
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "request_id": request_id,
            "status": "pending_review"
        })),
    ))
}
