use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::payment::{
        LifecycleStatusResponse, PaymentRecordResponse, PaymentStatusResponse,
        SetLifecycleStatusRequest, SetPaymentStatusRequest,
    },
    error::{AppError, ServiceError},
    services::{
        payment_status_resolver,
        payment_status_writer::{self, LifecycleStatusChange, PaymentStatusChange},
        player_service,
    },
    state::{SharedState, status::MonthKey},
};

/// Routes reading and writing a player's payment state.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/players/{id}/payment-status",
            get(get_payment_status).put(set_payment_status),
        )
        .route(
            "/players/{id}/lifecycle-status",
            get(get_lifecycle_status).put(set_lifecycle_status),
        )
}

/// Resolve the best-known binary payment status of a player.
#[utoipa::path(
    get,
    path = "/players/{id}/payment-status",
    tag = "payments",
    params(("id" = Uuid, Path, description = "Player identifier")),
    responses(
        (status = 200, description = "Resolved status; `status` is null when unknown", body = PaymentStatusResponse),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn get_payment_status(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentStatusResponse>, AppError> {
    let resolved = payment_status_resolver::resolve(&state, id).await?;
    Ok(Json(PaymentStatusResponse::new(id, resolved)))
}

/// Record a payment status for the current or an explicit month.
#[utoipa::path(
    put,
    path = "/players/{id}/payment-status",
    tag = "payments",
    params(("id" = Uuid, Path, description = "Player identifier")),
    request_body = SetPaymentStatusRequest,
    responses(
        (status = 200, description = "Record written", body = PaymentRecordResponse),
        (status = 400, description = "Invalid month"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn set_payment_status(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetPaymentStatusRequest>,
) -> Result<Json<PaymentRecordResponse>, AppError> {
    payload.validate()?;
    let month = match (payload.year, payload.month) {
        (Some(year), Some(month)) => Some(MonthKey::new(year, month).ok_or_else(|| {
            ServiceError::InvalidInput(format!("invalid month {year}-{month}"))
        })?),
        _ => None,
    };

    let record = payment_status_writer::set_payment_status(
        &state,
        PaymentStatusChange {
            player_id: id,
            status: payload.status,
            actor_id: payload.actor_id,
            month,
        },
    )
    .await?;
    Ok(Json(record.into()))
}

/// Effective admin lifecycle status of a player.
#[utoipa::path(
    get,
    path = "/players/{id}/lifecycle-status",
    tag = "payments",
    params(("id" = Uuid, Path, description = "Player identifier")),
    responses(
        (status = 200, description = "Lifecycle status", body = LifecycleStatusResponse),
        (status = 404, description = "Unknown player"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn get_lifecycle_status(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LifecycleStatusResponse>, AppError> {
    let view = player_service::lifecycle_status(&state, id).await?;
    Ok(Json(view.into()))
}

/// Set the admin lifecycle status and the matching current-month record.
#[utoipa::path(
    put,
    path = "/players/{id}/lifecycle-status",
    tag = "payments",
    params(("id" = Uuid, Path, description = "Player identifier")),
    request_body = SetLifecycleStatusRequest,
    responses(
        (status = 200, description = "Record written", body = PaymentRecordResponse),
        (status = 404, description = "Unknown player"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn set_lifecycle_status(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetLifecycleStatusRequest>,
) -> Result<Json<PaymentRecordResponse>, AppError> {
    let record = payment_status_writer::set_lifecycle_status(
        &state,
        LifecycleStatusChange {
            player_id: id,
            status: payload.status,
            actor_id: payload.actor_id,
        },
    )
    .await?;
    Ok(Json(record.into()))
}
