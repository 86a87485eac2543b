use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Dues Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::players::get_payment_status,
        crate::routes::players::set_payment_status,
        crate::routes::players::get_lifecycle_status,
        crate::routes::players::set_lifecycle_status,
        crate::routes::teams::monthly_status,
        crate::routes::invalidation::snapshot,
        crate::routes::invalidation::bump,
        crate::routes::sse::public_stream,
        crate::routes::sse::team_monthly_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::payment::PaymentStatusResponse,
            crate::dto::payment::SetPaymentStatusRequest,
            crate::dto::payment::PaymentRecordResponse,
            crate::dto::payment::SetLifecycleStatusRequest,
            crate::dto::payment::LifecycleStatusResponse,
            crate::dto::monthly::TeamMonthlyStatusResponse,
            crate::dto::invalidation::InvalidationSnapshotResponse,
            crate::dto::invalidation::InvalidationBumpResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::PaymentStatusChangedEvent,
            crate::services::monthly_status::MonthlyTeamStatus,
            crate::services::monthly_status::MonthlyClassification,
            crate::state::status::UiStatus,
            crate::state::status::LifecycleStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "payments", description = "Player payment status and team roll-ups"),
        (name = "invalidation", description = "Refresh category versions for polling clients"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;
