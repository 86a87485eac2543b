/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Bumps requested by surfaces outside the service.
pub mod invalidation_service;
/// Server-sent stream of a team's monthly roll-up.
pub mod monthly_feed;
/// Team monthly roll-up of payment records.
pub mod monthly_status;
/// Best-known payment status read path.
pub mod payment_status_resolver;
/// Payment status write path.
pub mod payment_status_writer;
/// Admin lifecycle projection of a player.
pub mod player_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
