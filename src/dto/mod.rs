use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod health;
pub mod invalidation;
pub mod monthly;
pub mod payment;
pub mod sse;

pub(crate) fn format_timestamp(time: OffsetDateTime) -> String {
    time.format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
