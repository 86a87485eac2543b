use tracing::info;

use crate::{
    error::ServiceError,
    state::{
        SharedState,
        invalidation::{RefreshCategory, Version},
    },
};

/// Bump `name` on behalf of a surface whose data is edited outside this service.
///
/// Only the built-in categories and the configured external ones are accepted,
/// so the set of tracked categories stays bounded.
pub fn bump_external(
    state: &SharedState,
    name: &str,
) -> Result<(RefreshCategory, Version), ServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::InvalidInput(
            "category name must not be empty".into(),
        ));
    }

    let category = RefreshCategory::named(name.to_owned());
    if !state.config().accepts_external_bump(&category) {
        return Err(ServiceError::InvalidInput(format!(
            "unknown refresh category `{category}`"
        )));
    }

    let version = state.invalidation().bump(&category);
    info!(%category, %version, "category invalidated externally");
    Ok((category, version))
}
