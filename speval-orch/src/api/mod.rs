//! HTTP API handlers for speval-orch
//!
//! Authentication is out of scope; callers identify the owning user with the
//! `x-owner-id` header.

pub mod components;
pub mod evaluations;
pub mod health;
pub mod outcomes;
pub mod sse;

pub use components::component_routes;
pub use evaluations::evaluation_routes;
pub use health::health_routes;
pub use outcomes::outcome_routes;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::ApiError;

/// Header carrying the caller's owner id
pub const OWNER_HEADER: &str = "x-owner-id";

/// Owner id taken from the `x-owner-id` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerId(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(OWNER_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {} header", OWNER_HEADER)))?;

        value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(OwnerId)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid {} header", OWNER_HEADER)))
    }
}

/// Parse an external task id; anything that is not a UUID cannot exist
pub(crate) fn parse_task_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::NotFound(format!("Evaluation task {}", raw)))
}
