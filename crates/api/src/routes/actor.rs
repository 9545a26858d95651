//! Acting user extraction.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::ActorId;

use crate::error::ApiError;

/// Header carrying the authenticated user's id, set by the auth proxy.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// The user making the request, if the request names one.
///
/// A missing header yields `Actor(None)` and the operation decides whether
/// that is allowed; a malformed header is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub Option<ActorId>);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(ACTOR_HEADER) else {
            return Ok(Actor(None));
        };

        let id = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .ok_or_else(|| ApiError::bad_request(ACTOR_HEADER, "expected a numeric user id"))?;
        Ok(Actor(Some(ActorId::new(id))))
    }
}
