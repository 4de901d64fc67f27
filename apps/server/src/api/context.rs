//! Request context forwarded by the authenticating gateway.

use std::future::{Ready, ready};

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use uuid::Uuid;

use crate::config::ACTOR_ID_HEADER;
use crate::error::AppError;

/// The authenticated actor making the request.
///
/// Ambassadors on the submission routes, reviewers on the review routes.
/// Authentication happens upstream; this only reads the forwarded identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorContext {
    pub actor_id: Uuid,
}

impl FromRequest for ActorContext {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(actor_from_request(req))
    }
}

fn actor_from_request(req: &HttpRequest) -> Result<ActorContext, AppError> {
    let raw = req
        .headers()
        .get(ACTOR_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", ACTOR_ID_HEADER)))?;

    let actor_id = Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::Unauthorized(format!("{} must be a UUID", ACTOR_ID_HEADER)))?;

    Ok(ActorContext { actor_id })
}
