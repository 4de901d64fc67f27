//! Review queue and confirmation handlers.

use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::api::context::ActorContext;
use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::{ConfirmRequest, ReviewListResponse, ReviewQuery, SignUp, SkipRequest};
use crate::services::{confirmation, review};

/// List sign-ups awaiting review, highest priority first.
///
/// Missing critical fields sort first, then lowest confidence, then oldest.
#[utoipa::path(
    get,
    path = "/api/v1/review/signups",
    tag = "Review",
    params(ReviewQuery),
    responses(
        (status = 200, description = "Review queue page", body = ReviewListResponse),
        (status = 400, description = "Invalid query", body = crate::error::ErrorResponse),
    )
)]
pub async fn list_review_queue(
    pool: web::Data<DbPool>,
    query: web::Query<ReviewQuery>,
) -> AppResult<HttpResponse> {
    let response = review::list_for_review(&pool, &query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Confirm a sign-up, optionally correcting extracted fields.
#[utoipa::path(
    post,
    path = "/api/v1/review/signups/{sign_up_id}/confirm",
    tag = "Review",
    request_body = ConfirmRequest,
    params(
        ("sign_up_id" = Uuid, Path, description = "Sign-up UUID"),
        ("X-Actor-Id" = Uuid, Header, description = "Reviewer")
    ),
    responses(
        (status = 200, description = "Sign-up confirmed", body = SignUp),
        (status = 400, description = "Invalid corrections", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing actor", body = crate::error::ErrorResponse),
        (status = 404, description = "Sign-up not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Sign-up cannot be confirmed from its current state", body = crate::error::ErrorResponse),
    )
)]
pub async fn confirm_sign_up(
    actor: ActorContext,
    pool: web::Data<DbPool>,
    path: web::Path<Uuid>,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    let request: ConfirmRequest = optional_json(&body)?;
    let sign_up =
        confirmation::confirm(&pool, path.into_inner(), request, actor.actor_id, Utc::now())
            .await?;
    Ok(HttpResponse::Ok().json(sign_up))
}

/// Skip a sign-up. Skipping an already skipped sign-up updates the reason.
#[utoipa::path(
    post,
    path = "/api/v1/review/signups/{sign_up_id}/skip",
    tag = "Review",
    request_body = SkipRequest,
    params(
        ("sign_up_id" = Uuid, Path, description = "Sign-up UUID"),
        ("X-Actor-Id" = Uuid, Header, description = "Reviewer")
    ),
    responses(
        (status = 200, description = "Sign-up skipped", body = SignUp),
        (status = 401, description = "Missing actor", body = crate::error::ErrorResponse),
        (status = 404, description = "Sign-up not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Sign-up cannot be skipped from its current state", body = crate::error::ErrorResponse),
    )
)]
pub async fn skip_sign_up(
    actor: ActorContext,
    pool: web::Data<DbPool>,
    path: web::Path<Uuid>,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    let request: SkipRequest = optional_json(&body)?;
    let sign_up =
        confirmation::skip(&pool, path.into_inner(), request, actor.actor_id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(sign_up))
}

/// The resolution bodies are optional; an empty body means "no input".
fn optional_json<T: DeserializeOwned + Default>(body: &[u8]) -> AppResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(body)?)
}

/// Configure review routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/review/signups").route(web::get().to(list_review_queue)))
        .service(
            web::resource("/review/signups/{sign_up_id}/confirm")
                .route(web::post().to(confirm_sign_up)),
        )
        .service(
            web::resource("/review/signups/{sign_up_id}/skip").route(web::post().to(skip_sign_up)),
        );
}
