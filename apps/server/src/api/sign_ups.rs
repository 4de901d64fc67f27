//! Sign-up submission and lookup handlers.

use actix_web::{HttpResponse, web};
use chrono::Utc;
use uuid::Uuid;

use crate::api::context::ActorContext;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{
    AuditLogEntry, SignUp, SignUpChannel, SubmitSignUpRequest, SubmitSignUpResponse,
};
use crate::services::SubmissionService;

/// Submit a sign-up captured at an event.
#[utoipa::path(
    post,
    path = "/api/v1/signups/event",
    tag = "Sign-ups",
    request_body = SubmitSignUpRequest,
    params(
        ("X-Actor-Id" = Uuid, Header, description = "Submitting ambassador")
    ),
    responses(
        (status = 201, description = "Sign-up created", body = SubmitSignUpResponse),
        (status = 200, description = "Idempotent replay of an earlier submission", body = SubmitSignUpResponse),
        (status = 400, description = "Validation failed", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing actor", body = crate::error::ErrorResponse),
        (status = 409, description = "Duplicate sign-up", body = crate::error::ErrorResponse),
        (status = 422, description = "Image upload or CPA lookup failed", body = crate::error::ErrorResponse),
    )
)]
pub async fn submit_event_sign_up(
    actor: ActorContext,
    service: web::Data<SubmissionService>,
    body: web::Json<SubmitSignUpRequest>,
) -> AppResult<HttpResponse> {
    submit(actor, service, body.into_inner(), SignUpChannel::Event).await
}

/// Submit a sign-up from a solo chat.
#[utoipa::path(
    post,
    path = "/api/v1/signups/solo",
    tag = "Sign-ups",
    request_body = SubmitSignUpRequest,
    params(
        ("X-Actor-Id" = Uuid, Header, description = "Submitting ambassador")
    ),
    responses(
        (status = 201, description = "Sign-up created", body = SubmitSignUpResponse),
        (status = 200, description = "Idempotent replay of an earlier submission", body = SubmitSignUpResponse),
        (status = 400, description = "Validation failed", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing actor", body = crate::error::ErrorResponse),
        (status = 409, description = "Duplicate sign-up", body = crate::error::ErrorResponse),
        (status = 422, description = "Image upload or CPA lookup failed", body = crate::error::ErrorResponse),
    )
)]
pub async fn submit_solo_sign_up(
    actor: ActorContext,
    service: web::Data<SubmissionService>,
    body: web::Json<SubmitSignUpRequest>,
) -> AppResult<HttpResponse> {
    submit(actor, service, body.into_inner(), SignUpChannel::Solo).await
}

async fn submit(
    actor: ActorContext,
    service: web::Data<SubmissionService>,
    request: SubmitSignUpRequest,
    channel: SignUpChannel,
) -> AppResult<HttpResponse> {
    let response = service
        .submit(channel, request, actor.actor_id, Utc::now())
        .await?;

    if response.is_idempotent_return {
        Ok(HttpResponse::Ok().json(response))
    } else {
        Ok(HttpResponse::Created().json(response))
    }
}

/// Get a sign-up by ID.
#[utoipa::path(
    get,
    path = "/api/v1/signups/{sign_up_id}",
    tag = "Sign-ups",
    params(
        ("sign_up_id" = Uuid, Path, description = "Sign-up UUID")
    ),
    responses(
        (status = 200, description = "Sign-up", body = SignUp),
        (status = 404, description = "Sign-up not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn get_sign_up(
    pool: web::Data<DbPool>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let sign_up_id = path.into_inner();

    let sign_up = pool
        .get_sign_up_by_id(sign_up_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sign-up {}", sign_up_id)))?;

    Ok(HttpResponse::Ok().json(SignUp::try_from(sign_up)?))
}

/// Audit trail of a sign-up, oldest first.
#[utoipa::path(
    get,
    path = "/api/v1/signups/{sign_up_id}/audit",
    tag = "Sign-ups",
    params(
        ("sign_up_id" = Uuid, Path, description = "Sign-up UUID")
    ),
    responses(
        (status = 200, description = "Ordered audit entries", body = Vec<AuditLogEntry>),
        (status = 404, description = "Sign-up not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn get_sign_up_audit(
    pool: web::Data<DbPool>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let sign_up_id = path.into_inner();

    // Verify sign-up exists
    pool.get_sign_up_by_id(sign_up_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sign-up {}", sign_up_id)))?;

    let entries: Vec<AuditLogEntry> = pool
        .list_audit_entries(sign_up_id)
        .await?
        .into_iter()
        .map(AuditLogEntry::from)
        .collect();

    Ok(HttpResponse::Ok().json(entries))
}

/// Configure sign-up routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/signups/event").route(web::post().to(submit_event_sign_up)))
        .service(web::resource("/signups/solo").route(web::post().to(submit_solo_sign_up)))
        .service(web::resource("/signups/{sign_up_id}").route(web::get().to(get_sign_up)))
        .service(
            web::resource("/signups/{sign_up_id}/audit").route(web::get().to(get_sign_up_audit)),
        );
}
