//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, error, models, services};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sign-up Intake Server",
        version = "0.1.0",
        description = "Bet-slip sign-up submission, asynchronous AI extraction and human review"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        api::health::vision_health,
        // Sign-up endpoints
        api::sign_ups::submit_event_sign_up,
        api::sign_ups::submit_solo_sign_up,
        api::sign_ups::get_sign_up,
        api::sign_ups::get_sign_up_audit,
        // Review endpoints
        api::review::list_review_queue,
        api::review::confirm_sign_up,
        api::review::skip_sign_up,
        // Extraction endpoints
        api::extraction::job_stats,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            // Health
            api::health::HealthResponse,
            api::health::ReadyResponse,
            services::VisionHealth,
            // Sign-ups
            models::ExtractionStatus,
            models::ReviewStatus,
            models::SignUpChannel,
            models::SignUp,
            models::SubmitSignUpRequest,
            models::SubmitSignUpResponse,
            models::AuditLogEntry,
            models::AuditAction,
            // Extraction
            models::JobStatus,
            models::JobStats,
            models::FieldConfidence,
            models::ExtractionDetails,
            // Review
            models::MissingField,
            models::ReviewQuery,
            models::ReviewItem,
            models::ReviewListResponse,
            models::Corrections,
            models::ConfirmRequest,
            models::SkipRequest,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Sign-ups", description = "Sign-up submission and lookup"),
        (name = "Review", description = "Review queue and confirmation workflow"),
        (name = "Extraction", description = "Extraction queue monitoring")
    ),
    modifiers(&ActorAddon)
)]
pub struct ApiDoc;

/// Document the forwarded actor header.
struct ActorAddon;

impl utoipa::Modify for ActorAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "actor_id",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new(
                            crate::config::ACTOR_ID_HEADER,
                        ),
                    ),
                ),
            );
        }
    }
}
