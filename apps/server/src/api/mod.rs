//! API endpoint modules.

pub mod context;
pub mod extraction;
pub mod health;
pub mod openapi;
pub mod review;
pub mod sign_ups;

use actix_web::web;

use crate::error::AppError;

pub use context::ActorContext;
pub use extraction::configure_routes as configure_extraction_routes;
pub use health::configure_health_routes;
pub use openapi::ApiDoc;
pub use review::configure_routes as configure_review_routes;
pub use sign_ups::configure_routes as configure_sign_up_routes;

/// Mount every `/api/v1` route on `cfg`.
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.configure(configure_health_routes)
        .configure(configure_sign_up_routes)
        .configure(configure_review_routes)
        .configure(configure_extraction_routes);
}

/// JSON body extractor config that reports errors in the API error format.
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into())
}

/// Query extractor config that reports errors in the API error format.
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into())
}
