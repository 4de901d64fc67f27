//! Extraction queue monitoring.

use actix_web::{HttpResponse, web};

use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::JobStats;

/// Job counts per status and mean confidence of completed extractions.
#[utoipa::path(
    get,
    path = "/api/v1/extraction/stats",
    tag = "Extraction",
    responses(
        (status = 200, description = "Queue statistics", body = JobStats),
    )
)]
pub async fn job_stats(pool: web::Data<DbPool>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(pool.job_stats().await?))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/extraction/stats").route(web::get().to(job_stats)));
}
