//! Sign-up intake server - Main entry point.
//!
//! Starts the Actix-web server, the extraction workers and the stuck-job sweep.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::http::header::{self, HeaderName};
use actix_web::{App, HttpServer, web};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use signup_intake_lib::api::{self, ApiDoc};
use signup_intake_lib::config::{ACTOR_ID_HEADER, Config};
use signup_intake_lib::db::DbPool;
use signup_intake_lib::middleware::RequestLogger;
use signup_intake_lib::services::{
    CommissionRates, DbCommissionRates, ExtractionWorker, HttpVisionBackend, ImageStore,
    S3ImageStore, SubmissionService, VisionBackend, VisionExtractionClient,
    start_extraction_workers, start_stuck_job_sweep,
};

/// Perform health check (for Docker healthcheck).
async fn health_check() -> bool {
    let Ok(config) = Config::from_env() else {
        return false;
    };
    match DbPool::new(&config).await {
        Ok(pool) => pool.ping().await.is_ok(),
        Err(_) => false,
    }
}

/// Log a fatal startup error and exit.
fn fatal(context: &str, err: impl std::fmt::Display) -> ! {
    error!("{}: {}", context, err);
    std::process::exit(1);
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Check for --health-check flag (used by Docker HEALTHCHECK)
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        if health_check().await {
            std::process::exit(0);
        } else {
            std::process::exit(1);
        }
    }

    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        std::process::exit(1);
    }

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL, S3 credentials and VISION_ENDPOINT must be set");
            error!("  - In production, values must not match development defaults");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Sign-up Intake Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
    }

    let pool = DbPool::new(&config)
        .await
        .unwrap_or_else(|e| fatal("Failed to initialize database", e));

    pool.run_migrations()
        .await
        .unwrap_or_else(|e| fatal("Failed to run migrations", e));
    info!("Database migrations complete");

    let images: Arc<dyn ImageStore> = Arc::new(
        S3ImageStore::new(&config.storage)
            .await
            .unwrap_or_else(|e| fatal("Failed to initialize S3 storage", e)),
    );

    let backend: Option<Arc<dyn VisionBackend>> = HttpVisionBackend::from_settings(&config.vision)
        .unwrap_or_else(|e| fatal("Failed to initialize vision client", e))
        .map(|backend| Arc::new(backend) as Arc<dyn VisionBackend>);
    if backend.is_none() {
        warn!("VISION_ENDPOINT not set - every extraction attempt will fail");
    }

    let vision = VisionExtractionClient::new(backend, images.clone(), config.vision.timeout());
    let rates: Arc<dyn CommissionRates> = Arc::new(DbCommissionRates::new(pool.clone()));
    let submission =
        SubmissionService::new(pool.clone(), rates, images, config.submission.clone());

    // Background work: extraction workers and the stuck-job sweep
    let worker = ExtractionWorker::new(pool.clone(), vision.clone());
    start_extraction_workers(worker, &config.worker);
    start_stuck_job_sweep(pool.clone(), config.worker.stuck_sweep_interval_secs);

    let bind_address = config.bind_address();
    let is_development = config.is_development();
    // base64 inflates by 4/3; leave room for the rest of the body
    let json_limit = config.submission.max_image_bytes / 3 * 4 + 64 * 1024;

    let worker_count = if is_development {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!("Starting server at http://{} ({} workers)", bind_address, cpus);
        cpus
    };

    let server = HttpServer::new(move || {
        let allowed_headers = vec![
            header::ACCEPT,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-actor-id"),
        ];
        let cors = if is_development {
            // Permissive CORS for development
            Cors::default()
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                .allowed_headers(allowed_headers)
                .max_age(3600)
        } else {
            // Restrictive CORS for production (same-origin only)
            Cors::default()
                .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                .allowed_headers(allowed_headers)
                .max_age(3600)
        };

        App::new()
            .wrap(cors)
            .wrap(RequestLogger)
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(submission.clone()))
            .app_data(web::Data::new(vision.clone()))
            .app_data(api::json_config(json_limit))
            .app_data(api::query_config())
            .service(web::scope("/api/v1").configure(api::configure_api))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    });

    info!("Actor identity is read from the {} header", ACTOR_ID_HEADER);

    server
        .workers(worker_count)
        .bind(&bind_address)?
        .run()
        .await
}
