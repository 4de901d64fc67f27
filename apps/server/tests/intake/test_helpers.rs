//! Shared helpers: in-memory database, fake collaborators and test app.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use actix_web::dev::ServiceResponse;
use actix_web::{App, test, web};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectOptions, Database, EntityTrait, QueryFilter};
use serde_json::Value;
use uuid::Uuid;

use signup_intake_lib::api;
use signup_intake_lib::config::{ACTOR_ID_HEADER, SubmissionSettings};
use signup_intake_lib::db::DbPool;
use signup_intake_lib::entity::extraction_job;
use signup_intake_lib::error::{AppError, AppResult};
use signup_intake_lib::models::{PendingJob, SignUp, SignUpChannel, SubmitSignUpRequest};
use signup_intake_lib::services::storage::image_key;
use signup_intake_lib::services::{
    CommissionRates, DbCommissionRates, ExtractionWorker, ImageStore, ProcessOutcome,
    RateLookupError, SubmissionService, VisionBackend, VisionError, VisionExtractionClient,
};

/// Default CPA used by `seed_operator`, in cents.
pub const TEST_CPA_CENTS: i64 = 2_500;

/// A few bytes that start like a PNG.
pub const TEST_IMAGE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3, 4];

/// In-memory image storage.
#[derive(Default)]
pub struct MemoryImageStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicBool,
}

impl MemoryImageStore {
    /// Make every subsequent `put` fail.
    pub fn fail_puts(&self) {
        self.fail_puts.store(true, Ordering::SeqCst);
    }

    pub fn remove(&self, image_ref: &str) {
        self.objects.lock().unwrap().remove(image_ref);
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn put(&self, data: Vec<u8>, content_type: &str) -> AppResult<String> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(AppError::Storage("bucket unavailable".to_string()));
        }
        let key = image_key(Uuid::new_v4(), content_type, Utc::now());
        self.objects.lock().unwrap().insert(key.clone(), data);
        Ok(key)
    }

    async fn get(&self, image_ref: &str) -> AppResult<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(image_ref)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Image {}", image_ref)))
    }
}

/// Vision backend that replays queued responses in order.
///
/// An empty queue answers `ServiceUnavailable`.
#[derive(Default)]
pub struct ScriptedVision {
    responses: Mutex<VecDeque<Result<Value, VisionError>>>,
    calls: AtomicUsize,
}

impl ScriptedVision {
    pub fn push_ok(&self, raw: Value) {
        self.responses.lock().unwrap().push_back(Ok(raw));
    }

    pub fn push_err(&self, err: VisionError) {
        self.responses.lock().unwrap().push_back(Err(err));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionBackend for ScriptedVision {
    async fn analyze(&self, _image: &[u8], _content_type: &str) -> Result<Value, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(VisionError::ServiceUnavailable("no scripted response".into())))
    }

    async fn health(&self) -> bool {
        true
    }
}

/// Commission lookup whose backing service is down.
pub struct UnavailableRates;

#[async_trait]
impl CommissionRates for UnavailableRates {
    async fn resolve_rate(&self, _operator_id: Uuid) -> Result<Decimal, RateLookupError> {
        Err(RateLookupError::Unavailable("rates service timed out".to_string()))
    }
}

/// Everything a test needs, wired the way `main` wires it.
pub struct TestContext {
    pub pool: DbPool,
    pub images: Arc<MemoryImageStore>,
    pub vision: Arc<ScriptedVision>,
    pub client: VisionExtractionClient,
    pub submission: SubmissionService,
    pub worker: ExtractionWorker,
}

/// Create a migrated in-memory database.
///
/// A single connection keeps the whole test on one SQLite memory database.
pub async fn create_test_pool() -> DbPool {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let conn = Database::connect(options)
        .await
        .expect("Failed to open in-memory database");
    let pool = DbPool::from_connection(conn);
    pool.run_migrations()
        .await
        .expect("Failed to run migrations");
    pool
}

pub async fn setup() -> TestContext {
    let pool = create_test_pool().await;
    let images = Arc::new(MemoryImageStore::default());
    let vision = Arc::new(ScriptedVision::default());

    let client = VisionExtractionClient::new(
        Some(vision.clone() as Arc<dyn VisionBackend>),
        images.clone(),
        Duration::from_secs(5),
    );
    let submission = SubmissionService::new(
        pool.clone(),
        Arc::new(DbCommissionRates::new(pool.clone())),
        images.clone(),
        SubmissionSettings::default(),
    );
    let worker = ExtractionWorker::new(pool.clone(), client.clone());

    TestContext {
        pool,
        images,
        vision,
        client,
        submission,
        worker,
    }
}

/// Register an operator with `TEST_CPA_CENTS`.
pub async fn seed_operator(pool: &DbPool) -> Uuid {
    let operator_id = Uuid::new_v4();
    pool.upsert_operator_rate(operator_id, TEST_CPA_CENTS, Utc::now())
        .await
        .expect("Failed to seed operator rate");
    operator_id
}

/// A valid event submission carrying a PNG bet slip.
pub fn event_request(operator_id: Uuid, email: &str) -> SubmitSignUpRequest {
    SubmitSignUpRequest {
        operator_id,
        event_id: Some(Uuid::new_v4()),
        solo_chat_id: None,
        customer_name: "Jamie Rivera".to_string(),
        customer_email: email.to_string(),
        customer_phone: Some("555-0100".to_string()),
        customer_state: Some("NJ".to_string()),
        idempotency_key: Uuid::new_v4().to_string(),
        bet_slip_image: Some(BASE64.encode(TEST_IMAGE)),
        bet_slip_content_type: Some("image/png".to_string()),
    }
}

/// Submit an event sign-up with an image at `submitted_at`.
pub async fn submit_event(
    ctx: &TestContext,
    operator_id: Uuid,
    email: &str,
    submitted_at: DateTime<Utc>,
) -> SignUp {
    ctx.submission
        .submit(
            SignUpChannel::Event,
            event_request(operator_id, email),
            Uuid::new_v4(),
            submitted_at,
        )
        .await
        .expect("Submission should succeed")
        .sign_up
}

/// The pending job of a sign-up, regardless of its backoff.
pub async fn pending_job(pool: &DbPool, sign_up_id: Uuid) -> Option<PendingJob> {
    pool.get_pending_jobs(1_000, Utc::now() + chrono::Duration::days(1))
        .await
        .expect("Failed to list pending jobs")
        .into_iter()
        .find(|job| job.sign_up_id == sign_up_id)
}

/// Pull a scheduled retry forward to now, as if its backoff had elapsed.
pub async fn make_due(pool: &DbPool, sign_up_id: Uuid) {
    let now = Utc::now();
    extraction_job::Entity::update_many()
        .col_expr(extraction_job::Column::NextAttemptAt, Expr::value(now))
        .filter(extraction_job::Column::SignUpId.eq(sign_up_id))
        .filter(extraction_job::Column::NextAttemptAt.gt(now))
        .exec(pool.connection())
        .await
        .expect("Failed to make job due");
}

/// Run one extraction attempt for a sign-up against the next scripted response.
///
/// Any pending backoff is skipped first.
pub async fn run_attempt(ctx: &TestContext, sign_up_id: Uuid) -> ProcessOutcome {
    make_due(&ctx.pool, sign_up_id).await;
    let job = pending_job(&ctx.pool, sign_up_id)
        .await
        .expect("Sign-up should have a pending job");
    ctx.worker
        .process_one(&job)
        .await
        .expect("Processing should not error")
}

/// Script a successful response and run it for `sign_up_id`.
pub async fn extract_with(ctx: &TestContext, sign_up_id: Uuid, raw: Value) -> ProcessOutcome {
    ctx.vision.push_ok(raw);
    run_attempt(ctx, sign_up_id).await
}

pub async fn reload(pool: &DbPool, sign_up_id: Uuid) -> SignUp {
    let model = pool
        .get_sign_up_by_id(sign_up_id)
        .await
        .expect("Failed to load sign-up")
        .expect("Sign-up should exist");
    SignUp::try_from(model).expect("Sign-up should convert")
}

pub async fn create_test_app(
    ctx: &TestContext,
) -> impl actix_web::dev::Service<
    actix_http::Request,
    Response = ServiceResponse,
    Error = actix_web::Error,
> {
    test::init_service(
        App::new()
            .app_data(web::Data::new(ctx.pool.clone()))
            .app_data(web::Data::new(ctx.submission.clone()))
            .app_data(web::Data::new(ctx.client.clone()))
            .app_data(api::json_config(1024 * 1024))
            .app_data(api::query_config())
            .service(web::scope("/api/v1").configure(api::configure_api)),
    )
    .await
}

/// Send a request with an actor header and return status and JSON body.
pub async fn call_json<S>(
    app: &S,
    req: test::TestRequest,
    actor_id: Option<Uuid>,
) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let req = match actor_id {
        Some(id) => req.insert_header((ACTOR_ID_HEADER, id.to_string())),
        None => req,
    };
    let resp = test::call_service(app, req.to_request()).await;
    let status = resp.status().as_u16();
    let body = test::read_body(resp).await;
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).expect("Response body should be JSON")
    };
    (status, json)
}
