//! HTTP surface: status codes, actor header and JSON shapes.

use actix_web::test;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use super::test_helpers::*;

fn submit_body(operator_id: Uuid, email: &str, key: Uuid) -> Value {
    json!({
        "operatorId": operator_id,
        "eventId": Uuid::new_v4(),
        "customerName": "Morgan Lee",
        "customerEmail": email,
        "customerState": "PA",
        "idempotencyKey": key.to_string(),
        "betSlipImage": format!("data:image/png;base64,{}", BASE64.encode(TEST_IMAGE)),
    })
}

#[actix_rt::test]
async fn test_submit_returns_created_then_ok_on_replay() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let operator = seed_operator(&ctx.pool).await;
    let ambassador = Uuid::new_v4();
    let body = submit_body(operator, "http@example.com", Uuid::new_v4());

    let (status, first) = call_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/signups/event")
            .set_json(&body),
        Some(ambassador),
    )
    .await;
    assert_eq!(status, 201, "Submit should succeed: {:?}", first);
    assert_eq!(first["isIdempotentReturn"], json!(false));
    assert_eq!(first["signUp"]["cpaAmount"], json!("25.00"));
    assert_eq!(first["signUp"]["extractionStatus"], json!("pending"));
    assert_eq!(first["signUp"]["betSlipContentType"], json!("image/png"));
    assert_eq!(first["signUp"]["ambassadorId"], json!(ambassador));

    let (status, replay) = call_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/signups/event")
            .set_json(&body),
        Some(ambassador),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(replay["isIdempotentReturn"], json!(true));
    assert_eq!(replay["signUp"]["id"], first["signUp"]["id"]);
}

#[actix_rt::test]
async fn test_submit_error_codes() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let operator = seed_operator(&ctx.pool).await;
    let actor = Some(Uuid::new_v4());

    call_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/signups/event")
            .set_json(submit_body(operator, "taken@example.com", Uuid::new_v4())),
        actor,
    )
    .await;

    let (status, body) = call_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/signups/event")
            .set_json(submit_body(operator, "taken@example.com", Uuid::new_v4())),
        actor,
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"], json!("duplicate_detected"));

    let (status, body) = call_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/signups/event")
            .set_json(submit_body(Uuid::new_v4(), "norate@example.com", Uuid::new_v4())),
        actor,
    )
    .await;
    assert_eq!(status, 422);
    assert_eq!(body["error"], json!("cpa_lookup_failed"));

    let bad_email = submit_body(operator, "not-an-email", Uuid::new_v4());
    let (status, body) = call_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/signups/event")
            .set_json(bad_email),
        actor,
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], json!("validation_error"));

    // Event payload on the solo route
    let (status, _) = call_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/signups/solo")
            .set_json(submit_body(operator, "solo@example.com", Uuid::new_v4())),
        actor,
    )
    .await;
    assert_eq!(status, 400);

    let (status, body) = call_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/signups/event")
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{ not json"),
        actor,
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], json!("bad_request"));
}

#[actix_rt::test]
async fn test_actor_header_is_required() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let operator = seed_operator(&ctx.pool).await;

    let (status, body) = call_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/signups/event")
            .set_json(submit_body(operator, "anon@example.com", Uuid::new_v4())),
        None,
    )
    .await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], json!("unauthorized"));

    let sign_up = submit_event(&ctx, operator, "target@example.com", Utc::now()).await;
    let (status, _) = call_json(
        &app,
        test::TestRequest::post().uri(&format!("/api/v1/review/signups/{}/skip", sign_up.id)),
        None,
    )
    .await;
    assert_eq!(status, 401);

    let (status, _) = call_json(
        &app,
        test::TestRequest::post()
            .uri(&format!("/api/v1/review/signups/{}/skip", sign_up.id))
            .insert_header(("X-Actor-Id", "reviewer-7")),
        None,
    )
    .await;
    assert_eq!(status, 401);
}

#[actix_rt::test]
async fn test_review_flow_over_http() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let operator = seed_operator(&ctx.pool).await;
    let reviewer = Uuid::new_v4();

    let sign_up = submit_event(&ctx, operator, "flow@example.com", Utc::now()).await;
    extract_with(
        &ctx,
        sign_up.id,
        json!({ "betAmount": 50, "teamBetOn": "X", "confidence": 70 }),
    )
    .await;

    let (status, queue) = call_json(
        &app,
        test::TestRequest::get().uri("/api/v1/review/signups?missingFields=odds&pageSize=5"),
        Some(reviewer),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(queue["total"], json!(1));
    assert_eq!(queue["pageSize"], json!(5));
    assert_eq!(queue["items"][0]["signUp"]["id"], json!(sign_up.id));
    assert_eq!(queue["items"][0]["missingFields"], json!(["odds"]));

    let (status, _) = call_json(
        &app,
        test::TestRequest::get().uri("/api/v1/review/signups?missingFields=everything"),
        Some(reviewer),
    )
    .await;
    assert_eq!(status, 400);

    let (status, confirmed) = call_json(
        &app,
        test::TestRequest::post()
            .uri(&format!("/api/v1/review/signups/{}/confirm", sign_up.id))
            .set_json(json!({ "corrections": { "betAmount": 100, "odds": "+110" } })),
        Some(reviewer),
    )
    .await;
    assert_eq!(status, 200, "Confirm should succeed: {:?}", confirmed);
    assert_eq!(confirmed["reviewStatus"], json!("confirmed"));
    assert_eq!(confirmed["betAmount"], json!("100.00"));
    assert_eq!(confirmed["teamBetOn"], json!("X"));
    assert_eq!(confirmed["odds"], json!("+110"));
    assert_eq!(confirmed["resolvedBy"], json!(reviewer));

    // Confirmed is terminal
    let (status, body) = call_json(
        &app,
        test::TestRequest::post().uri(&format!("/api/v1/review/signups/{}/skip", sign_up.id)),
        Some(reviewer),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"], json!("invalid_state_transition"));

    let (status, audit) = call_json(
        &app,
        test::TestRequest::get().uri(&format!("/api/v1/signups/{}/audit", sign_up.id)),
        Some(reviewer),
    )
    .await;
    assert_eq!(status, 200);
    let actions: Vec<&str> = audit
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert_eq!(
        actions,
        vec![
            "sign_up_submitted",
            "extraction_job_created",
            "extraction_succeeded",
            "review_confirmed"
        ]
    );
}

#[actix_rt::test]
async fn test_skip_without_body_uses_default_reason() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let operator = seed_operator(&ctx.pool).await;

    let sign_up = submit_event(&ctx, operator, "quiet@example.com", Utc::now()).await;
    ctx.images
        .remove(sign_up.bet_slip_image_ref.as_deref().unwrap());
    run_attempt(&ctx, sign_up.id).await;

    let (status, skipped) = call_json(
        &app,
        test::TestRequest::post().uri(&format!("/api/v1/review/signups/{}/skip", sign_up.id)),
        Some(Uuid::new_v4()),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(skipped["reviewStatus"], json!("skipped"));
    assert_eq!(
        skipped["resolutionNotes"],
        json!(signup_intake_lib::models::DEFAULT_SKIP_REASON)
    );

    let (status, _) = call_json(
        &app,
        test::TestRequest::post()
            .uri(&format!("/api/v1/review/signups/{}/skip", sign_up.id))
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{\"reason\": "),
        Some(Uuid::new_v4()),
    )
    .await;
    assert_eq!(status, 400);
}

#[actix_rt::test]
async fn test_unknown_sign_up_returns_not_found() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let actor = Some(Uuid::new_v4());
    let missing = Uuid::new_v4();

    for uri in [
        format!("/api/v1/signups/{}", missing),
        format!("/api/v1/signups/{}/audit", missing),
    ] {
        let (status, body) = call_json(&app, test::TestRequest::get().uri(&uri), actor).await;
        assert_eq!(status, 404, "{} should be 404", uri);
        assert_eq!(body["error"], json!("not_found"));
    }

    let (status, _) = call_json(
        &app,
        test::TestRequest::post()
            .uri(&format!("/api/v1/review/signups/{}/confirm", missing))
            .set_json(json!({})),
        actor,
    )
    .await;
    assert_eq!(status, 404);
}

#[actix_rt::test]
async fn test_stats_and_health_endpoints() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let operator = seed_operator(&ctx.pool).await;

    let done = submit_event(&ctx, operator, "s1@example.com", Utc::now()).await;
    extract_with(
        &ctx,
        done.id,
        json!({ "betAmount": 1, "teamBetOn": "A", "odds": "+1", "confidence": 80 }),
    )
    .await;
    submit_event(&ctx, operator, "s2@example.com", Utc::now()).await;

    let (status, stats) = call_json(
        &app,
        test::TestRequest::get().uri("/api/v1/extraction/stats"),
        None,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(stats["pending"], json!(1));
    assert_eq!(stats["completed"], json!(1));
    assert_eq!(stats["failed"], json!(0));
    assert_eq!(stats["avgConfidence"], json!(80.0));

    let (status, _) = call_json(&app, test::TestRequest::get().uri("/api/v1/health"), None).await;
    assert_eq!(status, 200);

    let (status, ready) = call_json(&app, test::TestRequest::get().uri("/api/v1/ready"), None).await;
    assert_eq!(status, 200);
    assert_eq!(ready["database"], json!("connected"));

    let (status, vision) =
        call_json(&app, test::TestRequest::get().uri("/api/v1/health/vision"), None).await;
    assert_eq!(status, 200);
    assert_eq!(vision["available"], json!(true));
}
