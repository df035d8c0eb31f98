//! Store-backed integration tests.
//!
//! Exercises the guarded writes and multi-step flows against an isolated
//! test database per test, using `#[sqlx::test]` with the crate migrations:
//! the handle-claim race, identity-preserving go-live, tip resolution and
//! payout settlement, and the recording webhook replay and slug paths.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use broadcast_controller::errors::BcError;
use broadcast_controller::models::{PENDING_DJ_USER_ID, RecordingEntry, RecordingStatus};
use broadcast_controller::repositories::{
    AccountsRepository, ArchivesRepository, EgressMappingsRepository, OutboxRepository,
    SlotsRepository, TipsRepository,
};
use broadcast_controller::services::recording;
use broadcast_controller::services::{
    DestinationStatusCache, MockPaymentsClient, PayoutService, ReconcilerService,
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use secrecy::SecretString;
use sqlx::{PgPool, Row};
use tower::ServiceExt;
use uuid::Uuid;

async fn seed_account(
    pool: &PgPool,
    email: &str,
    payout_account_id: Option<&str>,
) -> Result<Uuid, anyhow::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO accounts (email, is_dj, payout_account_id)
        VALUES ($1, true, $2)
        RETURNING account_id
        "#,
    )
    .bind(email)
    .bind(payout_account_id)
    .fetch_one(pool)
    .await?;
    Ok(row.get("account_id"))
}

async fn seed_tip(
    pool: &PgPool,
    dj_email: &str,
    dj_user_id: &str,
    amount_cents: i64,
    status: &str,
) -> Result<Uuid, anyhow::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO tips (dj_email, dj_user_id, amount_cents, status)
        VALUES ($1, $2, $3, $4)
        RETURNING tip_id
        "#,
    )
    .bind(dj_email)
    .bind(dj_user_id)
    .bind(amount_cents)
    .bind(status)
    .fetch_one(pool)
    .await?;
    Ok(row.get("tip_id"))
}

async fn seed_slot(
    pool: &PgPool,
    dj_email: &str,
    show_name: &str,
    token: &str,
) -> Result<Uuid, anyhow::Error> {
    let now = Utc::now();
    let slot = SlotsRepository::create_slot(
        pool,
        dj_email,
        show_name,
        token,
        now + Duration::hours(4),
        now + Duration::hours(1),
        now + Duration::hours(3),
    )
    .await?;
    Ok(slot.slot_id)
}

/// Two concurrent claims of the same handle yield exactly one winner; the
/// loser surfaces the conflict instead of silently overwriting.
#[sqlx::test(migrations = "../../migrations")]
async fn test_handle_claim_race_single_winner(pool: PgPool) -> Result<(), anyhow::Error> {
    let first = seed_account(&pool, "first@example.com", None).await?;
    let second = seed_account(&pool, "second@example.com", None).await?;

    let (first_result, second_result) = tokio::join!(
        AccountsRepository::claim_handle(&pool, first, "night_owl"),
        AccountsRepository::claim_handle(&pool, second, "night_owl"),
    );

    let results = [first_result, second_result];
    let winners = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(BcError::HandleTaken(_))))
        .count();

    assert_eq!(winners, 1);
    assert_eq!(conflicts, 1);

    let claimed: Option<String> =
        sqlx::query("SELECT handle FROM accounts WHERE handle = 'night_owl'")
            .fetch_one(&pool)
            .await?
            .get("handle");
    assert_eq!(claimed.as_deref(), Some("night_owl"));

    Ok(())
}

/// Go-live fills an unset slot identity but never replaces a linked one.
#[sqlx::test(migrations = "../../migrations")]
async fn test_go_live_preserves_linked_identity(pool: PgPool) -> Result<(), anyhow::Error> {
    let slot_id = seed_slot(&pool, "dj@example.com", "Night Drive", "tok_identity").await?;
    let original = Uuid::new_v4();

    sqlx::query("UPDATE slots SET dj_user_id = $2 WHERE slot_id = $1")
        .bind(slot_id)
        .bind(original)
        .execute(&pool)
        .await?;

    let updated = SlotsRepository::go_live(
        &pool,
        slot_id,
        Some(Uuid::new_v4()),
        "drop_in",
        None,
        None,
        "room-1",
        Utc::now(),
    )
    .await?;

    assert_eq!(updated.dj_user_id, Some(original));

    Ok(())
}

/// Go-live sets the identity when the slot has none.
#[sqlx::test(migrations = "../../migrations")]
async fn test_go_live_fills_unset_identity(pool: PgPool) -> Result<(), anyhow::Error> {
    let slot_id = seed_slot(&pool, "dj@example.com", "Night Drive", "tok_fresh").await?;
    let caller = Uuid::new_v4();

    let updated = SlotsRepository::go_live(
        &pool,
        slot_id,
        Some(caller),
        "drop_in",
        None,
        None,
        "room-1",
        Utc::now(),
    )
    .await?;

    assert_eq!(updated.dj_user_id, Some(caller));

    Ok(())
}

/// Identity resolution only touches succeeded captures; a failed tip keeps
/// the pending sentinel and never becomes payable.
#[sqlx::test(migrations = "../../migrations")]
async fn test_resolve_pending_chunk_skips_failed_captures(
    pool: PgPool,
) -> Result<(), anyhow::Error> {
    let account_id = seed_account(&pool, "dj@example.com", None).await?;
    let succeeded =
        seed_tip(&pool, "dj@example.com", PENDING_DJ_USER_ID, 500, "succeeded").await?;
    let failed = seed_tip(&pool, "dj@example.com", PENDING_DJ_USER_ID, 300, "failed").await?;

    let resolved =
        TipsRepository::resolve_pending_chunk(&pool, "dj@example.com", account_id, 100).await?;
    assert_eq!(resolved, 1);

    let succeeded_identity: String = sqlx::query("SELECT dj_user_id FROM tips WHERE tip_id = $1")
        .bind(succeeded)
        .fetch_one(&pool)
        .await?
        .get("dj_user_id");
    assert_eq!(succeeded_identity, account_id.to_string());

    let failed_identity: String = sqlx::query("SELECT dj_user_id FROM tips WHERE tip_id = $1")
        .bind(failed)
        .fetch_one(&pool)
        .await?
        .get("dj_user_id");
    assert_eq!(failed_identity, PENDING_DJ_USER_ID);

    Ok(())
}

/// Repeated sweep passes settle each tip at most once.
#[sqlx::test(migrations = "../../migrations")]
async fn test_payout_sweep_at_most_once(pool: PgPool) -> Result<(), anyhow::Error> {
    let account_id = seed_account(&pool, "dj@example.com", Some("acct_ready")).await?;
    let tip_id = seed_tip(
        &pool,
        "dj@example.com",
        &account_id.to_string(),
        500,
        "succeeded",
    )
    .await?;

    let payments = MockPaymentsClient::new();
    let cache = DestinationStatusCache::default();

    let first = PayoutService::run_sweep(&pool, &payments, &cache).await?;
    assert_eq!(first.transferred, 1);

    let second = PayoutService::run_sweep(&pool, &payments, &cache).await?;
    assert_eq!(second.transferred, 0);

    let transfers = payments.transfers.lock().unwrap();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers.first().unwrap().idempotency_key, tip_id);
    assert_eq!(transfers.first().unwrap().destination, "acct_ready");
    drop(transfers);

    let row = sqlx::query("SELECT payout_status, transfer_id FROM tips WHERE tip_id = $1")
        .bind(tip_id)
        .fetch_one(&pool)
        .await?;
    let payout_status: String = row.get("payout_status");
    let transfer_id: Option<String> = row.get("transfer_id");
    assert_eq!(payout_status, "transferred");
    assert!(transfer_id.is_some());

    Ok(())
}

/// A tip received before the broadcaster registers becomes payable once
/// reconciliation links the account, and the next sweep transfers it.
#[sqlx::test(migrations = "../../migrations")]
async fn test_pending_tip_reconciles_then_transfers(pool: PgPool) -> Result<(), anyhow::Error> {
    seed_tip(&pool, "latecomer@example.com", PENDING_DJ_USER_ID, 750, "succeeded").await?;

    // No candidates while the identity is unresolved
    let payments = MockPaymentsClient::new();
    let cache = DestinationStatusCache::default();
    let before = PayoutService::run_sweep(&pool, &payments, &cache).await?;
    assert_eq!(before.transferred, 0);

    let account_id = seed_account(&pool, "latecomer@example.com", Some("acct_late")).await?;
    let account = AccountsRepository::find_by_id(&pool, account_id)
        .await?
        .expect("seeded account should exist");

    let summary = ReconcilerService::reconcile_account(&pool, &account).await?;
    assert_eq!(summary.tips_resolved, 1);

    // Reconciliation is idempotent
    let again = ReconcilerService::reconcile_account(&pool, &account).await?;
    assert_eq!(again.tips_resolved, 0);

    let after = PayoutService::run_sweep(&pool, &payments, &cache).await?;
    assert_eq!(after.transferred, 1);
    assert_eq!(payments.transfers.lock().unwrap().len(), 1);

    Ok(())
}

async fn post_signed_webhook(
    pool: &PgPool,
    body: &str,
) -> Result<(StatusCode, serde_json::Value), anyhow::Error> {
    let app = common::router_with_pool(pool.clone());
    let signature = recording::sign_webhook_body(
        &SecretString::from(common::WEBHOOK_SECRET),
        body.as_bytes(),
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/webhooks/recording")
                .header(header::CONTENT_TYPE, "application/json")
                .header(recording::SIGNATURE_HEADER, &signature)
                .body(Body::from(body.to_string()))?,
        )
        .await?;

    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes)?;
    Ok((status, json))
}

async fn start_recording_for(
    pool: &PgPool,
    slot_id: Uuid,
    egress_id: &str,
) -> Result<(), anyhow::Error> {
    EgressMappingsRepository::insert(pool, egress_id, slot_id).await?;
    SlotsRepository::start_recording(
        pool,
        slot_id,
        &RecordingEntry {
            egress_id: egress_id.to_string(),
            url: None,
            status: RecordingStatus::Active,
            duration_secs: None,
            started_at: Utc::now(),
        },
    )
    .await?;
    Ok(())
}

/// A replayed finish webhook is acknowledged without creating a second
/// archive, and a different slot sharing the show name gets a suffixed slug.
#[sqlx::test(migrations = "../../migrations")]
async fn test_webhook_replay_and_slug_collision(pool: PgPool) -> Result<(), anyhow::Error> {
    let slot_a = seed_slot(&pool, "a@example.com", "Late Night Jazz", "tok_a").await?;
    start_recording_for(&pool, slot_a, "EG_A").await?;

    let body_a = r#"{"egress_id":"EG_A","event_type":"egress_ended","media_location":"https://cdn.example/a.mp4","duration_ns":5400000000000}"#;

    let (status, json) = post_signed_webhook(&pool, body_a).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "processed");

    let archive = ArchivesRepository::find_by_slot(&pool, slot_a)
        .await?
        .expect("first webhook should archive the slot");
    assert_eq!(archive.slug, "late-night-jazz");
    assert_eq!(archive.duration_secs, Some(5400));

    // Replay: the mapping is consumed, resolution falls back to the legacy
    // column, and the existing archive short-circuits publication.
    let (status, json) = post_signed_webhook(&pool, body_a).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "processed");

    let slugs = ArchivesRepository::find_slugs_for_base(&pool, "late-night-jazz").await?;
    assert_eq!(slugs.len(), 1);
    assert_eq!(OutboxRepository::fetch_pending(&pool, 10).await?.len(), 1);

    // A different slot with the same show name collides on the base slug.
    let slot_b = seed_slot(&pool, "b@example.com", "Late Night Jazz", "tok_b").await?;
    start_recording_for(&pool, slot_b, "EG_B").await?;

    let body_b = r#"{"egress_id":"EG_B","event_type":"egress_ended","media_location":"https://cdn.example/b.mp4","duration_ns":3600000000000}"#;
    let (status, json) = post_signed_webhook(&pool, body_b).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "processed");

    let archive_b = ArchivesRepository::find_by_slot(&pool, slot_b)
        .await?
        .expect("second slot should archive under a suffixed slug");
    assert_eq!(archive_b.slug, "late-night-jazz-2");

    Ok(())
}
