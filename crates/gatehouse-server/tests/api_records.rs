mod common;

use axum::http::{Method, StatusCode};
use common::*;
use gatehouse_types::{GatePolicy, Uid};
use serde_json::json;

#[tokio::test]
async fn health_reports_status() {
    let server = server(GatePolicy::default());
    let (status, body) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn check_in_and_out_over_http() {
    let server = server(GatePolicy::default());
    server.bind_all().await;
    server.appoint_manager().await;

    let check_in = server.check_in(ALICE).await;

    let (status, body) = server
        .get(&format!("/api/participants/{ALICE}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "CHECKED_IN");
    assert_eq!(body["villager"], true);

    let (status, body) = server
        .submit(json!({
            "schema": VILLAGER_SCHEMA,
            "issuer": MANAGER,
            "subject": ALICE,
            "revocable": false,
            "payload": true,
        }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "ALREADY_CHECKED_IN");

    // The subject may check themself out.
    let (status, body) = server
        .submit(json!({
            "schema": VILLAGER_SCHEMA,
            "issuer": ALICE,
            "subject": ALICE,
            "revocable": false,
            "ref_uid": check_in,
            "payload": { "status": "Check-out" },
        }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["action"], "ASSIGN_VILLAGER");
    assert_eq!(body["changes"][0]["event"], "LIFECYCLE_CHANGED");
    assert_eq!(body["changes"][0]["state"], "CHECKED_OUT");

    let (_, body) = server
        .get(&format!("/api/participants/{ALICE}"))
        .await;
    assert_eq!(body["state"], "CHECKED_OUT");
    assert_eq!(body["villager"], false);
}

#[tokio::test]
async fn rejections_map_to_status_codes() {
    let server = server(GatePolicy::default());
    server.bind(ATTEST_SCHEMA, gatehouse_types::Action::Attest).await;

    let record = json!({
        "schema": MANAGER_SCHEMA,
        "issuer": ROOT,
        "subject": MANAGER,
        "revocable": true,
        "payload": "Manager",
    });

    // Only the ledger may submit.
    let (status, body) = server
        .send(Method::POST, "/api/records", Some(ROOT), Some(record.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, body) = server.submit(record.clone()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "UNBOUND_SCHEMA");

    let (status, body) = server
        .submit(json!({
            "schema": ATTEST_SCHEMA,
            "issuer": ALICE,
            "subject": BOB,
            "revocable": false,
            "expiration_time": 1_700_000_000u64,
            "payload": { "title": "Good Person", "comment": "" },
        }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_EXPIRATION");

    let (status, _) = server
        .send(Method::POST, "/api/records", None, Some(record))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = server
        .send(
            Method::POST,
            "/api/transfers",
            Some(ALICE),
            Some(json!({ "amount": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], "NOT_PAYABLE");

    let (status, body) = server.get("/api/records/not-a-uid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");

    let (status, body) = server
        .get(&format!("/api/records/{}", Uid::new([0x99; 32])))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn accepted_records_are_mirrored_and_unique() {
    let server = server(GatePolicy::default());
    server.bind_all().await;
    server.appoint_manager().await;

    let uid = Uid::new([0x77; 32]);
    let record = json!({
        "uid": uid,
        "schema": VILLAGER_SCHEMA,
        "issuer": MANAGER,
        "subject": BOB,
        "revocable": false,
        "payload": "Check-in",
    });
    let (status, body) = server.submit(record.clone()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["uid"], uid.to_string());

    let (status, body) = server.get(&format!("/api/records/{uid}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "ASSIGN_VILLAGER");
    assert_eq!(body["record"]["subject"], BOB.to_string());
    assert!(body["withdrawn_at"].is_null());

    let (status, body) = server.submit(record).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (status, body) = server.withdraw(&uid.to_string()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "NOT_WITHDRAWABLE");
}

#[tokio::test]
async fn reply_gate_reopens_after_withdrawal() {
    let server = server(GatePolicy::default());
    server.bind_all().await;
    server.allow_title("Good Person").await;
    server.appoint_manager().await;
    server.check_in(ALICE).await;
    server.check_in(BOB).await;

    let (status, body) = server
        .submit(json!({
            "schema": ATTEST_SCHEMA,
            "issuer": BOB,
            "subject": ALICE,
            "revocable": false,
            "payload": ["Good Person", "helped at the well"],
        }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let attestation = body["uid"].as_str().unwrap().to_string();

    let reply = json!({
        "schema": REPLY_SCHEMA,
        "issuer": ALICE,
        "subject": BOB,
        "revocable": true,
        "ref_uid": attestation,
        "payload": "thanks",
    });
    let (status, body) = server.submit(reply.clone()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let first_reply = body["uid"].as_str().unwrap().to_string();

    let (_, body) = server.get(&format!("/api/replies/{attestation}")).await;
    assert_eq!(body["active"], true);

    let (status, body) = server.submit(reply.clone()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "ALREADY_HAS_RESPONSE");

    let (status, body) = server.withdraw(&first_reply).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["changes"][0]["event"], "REPLY_GATE_CLOSED");

    let (_, body) = server.get(&format!("/api/replies/{attestation}")).await;
    assert_eq!(body["active"], false);

    let (status, _) = server.withdraw(&first_reply).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = server.get(&format!("/api/records/{first_reply}")).await;
    assert!(body["withdrawn_at"].is_string());

    let (status, body) = server.submit(reply).await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn state_survives_restart() {
    let first = server(GatePolicy::default());
    first.bind_all().await;
    first.appoint_manager().await;
    let check_in = first.check_in(ALICE).await;

    let TestServer { app, pool, dir } = first;
    drop(app);
    drop(pool);

    let second = open(dir, GatePolicy::default());
    let (_, body) = second
        .get(&format!("/api/participants/{ALICE}"))
        .await;
    assert_eq!(body["state"], "CHECKED_IN");

    let (_, body) = second
        .get(&format!("/api/roles/manager/{MANAGER}"))
        .await;
    assert_eq!(body["member"], true);

    let (status, _) = second.get(&format!("/api/records/{check_in}")).await;
    assert_eq!(status, StatusCode::OK);

    // Check-out by the manager, referencing the restored check-in.
    let (status, body) = second
        .submit(json!({
            "schema": VILLAGER_SCHEMA,
            "issuer": MANAGER,
            "subject": ALICE,
            "revocable": false,
            "ref_uid": check_in,
            "payload": false,
        }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn unmirrored_admission_changes_nothing() {
    let server = server(GatePolicy::default());
    server.bind_all().await;
    server
        .pool
        .get()
        .unwrap()
        .execute_batch(
            "CREATE TRIGGER records_unavailable BEFORE INSERT ON records
             BEGIN SELECT RAISE(ABORT, 'mirror unavailable'); END;",
        )
        .unwrap();

    let (status, body) = server
        .submit(json!({
            "schema": MANAGER_SCHEMA,
            "issuer": ROOT,
            "subject": MANAGER,
            "revocable": true,
            "payload": "Manager",
        }))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "JOURNAL_FAILED");

    let (_, body) = server
        .get(&format!("/api/roles/MANAGER/{MANAGER}"))
        .await;
    assert_eq!(body["member"], false);

    let (_, body) = server.get("/api/events?domain=ADMISSION").await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["events"][0]["event_type"], "RECORD_REJECTED");
    assert_eq!(body["events"][0]["payload"]["code"], "JOURNAL_FAILED");
}

#[tokio::test]
async fn unstamped_withdrawal_changes_nothing() {
    let server = server(GatePolicy::default());
    server.bind_all().await;

    let uid = Uid::new([0x55; 32]);
    let (status, body) = server
        .submit(json!({
            "uid": uid,
            "schema": MANAGER_SCHEMA,
            "issuer": ROOT,
            "subject": MANAGER,
            "revocable": true,
            "payload": "Manager",
        }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    server
        .pool
        .get()
        .unwrap()
        .execute_batch(
            "CREATE TRIGGER records_frozen BEFORE UPDATE ON records
             BEGIN SELECT RAISE(ABORT, 'mirror unavailable'); END;",
        )
        .unwrap();

    let (status, body) = server.withdraw(&uid.to_string()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "JOURNAL_FAILED");

    let (_, body) = server
        .get(&format!("/api/roles/MANAGER/{MANAGER}"))
        .await;
    assert_eq!(body["member"], true);
    let (_, body) = server.get(&format!("/api/records/{uid}")).await;
    assert!(body["withdrawn_at"].is_null());
}
