//! Shared setup for the HTTP tests.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use gatehouse_db::{
    create_pool, restore_or_bootstrap, run_migrations, DbPool, DbRuntimeSettings, SqliteJournal,
};
use gatehouse_engine::Engine;
use gatehouse_server::{app, middleware::CALLER_HEADER, AppState};
use gatehouse_types::{Action, Address, GatePolicy, Uid};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt; // for oneshot

pub const ROOT: Address = Address::new([1; 20]);
pub const LEDGER: Address = Address::new([0xee; 20]);
pub const MANAGER: Address = Address::new([2; 20]);
pub const ALICE: Address = Address::new([3; 20]);
pub const BOB: Address = Address::new([4; 20]);

pub const MANAGER_SCHEMA: Uid = Uid::new([0x10; 32]);
pub const VILLAGER_SCHEMA: Uid = Uid::new([0x20; 32]);
pub const ATTEST_SCHEMA: Uid = Uid::new([0x30; 32]);
pub const REPLY_SCHEMA: Uid = Uid::new([0x40; 32]);

/// A router over a fresh on-disk database.
pub struct TestServer {
    pub app: Router,
    pub pool: DbPool,
    pub dir: TempDir,
}

/// Opens (or reopens) the database in `dir` and builds the router.
pub fn open(dir: TempDir, policy: GatePolicy) -> TestServer {
    let path = dir.path().join("gatehouse.db");
    let pool = create_pool(path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
    let state = {
        let mut conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
        restore_or_bootstrap(&mut conn, ROOT, policy.bootstrap_all_roles).unwrap()
    };
    let engine = Engine::from_state(
        state,
        LEDGER,
        policy,
        Box::new(SqliteJournal::new(pool.clone())),
    );
    TestServer {
        app: app(AppState::new(pool.clone(), engine)),
        pool,
        dir,
    }
}

pub fn server(policy: GatePolicy) -> TestServer {
    open(tempfile::tempdir().unwrap(), policy)
}

impl TestServer {
    /// Sends a request and returns the status and the JSON body
    /// (`Value::Null` for an empty body).
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        caller: Option<Address>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(caller) = caller {
            builder = builder.header(CALLER_HEADER, caller.to_string());
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None, None).await
    }

    /// Submits a record through the ledger caller.
    pub async fn submit(&self, record: Value) -> (StatusCode, Value) {
        self.send(Method::POST, "/api/records", Some(LEDGER), Some(record))
            .await
    }

    pub async fn withdraw(&self, uid: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            &format!("/api/records/{uid}/withdraw"),
            Some(LEDGER),
            None,
        )
        .await
    }

    pub async fn bind(&self, schema: Uid, action: Action) {
        let (status, _) = self
            .send(
                Method::PUT,
                "/api/admin/bindings",
                Some(ROOT),
                Some(json!({ "schema": schema, "action": action })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    pub async fn bind_all(&self) {
        self.bind(MANAGER_SCHEMA, Action::AssignManager).await;
        self.bind(VILLAGER_SCHEMA, Action::AssignVillager).await;
        self.bind(ATTEST_SCHEMA, Action::Attest).await;
        self.bind(REPLY_SCHEMA, Action::Reply).await;
    }

    pub async fn allow_title(&self, title: &str) {
        let (status, _) = self
            .send(
                Method::PUT,
                "/api/admin/titles",
                Some(ROOT),
                Some(json!({ "title": title, "valid": true })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    /// Appoints `MANAGER` through an `AssignManager` record.
    pub async fn appoint_manager(&self) {
        let (status, body) = self
            .submit(json!({
                "schema": MANAGER_SCHEMA,
                "issuer": ROOT,
                "subject": MANAGER,
                "revocable": true,
                "payload": { "role": "Manager" },
            }))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    /// Checks `subject` in; returns the check-in record uid.
    pub async fn check_in(&self, subject: Address) -> String {
        let (status, body) = self
            .submit(json!({
                "schema": VILLAGER_SCHEMA,
                "issuer": MANAGER,
                "subject": subject,
                "revocable": false,
                "payload": { "status": "Check-in" },
            }))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["uid"].as_str().unwrap().to_string()
    }
}
