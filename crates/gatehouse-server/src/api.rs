//! Record and administration handlers.
//!
//! Every mutating handler runs on the blocking pool, holds the engine lock
//! for the whole decision and writes the decision log before releasing it,
//! so log order matches decision order.

use crate::middleware::Caller;
use crate::{record_events, AppState};
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gatehouse_db::{get_record, DbError, SqliteLedger};
use gatehouse_engine::{Decision, Engine};
use gatehouse_observe::EventPayload;
use gatehouse_state::StateChange;
use gatehouse_types::{Action, Address, GateError, RecordView, Role, Uid};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::str::FromStr;
use std::sync::{Arc, MutexGuard};
use thiserror::Error;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Rejected(#[from] GateError),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl ApiError {
    /// Machine-readable code returned alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Rejected(e) => e.code(),
            ApiError::InternalServerError(_) => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Rejected(GateError::Unauthorized(_)) => StatusCode::FORBIDDEN,
            ApiError::Rejected(GateError::NotPayable) => StatusCode::PAYMENT_REQUIRED,
            ApiError::Rejected(GateError::Ledger(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Rejected(GateError::Journal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        ApiError::InternalServerError(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        }));

        (self.status(), body).into_response()
    }
}

pub(crate) fn db_unavailable(e: r2d2::Error) -> ApiError {
    ApiError::InternalServerError(format!("db connection failed: {}", e))
}

pub(crate) fn join_error(e: tokio::task::JoinError) -> ApiError {
    ApiError::InternalServerError(format!("task join error: {}", e))
}

pub(crate) fn lock_engine(state: &AppState) -> Result<MutexGuard<'_, Engine>, ApiError> {
    state
        .engine
        .lock()
        .map_err(|_| ApiError::InternalServerError("engine lock poisoned".to_string()))
}

/// Parses a path segment, answering `400` on failure.
pub(crate) fn parse_segment<T>(what: &str, raw: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid {what} {raw:?}: {e}")))
}

/// Runs `f` against the engine on the blocking pool.
pub(crate) async fn read_engine<T, F>(state: Arc<AppState>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Engine) -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || -> Result<T, ApiError> {
        let engine = lock_engine(&state)?;
        Ok(f(&*engine))
    })
    .await
    .map_err(join_error)?
}

/// Request body for `POST /api/records`.
///
/// Mirrors [`RecordView`]; `uid` may be omitted and is then assigned.
#[derive(Debug, Deserialize)]
pub struct SubmitRecordRequest {
    #[serde(default)]
    pub uid: Option<Uid>,
    pub schema: Uid,
    pub issuer: Address,
    pub subject: Address,
    pub revocable: bool,
    #[serde(default)]
    pub expiration_time: u64,
    #[serde(default)]
    pub ref_uid: Uid,
    #[serde(default)]
    pub payload: Value,
}

impl SubmitRecordRequest {
    fn into_view(self) -> Result<RecordView, ApiError> {
        let uid = match self.uid {
            Some(uid) if uid.is_zero() => {
                return Err(ApiError::BadRequest(
                    "record uid cannot be zero".to_string(),
                ))
            }
            Some(uid) => uid,
            None => fresh_uid(),
        };
        Ok(RecordView {
            uid,
            schema: self.schema,
            issuer: self.issuer,
            subject: self.subject,
            revocable: self.revocable,
            expiration_time: self.expiration_time,
            ref_uid: self.ref_uid,
            payload: self.payload,
        })
    }
}

fn fresh_uid() -> Uid {
    let digest = Sha256::digest(uuid::Uuid::new_v4().as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    Uid::new(bytes)
}

/// Response body for an accepted submission or withdrawal.
#[derive(Debug, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub uid: Uid,
    pub action: Action,
    /// The state changes the decision applied, as decision-log payloads.
    pub changes: Vec<EventPayload>,
}

impl From<Decision> for DecisionResponse {
    fn from(decision: Decision) -> Self {
        Self {
            uid: decision.uid,
            action: decision.action,
            changes: decision.changes.iter().map(EventPayload::from_change).collect(),
        }
    }
}

/// Response body for a mirrored record.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordResponse {
    pub record: RecordView,
    pub action: Action,
    pub created_at: String,
    pub withdrawn_at: Option<String>,
}

/// Response body for administrative changes.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChangesResponse {
    /// Empty when the call was a no-op.
    pub changes: Vec<EventPayload>,
}

fn rejected(view: &RecordView, e: &GateError) -> EventPayload {
    EventPayload::RecordRejected {
        uid: view.uid,
        schema: view.schema,
        issuer: view.issuer,
        code: e.code().to_string(),
        reason: e.to_string(),
    }
}

/// Handler for `POST /api/records`.
///
/// The engine's journal mirrors accepted records in the same transaction as
/// their state changes, so later records can reference them.
pub async fn submit_record_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(request): Json<SubmitRecordRequest>,
) -> Result<Json<DecisionResponse>, ApiError> {
    let view = request.into_view()?;

    let decision = tokio::task::spawn_blocking(move || -> Result<Decision, ApiError> {
        let conn = state.pool.get().map_err(db_unavailable)?;
        let mut engine = lock_engine(&state)?;

        if get_record(&conn, &view.uid)?.is_some() {
            return Err(ApiError::Conflict(format!(
                "record {} already exists",
                view.uid
            )));
        }

        let ledger = SqliteLedger::new(state.pool.clone());
        match engine.submit_record(&caller, &view, &ledger) {
            Ok(decision) => {
                let mut events = vec![EventPayload::RecordAdmitted {
                    uid: view.uid,
                    schema: view.schema,
                    action: decision.action,
                    issuer: view.issuer,
                    subject: view.subject,
                }];
                events.extend(decision.changes.iter().map(EventPayload::from_change));
                record_events(&conn, &events);
                Ok(decision)
            }
            Err(e) => {
                record_events(&conn, &[rejected(&view, &e)]);
                Err(ApiError::Rejected(e))
            }
        }
    })
    .await
    .map_err(join_error)??;

    Ok(Json(decision.into()))
}

/// Handler for `POST /api/records/{uid}/withdraw`.
pub async fn withdraw_record_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(uid): Path<String>,
) -> Result<Json<DecisionResponse>, ApiError> {
    let uid: Uid = parse_segment("record uid", &uid)?;

    let decision = tokio::task::spawn_blocking(move || -> Result<Decision, ApiError> {
        let conn = state.pool.get().map_err(db_unavailable)?;
        let mut engine = lock_engine(&state)?;

        let stored = get_record(&conn, &uid)?
            .ok_or_else(|| ApiError::NotFound(format!("record {}", uid)))?;
        if stored.withdrawn_at.is_some() {
            return Err(ApiError::Conflict(format!("record {} already withdrawn", uid)));
        }

        let ledger = SqliteLedger::new(state.pool.clone());
        match engine.withdraw_record(&caller, &stored.view, &ledger) {
            Ok(decision) => {
                let mut events = vec![EventPayload::RecordWithdrawn {
                    uid,
                    action: decision.action,
                }];
                events.extend(decision.changes.iter().map(EventPayload::from_change));
                record_events(&conn, &events);
                Ok(decision)
            }
            Err(e) => {
                record_events(&conn, &[rejected(&stored.view, &e)]);
                Err(ApiError::Rejected(e))
            }
        }
    })
    .await
    .map_err(join_error)??;

    Ok(Json(decision.into()))
}

/// Handler for `GET /api/records/{uid}`.
pub async fn get_record_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<Json<RecordResponse>, ApiError> {
    let uid: Uid = parse_segment("record uid", &uid)?;

    let stored = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let conn = state.pool.get().map_err(db_unavailable)?;
        get_record(&conn, &uid)?.ok_or_else(|| ApiError::NotFound(format!("record {}", uid)))
    })
    .await
    .map_err(join_error)??;

    Ok(Json(RecordResponse {
        record: stored.view,
        action: stored.action,
        created_at: stored.created_at,
        withdrawn_at: stored.withdrawn_at,
    }))
}

/// Runs an administrative engine call and logs the changes it applied.
async fn administer<F>(state: Arc<AppState>, f: F) -> Result<Json<ChangesResponse>, ApiError>
where
    F: FnOnce(&mut Engine) -> Result<Vec<StateChange>, GateError> + Send + 'static,
{
    let changes = tokio::task::spawn_blocking(move || {
        let conn = state.pool.get().map_err(db_unavailable)?;
        let mut engine = lock_engine(&state)?;
        let events: Vec<EventPayload> = f(&mut *engine)?
            .iter()
            .map(EventPayload::from_change)
            .collect();
        record_events(&conn, &events);
        Ok::<_, ApiError>(events)
    })
    .await
    .map_err(join_error)??;

    Ok(Json(ChangesResponse { changes }))
}

/// Request body for `PUT /api/admin/bindings`.
#[derive(Debug, Deserialize)]
pub struct BindSchemaRequest {
    pub schema: Uid,
    /// Qualifying issuer role; absent for the schema-wide binding.
    #[serde(default)]
    pub role: Option<Role>,
    /// `NONE` removes the binding.
    pub action: Action,
}

/// Handler for `PUT /api/admin/bindings`.
pub async fn bind_schema_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(request): Json<BindSchemaRequest>,
) -> Result<Json<ChangesResponse>, ApiError> {
    administer(state, move |engine| {
        engine.bind_schema(&caller, request.schema, request.role, request.action)
    })
    .await
}

/// Request body for `PUT /api/admin/titles`.
#[derive(Debug, Deserialize)]
pub struct SetTitleRequest {
    pub title: String,
    pub valid: bool,
}

/// Handler for `PUT /api/admin/titles`.
pub async fn set_title_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(request): Json<SetTitleRequest>,
) -> Result<Json<ChangesResponse>, ApiError> {
    administer(state, move |engine| {
        engine.set_title(&caller, &request.title, request.valid)
    })
    .await
}

/// Request body for role grants and revocations.
#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
    pub account: Address,
}

/// Handler for `POST /api/admin/roles/grant`.
pub async fn grant_role_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(request): Json<RoleRequest>,
) -> Result<Json<ChangesResponse>, ApiError> {
    administer(state, move |engine| {
        engine.grant_role(&caller, request.role, request.account)
    })
    .await
}

/// Handler for `POST /api/admin/roles/revoke`.
pub async fn revoke_role_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(request): Json<RoleRequest>,
) -> Result<Json<ChangesResponse>, ApiError> {
    administer(state, move |engine| {
        engine.revoke_role(&caller, request.role, request.account)
    })
    .await
}

/// Request body for `POST /api/transfers`.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub amount: u128,
}

/// Handler for `POST /api/transfers`.
pub async fn transfer_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<Value>, ApiError> {
    read_engine(state, move |engine| {
        engine.receive_value(&caller, request.amount)
    })
    .await??;

    Ok(Json(serde_json::json!({ "accepted": true })))
}
