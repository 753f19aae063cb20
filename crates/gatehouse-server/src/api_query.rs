//! Read-only handlers over the engine stores and the decision log.

use crate::api::{db_unavailable, join_error, parse_segment, read_engine, ApiError};
use crate::AppState;
use axum::extract::{Extension, Json, Path, Query};
use gatehouse_observe::{query_events, EventDomain, EventFilter, LoggedEvent};
use gatehouse_types::{Action, Address, LifecycleState, Role, Uid};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Response body for `GET /api/roles/{role}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RoleMembersResponse {
    pub role: Role,
    pub members: Vec<Address>,
}

/// Handler for `GET /api/roles/{role}`.
pub async fn role_members_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(role): Path<String>,
) -> Result<Json<RoleMembersResponse>, ApiError> {
    let role: Role = parse_segment("role", &role)?;
    let members = read_engine(state, move |engine| engine.members(role)).await?;
    Ok(Json(RoleMembersResponse { role, members }))
}

/// Response body for `GET /api/roles/{role}/{address}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HasRoleResponse {
    pub role: Role,
    pub address: Address,
    pub member: bool,
}

/// Handler for `GET /api/roles/{role}/{address}`.
pub async fn has_role_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((role, address)): Path<(String, String)>,
) -> Result<Json<HasRoleResponse>, ApiError> {
    let role: Role = parse_segment("role", &role)?;
    let address: Address = parse_segment("address", &address)?;
    let member = read_engine(state, move |engine| engine.has_role(role, &address)).await?;
    Ok(Json(HasRoleResponse {
        role,
        address,
        member,
    }))
}

/// Query parameters for `GET /api/bindings/{schema}`.
#[derive(Debug, Deserialize)]
pub struct BindingQuery {
    /// Qualifying role; omit for the schema-wide binding.
    pub role: Option<String>,
}

/// Response body for `GET /api/bindings/{schema}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BindingResponse {
    pub schema: Uid,
    pub role: Option<Role>,
    pub action: Action,
}

/// Response body for `GET /api/bindings`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BindingsResponse {
    /// Every bound key, ordered by schema then role.
    pub bindings: Vec<BindingResponse>,
}

/// Handler for `GET /api/bindings`.
pub async fn list_bindings_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<BindingsResponse>, ApiError> {
    let bindings = read_engine(state, |engine| engine.bindings()).await?;
    Ok(Json(BindingsResponse {
        bindings: bindings
            .into_iter()
            .map(|(key, action)| BindingResponse {
                schema: key.schema,
                role: key.role,
                action,
            })
            .collect(),
    }))
}

/// Handler for `GET /api/bindings/{schema}`.
///
/// Resolves the exact key; it does not fall back from a role-qualified
/// binding to the schema-wide one.
pub async fn resolve_binding_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(schema): Path<String>,
    Query(params): Query<BindingQuery>,
) -> Result<Json<BindingResponse>, ApiError> {
    let schema: Uid = parse_segment("schema uid", &schema)?;
    let role: Option<Role> = params
        .role
        .as_deref()
        .map(|raw| parse_segment("role", raw))
        .transpose()?;
    let action = read_engine(state, move |engine| engine.resolve_binding(schema, role)).await?;
    Ok(Json(BindingResponse {
        schema,
        role,
        action,
    }))
}

/// Response body for `GET /api/titles`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TitlesResponse {
    /// Enabled titles in registration order.
    pub titles: Vec<String>,
}

/// Handler for `GET /api/titles`.
pub async fn list_titles_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<TitlesResponse>, ApiError> {
    let titles = read_engine(state, |engine| {
        engine
            .list_allowed_titles()
            .map(str::to_string)
            .collect::<Vec<_>>()
    })
    .await?;
    Ok(Json(TitlesResponse { titles }))
}

/// Query parameters for `GET /api/titles/check`.
#[derive(Debug, Deserialize)]
pub struct TitleQuery {
    pub title: String,
}

/// Response body for `GET /api/titles/check`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TitleCheckResponse {
    pub title: String,
    pub allowed: bool,
    /// Whether the title was ever enabled. Disabled titles keep their place
    /// in the registry.
    pub registered: bool,
}

/// Handler for `GET /api/titles/check`.
pub async fn check_title_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<TitleQuery>,
) -> Result<Json<TitleCheckResponse>, ApiError> {
    let title = params.title;
    let lookup = title.clone();
    let (allowed, registered) = read_engine(state, move |engine| {
        (
            engine.is_title_allowed(&lookup),
            engine.is_title_registered(&lookup),
        )
    })
    .await?;
    Ok(Json(TitleCheckResponse {
        title,
        allowed,
        registered,
    }))
}

/// Response body for `GET /api/participants/{address}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ParticipantResponse {
    pub address: Address,
    pub state: LifecycleState,
    /// Always equal to `state == CHECKED_IN`.
    pub villager: bool,
}

/// Handler for `GET /api/participants/{address}`.
pub async fn participant_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<ParticipantResponse>, ApiError> {
    let address: Address = parse_segment("address", &address)?;
    let (lifecycle, villager) = read_engine(state, move |engine| {
        (
            engine.lifecycle_state(&address),
            engine.has_role(Role::Villager, &address),
        )
    })
    .await?;
    Ok(Json(ParticipantResponse {
        address,
        state: lifecycle,
        villager,
    }))
}

/// Response body for `GET /api/replies/{uid}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReplyResponse {
    pub target: Uid,
    pub active: bool,
}

/// Handler for `GET /api/replies/{uid}`.
pub async fn reply_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(target): Path<String>,
) -> Result<Json<ReplyResponse>, ApiError> {
    let target: Uid = parse_segment("record uid", &target)?;
    let active = read_engine(state, move |engine| engine.has_active_reply(&target)).await?;
    Ok(Json(ReplyResponse { target, active }))
}

/// Query parameters for `GET /api/events`.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Filter by event domain (e.g., `ADMISSION`, `ROLES`).
    pub domain: Option<String>,
    /// Filter by event type (e.g., `RECORD_REJECTED`).
    pub event_type: Option<String>,
    /// Filter by entity type (`record`, `account`, `schema`, `title`).
    pub entity_type: Option<String>,
    /// Filter by entity ID.
    pub entity_id: Option<String>,
    /// Return events after this sequence number.
    pub after_seq: Option<i64>,
    /// Maximum number of events to return (default: 100, max: 1000).
    pub limit: Option<i64>,
}

/// Response wrapper for paginated event retrieval.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventsResponse {
    /// The matching events in sequence order.
    pub events: Vec<LoggedEvent>,
    /// The number of events returned.
    pub count: usize,
}

/// Handler for `GET /api/events`.
pub async fn get_events_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let domain: Option<EventDomain> = params
        .domain
        .as_deref()
        .map(|raw| parse_segment("domain", raw))
        .transpose()?;

    let filter = EventFilter {
        domain,
        event_type: params.event_type,
        entity_type: params.entity_type,
        entity_id: params.entity_id,
        after_seq: params.after_seq,
        limit: Some(params.limit.unwrap_or(100).clamp(1, 1000)),
    };

    let events = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let conn = state.pool.get().map_err(db_unavailable)?;
        query_events(&conn, &filter).map_err(|e| ApiError::InternalServerError(e.to_string()))
    })
    .await
    .map_err(join_error)??;

    let count = events.len();
    Ok(Json(EventsResponse { events, count }))
}
