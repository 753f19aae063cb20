//! Event domains and payloads for the decision log.

use gatehouse_state::StateChange;
use gatehouse_types::{Action, Address, LifecycleState, Role, Uid};
use serde::{Deserialize, Serialize};

/// Decision log domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventDomain {
    /// Record submissions and withdrawals.
    Admission,
    /// Role memberships and manager badges.
    Roles,
    /// Check-ins, check-outs and reply gates.
    Lifecycle,
    /// Schema bindings and the title allowlist.
    Config,
}

impl EventDomain {
    /// Returns the canonical string label for this domain.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admission => "ADMISSION",
            Self::Roles => "ROLES",
            Self::Lifecycle => "LIFECYCLE",
            Self::Config => "CONFIG",
        }
    }
}

impl std::fmt::Display for EventDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventDomain {
    type Err = ParseEventDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMISSION" => Ok(Self::Admission),
            "ROLES" => Ok(Self::Roles),
            "LIFECYCLE" => Ok(Self::Lifecycle),
            "CONFIG" => Ok(Self::Config),
            _ => Err(ParseEventDomainError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown event domain string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown event domain: {0}")]
pub struct ParseEventDomainError(pub String);

/// Structured payloads, one variant per event type.
///
/// Payloads are stored as JSON in the `payload_json` column of `event_log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    // ── Admission domain ─────────────────────────────────────────────
    /// The engine accepted a record.
    RecordAdmitted {
        /// The record.
        uid: Uid,
        /// Its schema.
        schema: Uid,
        /// The resolved action.
        action: Action,
        /// Who issued it.
        issuer: Address,
        /// Who it is about.
        subject: Address,
    },

    /// The engine rejected a record.
    RecordRejected {
        /// The record.
        uid: Uid,
        /// Its schema.
        schema: Uid,
        /// Who issued it.
        issuer: Address,
        /// The rejection code.
        code: String,
        /// Human-readable reason.
        reason: String,
    },

    /// A previously admitted record was withdrawn.
    RecordWithdrawn {
        /// The record.
        uid: Uid,
        /// The resolved action.
        action: Action,
    },

    // ── Roles domain ─────────────────────────────────────────────────
    /// An address gained a role.
    RoleGranted {
        /// The role.
        role: Role,
        /// The new member.
        account: Address,
    },

    /// An address lost a role.
    RoleRevoked {
        /// The role.
        role: Role,
        /// The former member.
        account: Address,
    },

    /// The one-way manager badge was issued.
    ManagerBadgeIssued {
        /// The badge holder.
        account: Address,
    },

    // ── Lifecycle domain ─────────────────────────────────────────────
    /// A participant changed lifecycle state.
    LifecycleChanged {
        /// The participant.
        account: Address,
        /// The new state.
        state: LifecycleState,
        /// The admitting check-in record, while checked in.
        check_in: Option<Uid>,
    },

    /// A reply took the gate of a record.
    ReplyGateOpened {
        /// The record replied to.
        target: Uid,
        /// The reply holding the gate.
        reply: Uid,
    },

    /// A record's reply gate was released.
    ReplyGateClosed {
        /// The record replied to.
        target: Uid,
    },

    // ── Config domain ────────────────────────────────────────────────
    /// A schema binding changed.
    SchemaBound {
        /// The schema.
        schema: Uid,
        /// The qualifying role, if any.
        role: Option<Role>,
        /// The new action; `NONE` means unbound.
        action: Action,
    },

    /// A title was enabled or disabled.
    TitleSet {
        /// The title.
        title: String,
        /// Whether it is now enabled.
        valid: bool,
    },
}

impl EventPayload {
    /// Describes a single state change.
    pub fn from_change(change: &StateChange) -> Self {
        match change {
            StateChange::GrantRole { role, account } => Self::RoleGranted {
                role: *role,
                account: *account,
            },
            StateChange::RevokeRole { role, account } => Self::RoleRevoked {
                role: *role,
                account: *account,
            },
            StateChange::IssueManagerBadge { account } => {
                Self::ManagerBadgeIssued { account: *account }
            }
            StateChange::SetLifecycle {
                account,
                state,
                check_in,
            } => Self::LifecycleChanged {
                account: *account,
                state: *state,
                check_in: *check_in,
            },
            StateChange::SetReplyGate {
                target,
                reply: Some(reply),
            } => Self::ReplyGateOpened {
                target: *target,
                reply: *reply,
            },
            StateChange::SetReplyGate { target, reply: None } => {
                Self::ReplyGateClosed { target: *target }
            }
            StateChange::Bind { key, action } => Self::SchemaBound {
                schema: key.schema,
                role: key.role,
                action: *action,
            },
            StateChange::SetTitle { title, valid } => Self::TitleSet {
                title: title.clone(),
                valid: *valid,
            },
        }
    }

    /// Returns the canonical event type string for this payload.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RecordAdmitted { .. } => "RECORD_ADMITTED",
            Self::RecordRejected { .. } => "RECORD_REJECTED",
            Self::RecordWithdrawn { .. } => "RECORD_WITHDRAWN",
            Self::RoleGranted { .. } => "ROLE_GRANTED",
            Self::RoleRevoked { .. } => "ROLE_REVOKED",
            Self::ManagerBadgeIssued { .. } => "MANAGER_BADGE_ISSUED",
            Self::LifecycleChanged { .. } => "LIFECYCLE_CHANGED",
            Self::ReplyGateOpened { .. } => "REPLY_GATE_OPENED",
            Self::ReplyGateClosed { .. } => "REPLY_GATE_CLOSED",
            Self::SchemaBound { .. } => "SCHEMA_BOUND",
            Self::TitleSet { .. } => "TITLE_SET",
        }
    }

    /// Returns the entity type, used as the `entity_type` column.
    pub fn entity_type(&self) -> &'static str {
        match self {
            Self::RecordAdmitted { .. }
            | Self::RecordRejected { .. }
            | Self::RecordWithdrawn { .. }
            | Self::ReplyGateOpened { .. }
            | Self::ReplyGateClosed { .. } => "record",
            Self::RoleGranted { .. }
            | Self::RoleRevoked { .. }
            | Self::ManagerBadgeIssued { .. }
            | Self::LifecycleChanged { .. } => "account",
            Self::SchemaBound { .. } => "schema",
            Self::TitleSet { .. } => "title",
        }
    }

    /// Returns the entity identifier, used as the `entity_id` column.
    pub fn entity_id(&self) -> String {
        match self {
            Self::RecordAdmitted { uid, .. }
            | Self::RecordRejected { uid, .. }
            | Self::RecordWithdrawn { uid, .. } => uid.to_string(),
            Self::ReplyGateOpened { target, .. } | Self::ReplyGateClosed { target } => {
                target.to_string()
            }
            Self::RoleGranted { account, .. }
            | Self::RoleRevoked { account, .. }
            | Self::ManagerBadgeIssued { account }
            | Self::LifecycleChanged { account, .. } => account.to_string(),
            Self::SchemaBound { schema, .. } => schema.to_string(),
            Self::TitleSet { title, .. } => title.clone(),
        }
    }

    /// Returns the domain for this payload.
    pub fn domain(&self) -> EventDomain {
        match self {
            Self::RecordAdmitted { .. }
            | Self::RecordRejected { .. }
            | Self::RecordWithdrawn { .. } => EventDomain::Admission,
            Self::RoleGranted { .. } | Self::RoleRevoked { .. } | Self::ManagerBadgeIssued { .. } => {
                EventDomain::Roles
            }
            Self::LifecycleChanged { .. }
            | Self::ReplyGateOpened { .. }
            | Self::ReplyGateClosed { .. } => EventDomain::Lifecycle,
            Self::SchemaBound { .. } | Self::TitleSet { .. } => EventDomain::Config,
        }
    }
}

/// A single row from the `event_log` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedEvent {
    /// Auto-incremented row ID.
    pub id: i64,
    /// The event domain (e.g. `ADMISSION`).
    pub domain: String,
    /// The specific event type (e.g. `RECORD_ADMITTED`).
    pub event_type: String,
    /// The type of entity involved.
    pub entity_type: String,
    /// The identifier of the entity involved.
    pub entity_id: String,
    /// Monotonically increasing sequence number.
    pub seq: i64,
    /// The structured payload.
    pub payload: serde_json::Value,
    /// When the event was written, as SQLite `datetime('now')`.
    pub occurred_at: String,
}
