//! The mutation vocabulary shared by the engine, the journal and the event log.

use crate::BindingKey;
use gatehouse_types::{Action, Address, LifecycleState, Role, Uid};
use serde::{Deserialize, Serialize};

/// A single authoritative state mutation.
///
/// The engine plans a list of these against an immutable view of the
/// stores, the journal persists the list, and only then is it applied.
/// Applying a change never fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateChange {
    /// Adds `account` to `role`.
    GrantRole {
        /// The role granted.
        role: Role,
        /// The new member.
        account: Address,
    },
    /// Removes `account` from `role`.
    RevokeRole {
        /// The role revoked.
        role: Role,
        /// The former member.
        account: Address,
    },
    /// Sets the one-way "has received manager badge" flag.
    IssueManagerBadge {
        /// The badge holder.
        account: Address,
    },
    /// Moves a participant to a new lifecycle state.
    SetLifecycle {
        /// The participant.
        account: Address,
        /// The new state.
        state: LifecycleState,
        /// The check-in record that admitted the participant, when checked in.
        check_in: Option<Uid>,
    },
    /// Sets or clears the reply gate of a referenced record.
    SetReplyGate {
        /// The record being replied to.
        target: Uid,
        /// The reply now holding the gate, or `None` to clear it.
        reply: Option<Uid>,
    },
    /// Binds (or, with `Action::None`, unbinds) a schema key.
    Bind {
        /// The binding key.
        key: BindingKey,
        /// The new action.
        action: Action,
    },
    /// Enables or disables a title.
    SetTitle {
        /// The human-readable title.
        title: String,
        /// The new validity flag.
        valid: bool,
    },
}

impl StateChange {
    /// Returns the canonical kind label for this change.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GrantRole { .. } => "GRANT_ROLE",
            Self::RevokeRole { .. } => "REVOKE_ROLE",
            Self::IssueManagerBadge { .. } => "ISSUE_MANAGER_BADGE",
            Self::SetLifecycle { .. } => "SET_LIFECYCLE",
            Self::SetReplyGate { .. } => "SET_REPLY_GATE",
            Self::Bind { .. } => "BIND",
            Self::SetTitle { .. } => "SET_TITLE",
        }
    }
}
