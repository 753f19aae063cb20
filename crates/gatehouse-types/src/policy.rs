//! Engine policy configuration.

use crate::Role;
use serde::{Deserialize, Serialize};

/// Which issuers may grant `Manager` through an `AssignManager` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerIssuers {
    /// Only `Root`.
    #[default]
    RootOnly,
    /// `Root` or an existing `Manager`.
    RootOrManager,
}

/// How a check-out record must reference the check-in it closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutReference {
    /// The check-out may reference nothing.
    #[default]
    Loose,
    /// The check-out must reference the subject's latest check-in record.
    Strict,
}

/// Defines which rule variant the engine enforces.
///
/// Every field has a default, so a partial `[engine.policy]` table in the
/// server config is enough.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GatePolicy {
    /// Issuers allowed to grant `Manager`.
    pub manager_issuers: ManagerIssuers,
    /// Whether `AssignManager` payloads must name the `"Manager"` role.
    pub require_role_payload: bool,
    /// Whether `Manager` can be granted only once per address, ever.
    pub one_time_manager_badge: bool,
    /// Check-out reference rule.
    pub checkout_reference: CheckoutReference,
    /// Whether the subject of an `Attest` record must also be a villager.
    pub attest_requires_villager_subject: bool,
    /// Whether at most one active reply per referenced record is enforced.
    pub reply_gate: bool,
    /// The role allowed to change the title allowlist.
    pub title_admin: Role,
    /// Whether the deployer starts with every role (and checked in).
    pub bootstrap_all_roles: bool,
    /// Whether direct value transfers are accepted.
    pub payable: bool,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            manager_issuers: ManagerIssuers::RootOnly,
            require_role_payload: true,
            one_time_manager_badge: false,
            checkout_reference: CheckoutReference::Loose,
            attest_requires_villager_subject: false,
            reply_gate: true,
            title_admin: Role::Root,
            bootstrap_all_roles: false,
            payable: false,
        }
    }
}

impl GatePolicy {
    /// Returns the roles allowed to issue `AssignManager` records.
    pub fn manager_issuer_roles(&self) -> &'static [Role] {
        match self.manager_issuers {
            ManagerIssuers::RootOnly => &[Role::Root],
            ManagerIssuers::RootOrManager => &[Role::Root, Role::Manager],
        }
    }
}
