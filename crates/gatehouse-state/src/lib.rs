//! Authoritative state stores for Gatehouse.
//!
//! Four leaf stores make up the engine's state:
//!
//! | Store | Holds |
//! |-------|-------|
//! | [`RoleRegistry`] | role memberships, admin-of relation, manager badges |
//! | [`BindingTable`] | `(schema, role?) -> Action` |
//! | [`TitleAllowlist`] | canonical title flags plus the ordered title registry |
//! | [`LifecycleTracker`] | participant check-in state and reply gates |
//!
//! They are bundled in [`GateState`], which is owned by the engine and
//! mutated only through [`GateState::apply`]. Every mutation is expressed as
//! a [`StateChange`] so the same list can be persisted by a [`Journal`],
//! logged, and replayed on restore.

mod bindings;
mod change;
mod lifecycle;
mod roles;
mod titles;

pub use bindings::{BindingKey, BindingTable};
pub use change::StateChange;
pub use lifecycle::{transition, LifecycleTracker, Participant};
pub use roles::RoleRegistry;
pub use titles::{canonicalize, AllowedTitles, TitleAllowlist, TitleKey};

use gatehouse_types::{Action, Address, LifecycleState, RecordView, Role, Uid};
use thiserror::Error;

/// Errors reported when a state snapshot violates a cross-store invariant.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// `Villager` membership and `CheckedIn` disagree for an address.
    #[error("villager membership diverges from lifecycle for {account}: villager={villager}, state={state}")]
    VillagerDivergence {
        /// The offending address.
        account: Address,
        /// Whether the address holds `Villager`.
        villager: bool,
        /// Its lifecycle state.
        state: LifecycleState,
    },
}

/// Error returned by a [`Journal`] that could not persist a change set.
#[derive(Debug, Error)]
#[error("journal error: {0}")]
pub struct JournalError(pub String);

/// The record decision a change set belongs to.
#[derive(Debug, Clone, Copy)]
pub enum RecordEntry<'a> {
    /// The ledger may commit `view`.
    Admitted {
        /// The admitted record.
        view: &'a RecordView,
        /// The action its schema resolved to.
        action: Action,
    },
    /// The ledger may withdraw the record `uid`.
    Withdrawn {
        /// The withdrawn record.
        uid: Uid,
    },
}

impl RecordEntry<'_> {
    /// The record uid.
    pub fn uid(&self) -> Uid {
        match self {
            Self::Admitted { view, .. } => view.uid,
            Self::Withdrawn { uid } => *uid,
        }
    }
}

/// Durable sink for planned change sets.
///
/// The engine calls the journal after validation and before applying a plan
/// in memory. A failed persist aborts the record or the administrative call.
pub trait Journal: Send {
    /// Persists `changes` atomically: either every change is durable or none.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if the change set could not be written.
    fn persist(&mut self, changes: &[StateChange]) -> Result<(), JournalError>;

    /// Persists the outcome of a record decision together with its changes,
    /// in one atomic write. Called for every accepted record, including ones
    /// with no changes.
    ///
    /// The default keeps no record bookkeeping and forwards non-empty change
    /// sets to [`Journal::persist`].
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if the entry or the change set could not be
    /// written. Neither is then durable.
    fn persist_record(
        &mut self,
        entry: RecordEntry<'_>,
        changes: &[StateChange],
    ) -> Result<(), JournalError> {
        let _ = entry;
        if changes.is_empty() {
            return Ok(());
        }
        self.persist(changes)
    }
}

/// A journal that keeps nothing. State lives only in memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullJournal;

impl Journal for NullJournal {
    fn persist(&mut self, _changes: &[StateChange]) -> Result<(), JournalError> {
        Ok(())
    }
}

/// The four stores, owned together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateState {
    roles: RoleRegistry,
    bindings: BindingTable,
    titles: TitleAllowlist,
    lifecycle: LifecycleTracker,
}

impl GateState {
    /// Creates empty stores.
    pub fn new() -> Self {
        Self::default()
    }

    /// Changes that establish the deployer's initial authority.
    ///
    /// The deployer always receives `Root`. With `all_roles`, it also receives
    /// `Manager` and `Villager` and is checked in, keeping the villager
    /// invariant.
    pub fn genesis(root: Address, all_roles: bool) -> Vec<StateChange> {
        let mut changes = vec![StateChange::GrantRole {
            role: Role::Root,
            account: root,
        }];
        if all_roles {
            changes.extend([
                StateChange::GrantRole {
                    role: Role::Manager,
                    account: root,
                },
                StateChange::GrantRole {
                    role: Role::Villager,
                    account: root,
                },
                StateChange::SetLifecycle {
                    account: root,
                    state: LifecycleState::CheckedIn,
                    check_in: None,
                },
            ]);
        }
        changes
    }

    /// Builds stores holding only the genesis authority.
    pub fn bootstrap(root: Address, all_roles: bool) -> Self {
        let mut state = Self::new();
        state.apply(&Self::genesis(root, all_roles));
        state
    }

    /// The role registry.
    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    /// The binding table.
    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// The title allowlist.
    pub fn titles(&self) -> &TitleAllowlist {
        &self.titles
    }

    /// The lifecycle tracker.
    pub fn lifecycle(&self) -> &LifecycleTracker {
        &self.lifecycle
    }

    /// Applies a validated change set, in order.
    pub fn apply(&mut self, changes: &[StateChange]) {
        for change in changes {
            tracing::trace!(kind = change.kind(), "applying state change");
            match change {
                StateChange::GrantRole { role, account } => {
                    self.roles.set_membership(*role, *account, true);
                }
                StateChange::RevokeRole { role, account } => {
                    self.roles.set_membership(*role, *account, false);
                }
                StateChange::IssueManagerBadge { account } => {
                    self.roles.issue_badge(*account);
                }
                StateChange::SetLifecycle {
                    account,
                    state,
                    check_in,
                } => {
                    self.lifecycle.set_state(*account, *state, *check_in);
                }
                StateChange::SetReplyGate { target, reply } => {
                    self.lifecycle.set_reply_gate(*target, *reply);
                }
                StateChange::Bind { key, action } => {
                    self.bindings.set(*key, *action);
                }
                StateChange::SetTitle { title, valid } => {
                    self.titles.set(title, *valid);
                }
            }
        }
    }

    /// Verifies that `Villager` membership and `CheckedIn` agree for every
    /// address.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::VillagerDivergence`] for the first mismatch.
    pub fn check_consistency(&self) -> Result<(), StateError> {
        for account in self.roles.members(Role::Villager) {
            let state = self.lifecycle.state(account);
            if state != LifecycleState::CheckedIn {
                return Err(StateError::VillagerDivergence {
                    account: *account,
                    villager: true,
                    state,
                });
            }
        }
        for (account, participant) in self.lifecycle.participants() {
            if participant.state == LifecycleState::CheckedIn
                && !self.roles.has_role(Role::Villager, account)
            {
                return Err(StateError::VillagerDivergence {
                    account: *account,
                    villager: false,
                    state: participant.state,
                });
            }
        }
        Ok(())
    }
}
