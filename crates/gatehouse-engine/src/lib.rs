//! Validation and dispatch for Gatehouse.
//!
//! The [`Engine`] is invoked synchronously by the ledger once per record
//! submission and once per withdrawal. It resolves the record's action from
//! the schema binding table, runs the action's rules against the current
//! stores, and either applies the resulting change set or rejects the record
//! with a [`GateError`].
//!
//! Every mutation goes through the same three steps: plan a
//! `Vec<StateChange>` against an immutable view, persist it through the
//! [`Journal`], then apply it in memory. A failure at any step leaves the
//! stores untouched.

mod admission;
pub mod payload;
mod withdrawal;

use admission::Context;
use gatehouse_state::{
    AllowedTitles, BindingKey, GateState, Journal, NullJournal, RecordEntry, StateChange,
};
use gatehouse_types::{
    Action, Address, GateError, GatePolicy, LifecycleState, RecordLedger, RecordView, Role, Uid,
};

/// The outcome of an accepted submission or withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// The record that was accepted.
    pub uid: Uid,
    /// The action its schema resolved to.
    pub action: Action,
    /// The changes that were applied, in order. Empty for pure validations.
    pub changes: Vec<StateChange>,
}

/// The access-control engine.
pub struct Engine {
    state: GateState,
    policy: GatePolicy,
    ledger_caller: Address,
    journal: Box<dyn Journal>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state)
            .field("policy", &self.policy)
            .field("ledger_caller", &self.ledger_caller)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an in-memory engine with `root` as the sole initial authority.
    pub fn new(root: Address, ledger_caller: Address, policy: GatePolicy) -> Self {
        let state = GateState::bootstrap(root, policy.bootstrap_all_roles);
        Self::from_state(state, ledger_caller, policy, Box::new(NullJournal))
    }

    /// Wraps already-restored stores.
    pub fn from_state(
        state: GateState,
        ledger_caller: Address,
        policy: GatePolicy,
        journal: Box<dyn Journal>,
    ) -> Self {
        Self {
            state,
            policy,
            ledger_caller,
            journal,
        }
    }

    /// Replaces the journal.
    pub fn with_journal(mut self, journal: Box<dyn Journal>) -> Self {
        self.journal = journal;
        self
    }

    /// The stores.
    pub fn state(&self) -> &GateState {
        &self.state
    }

    /// The active policy.
    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    /// The only address allowed to invoke submission and withdrawal.
    pub fn ledger_caller(&self) -> Address {
        self.ledger_caller
    }

    /// Validates a record the ledger is about to commit.
    ///
    /// On success the record's state effects have been persisted and applied.
    ///
    /// # Errors
    ///
    /// Returns the first rule the record violates. State is unchanged.
    pub fn submit_record(
        &mut self,
        caller: &Address,
        view: &RecordView,
        ledger: &dyn RecordLedger,
    ) -> Result<Decision, GateError> {
        let result = self.admit(caller, view, ledger);
        match &result {
            Ok(decision) => tracing::info!(
                uid = %view.uid,
                action = %decision.action,
                changes = decision.changes.len(),
                "record admitted"
            ),
            Err(e) => tracing::debug!(uid = %view.uid, code = e.code(), "record rejected: {e}"),
        }
        result
    }

    /// Validates the withdrawal of a previously admitted record.
    ///
    /// # Errors
    ///
    /// Returns the first rule the withdrawal violates. State is unchanged.
    pub fn withdraw_record(
        &mut self,
        caller: &Address,
        view: &RecordView,
        ledger: &dyn RecordLedger,
    ) -> Result<Decision, GateError> {
        let result = self.withdraw(caller, view, ledger);
        match &result {
            Ok(decision) => tracing::info!(
                uid = %view.uid,
                action = %decision.action,
                changes = decision.changes.len(),
                "record withdrawn"
            ),
            Err(e) => tracing::debug!(uid = %view.uid, code = e.code(), "withdrawal rejected: {e}"),
        }
        result
    }

    fn admit(
        &mut self,
        caller: &Address,
        view: &RecordView,
        ledger: &dyn RecordLedger,
    ) -> Result<Decision, GateError> {
        self.require_ledger_caller(caller)?;
        if !view.is_open_ended() {
            return Err(GateError::InvalidExpiration(view.expiration_time));
        }
        let action = self.action_for(view);
        let changes = {
            let ctx = self.context(ledger);
            admission::plan(&ctx, action, view)?
        };
        let changes = self.commit_record(RecordEntry::Admitted { view, action }, changes)?;
        Ok(Decision {
            uid: view.uid,
            action,
            changes,
        })
    }

    fn withdraw(
        &mut self,
        caller: &Address,
        view: &RecordView,
        ledger: &dyn RecordLedger,
    ) -> Result<Decision, GateError> {
        self.require_ledger_caller(caller)?;
        let action = self.action_for(view);
        let changes = {
            let ctx = self.context(ledger);
            withdrawal::plan(&ctx, action, view)?
        };
        let changes = self.commit_record(RecordEntry::Withdrawn { uid: view.uid }, changes)?;
        Ok(Decision {
            uid: view.uid,
            action,
            changes,
        })
    }

    /// Binds `schema` (optionally qualified by an issuer role) to `action`.
    /// Binding `Action::None` removes the binding.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Unauthorized`] unless `caller` holds `Root`.
    pub fn bind_schema(
        &mut self,
        caller: &Address,
        schema: Uid,
        role: Option<Role>,
        action: Action,
    ) -> Result<Vec<StateChange>, GateError> {
        self.require(Role::Root, caller)?;
        if self.state.bindings().resolve(schema, role) == action {
            return Ok(Vec::new());
        }
        let changes = self.commit(vec![StateChange::Bind {
            key: BindingKey { schema, role },
            action,
        }])?;
        tracing::info!(%schema, role = ?role, %action, "schema bound");
        Ok(changes)
    }

    /// Enables or disables an attestation title.
    ///
    /// # Errors
    ///
    /// - [`GateError::Unauthorized`] unless `caller` holds the title-admin role.
    /// - [`GateError::InvalidAttestationTitle`] for an empty title.
    pub fn set_title(
        &mut self,
        caller: &Address,
        title: &str,
        valid: bool,
    ) -> Result<Vec<StateChange>, GateError> {
        self.require(self.policy.title_admin, caller)?;
        if title.is_empty() {
            return Err(GateError::InvalidAttestationTitle(
                "title cannot be empty".to_string(),
            ));
        }
        if self.state.titles().is_allowed(title) == valid {
            return Ok(Vec::new());
        }
        let changes = self.commit(vec![StateChange::SetTitle {
            title: title.to_string(),
            valid,
        }])?;
        tracing::info!(title, valid, "title updated");
        Ok(changes)
    }

    /// Grants `role` to `account` outside the record flow.
    ///
    /// Granting a role the account already holds is a no-op.
    ///
    /// # Errors
    ///
    /// - [`GateError::Unauthorized`] unless `caller` administers `role`.
    /// - [`GateError::InvalidRole`] for `Villager`, which follows the lifecycle.
    pub fn grant_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: Address,
    ) -> Result<Vec<StateChange>, GateError> {
        Self::reject_lifecycle_role(role)?;
        let planned = self.state.roles().plan_grant(caller, role, account)?;
        let changes = self.commit(planned.into_iter().collect())?;
        tracing::info!(%role, %account, applied = !changes.is_empty(), "role granted");
        Ok(changes)
    }

    /// Revokes `role` from `account` outside the record flow.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::grant_role`].
    pub fn revoke_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: Address,
    ) -> Result<Vec<StateChange>, GateError> {
        Self::reject_lifecycle_role(role)?;
        let planned = self.state.roles().plan_revoke(caller, role, account)?;
        let changes = self.commit(planned.into_iter().collect())?;
        tracing::info!(%role, %account, applied = !changes.is_empty(), "role revoked");
        Ok(changes)
    }

    /// Handles a bare value transfer to the engine.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::NotPayable`] unless the policy accepts payments.
    pub fn receive_value(&self, from: &Address, amount: u128) -> Result<(), GateError> {
        if !self.policy.payable {
            tracing::debug!(%from, amount, "value transfer refused");
            return Err(GateError::NotPayable);
        }
        tracing::info!(%from, amount, "value received");
        Ok(())
    }

    /// Returns `true` if `account` holds `role`.
    pub fn has_role(&self, role: Role, account: &Address) -> bool {
        self.state.roles().has_role(role, account)
    }

    /// Every member of `role`.
    pub fn members(&self, role: Role) -> Vec<Address> {
        self.state.roles().members(role).copied().collect()
    }

    /// Resolves an exact binding key.
    pub fn resolve_binding(&self, schema: Uid, role: Option<Role>) -> Action {
        self.state.bindings().resolve(schema, role)
    }

    /// Every bound key, in key order.
    pub fn bindings(&self) -> Vec<(BindingKey, Action)> {
        self.state
            .bindings()
            .entries()
            .map(|(key, action)| (*key, *action))
            .collect()
    }

    /// Returns `true` if `title` is currently enabled.
    pub fn is_title_allowed(&self, title: &str) -> bool {
        self.state.titles().is_allowed(title)
    }

    /// Returns `true` if `title` was ever enabled, even if disabled since.
    pub fn is_title_registered(&self, title: &str) -> bool {
        self.state.titles().is_registered(title)
    }

    /// Lists the enabled titles in registration order.
    pub fn list_allowed_titles(&self) -> AllowedTitles<'_> {
        self.state.titles().list_allowed()
    }

    /// The lifecycle state of `account`.
    pub fn lifecycle_state(&self, account: &Address) -> LifecycleState {
        self.state.lifecycle().state(account)
    }

    /// Returns `true` if `target` has an active reply.
    pub fn has_active_reply(&self, target: &Uid) -> bool {
        self.state.lifecycle().has_active_reply(target)
    }

    /// Resolves the action of `view` for its issuer's current roles.
    pub fn action_for(&self, view: &RecordView) -> Action {
        let roles = self.state.roles().roles_of(&view.issuer);
        self.state.bindings().resolve_for_roles(view.schema, &roles)
    }

    fn context<'a>(&'a self, ledger: &'a dyn RecordLedger) -> Context<'a> {
        Context {
            state: &self.state,
            policy: &self.policy,
            ledger,
        }
    }

    fn require_ledger_caller(&self, caller: &Address) -> Result<(), GateError> {
        if *caller == self.ledger_caller {
            Ok(())
        } else {
            Err(GateError::unauthorized(format!(
                "{caller} is not the trusted ledger"
            )))
        }
    }

    fn require(&self, role: Role, caller: &Address) -> Result<(), GateError> {
        if self.state.roles().has_role(role, caller) {
            Ok(())
        } else {
            Err(GateError::unauthorized(format!("{caller} does not hold {role}")))
        }
    }

    fn reject_lifecycle_role(role: Role) -> Result<(), GateError> {
        if role == Role::Villager {
            return Err(GateError::InvalidRole(format!(
                "{role} membership follows check-in and check-out"
            )));
        }
        Ok(())
    }

    fn commit(&mut self, changes: Vec<StateChange>) -> Result<Vec<StateChange>, GateError> {
        if changes.is_empty() {
            return Ok(changes);
        }
        self.journal
            .persist(&changes)
            .map_err(|e| GateError::Journal(e.to_string()))?;
        self.state.apply(&changes);
        Ok(changes)
    }

    /// Like [`Engine::commit`], but the journal also records the decision
    /// itself, even when it changes nothing.
    fn commit_record(
        &mut self,
        entry: RecordEntry<'_>,
        changes: Vec<StateChange>,
    ) -> Result<Vec<StateChange>, GateError> {
        self.journal
            .persist_record(entry, &changes)
            .map_err(|e| GateError::Journal(e.to_string()))?;
        self.state.apply(&changes);
        Ok(changes)
    }
}
