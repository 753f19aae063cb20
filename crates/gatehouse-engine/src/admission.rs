//! Per-action admission rules.
//!
//! Each rule reads the stores through a [`Context`] and returns the change
//! set the record would cause. Nothing here mutates state.

use crate::payload;
use gatehouse_state::{transition, GateState, StateChange};
use gatehouse_types::{
    Action, Address, CheckStatus, CheckoutReference, GateError, GatePolicy, RecordLedger,
    RecordView, Role, Uid,
};

/// Read-only inputs shared by admission and withdrawal rules.
pub(crate) struct Context<'a> {
    pub(crate) state: &'a GateState,
    pub(crate) policy: &'a GatePolicy,
    pub(crate) ledger: &'a dyn RecordLedger,
}

impl Context<'_> {
    pub(crate) fn require_role(&self, role: Role, account: &Address, who: &str) -> Result<(), GateError> {
        if self.state.roles().has_role(role, account) {
            Ok(())
        } else {
            Err(GateError::unauthorized(format!("{who} {account} does not hold {role}")))
        }
    }

    /// Looks up a previously committed record.
    fn fetch(&self, uid: &Uid) -> Result<RecordView, GateError> {
        self.ledger
            .get_record(uid)
            .map_err(|e| GateError::Ledger(e.0))?
            .ok_or_else(|| GateError::InvalidRefUid(format!("record {uid} does not exist")))
    }
}

fn require_revocable(view: &RecordView, expected: bool) -> Result<(), GateError> {
    if view.revocable == expected {
        Ok(())
    } else {
        Err(GateError::InvalidRevocability { expected })
    }
}

/// Plans the admission of `view` under `action`.
pub(crate) fn plan(ctx: &Context<'_>, action: Action, view: &RecordView) -> Result<Vec<StateChange>, GateError> {
    match action {
        Action::None => Err(GateError::UnboundSchema(view.schema)),
        Action::AssignManager => assign_manager(ctx, view),
        Action::AssignVillager => assign_villager(ctx, view),
        Action::Attest => attest(ctx, view),
        Action::Reply => reply(ctx, view),
    }
}

fn assign_manager(ctx: &Context<'_>, view: &RecordView) -> Result<Vec<StateChange>, GateError> {
    let roles = ctx.state.roles();
    if !roles.has_any(ctx.policy.manager_issuer_roles(), &view.issuer) {
        return Err(GateError::unauthorized(format!(
            "issuer {} may not assign {}",
            view.issuer,
            Role::Manager
        )));
    }
    require_revocable(view, true)?;

    if ctx.policy.require_role_payload {
        let name = payload::decode_role_name(&view.payload)?;
        if name != "Manager" {
            return Err(GateError::InvalidRole(name));
        }
    }
    if roles.has_role(Role::Manager, &view.subject) {
        return Err(GateError::AlreadyHasRole(Role::Manager));
    }

    let badged = roles.has_manager_badge(&view.subject);
    if ctx.policy.one_time_manager_badge && badged {
        return Err(GateError::BadgeAlreadyIssued);
    }

    let mut changes = vec![StateChange::GrantRole {
        role: Role::Manager,
        account: view.subject,
    }];
    if !badged {
        changes.push(StateChange::IssueManagerBadge {
            account: view.subject,
        });
    }
    Ok(changes)
}

fn assign_villager(ctx: &Context<'_>, view: &RecordView) -> Result<Vec<StateChange>, GateError> {
    require_revocable(view, false)?;
    let status = payload::decode_status(&view.payload)?;

    let current = ctx.state.lifecycle().state(&view.subject);
    let next = transition(current, status)?;

    match status {
        CheckStatus::CheckIn => {
            ctx.require_role(Role::Manager, &view.issuer, "check-in issuer")?;
            Ok(vec![
                StateChange::SetLifecycle {
                    account: view.subject,
                    state: next,
                    check_in: Some(view.uid),
                },
                StateChange::GrantRole {
                    role: Role::Villager,
                    account: view.subject,
                },
            ])
        }
        CheckStatus::CheckOut => {
            let is_self = view.issuer == view.subject;
            if !is_self && !ctx.state.roles().has_role(Role::Manager, &view.issuer) {
                return Err(GateError::unauthorized(format!(
                    "{} may not check out {}",
                    view.issuer, view.subject
                )));
            }
            if ctx.policy.checkout_reference == CheckoutReference::Strict {
                check_out_reference(ctx, view)?;
            }
            Ok(vec![
                StateChange::SetLifecycle {
                    account: view.subject,
                    state: next,
                    check_in: None,
                },
                StateChange::RevokeRole {
                    role: Role::Villager,
                    account: view.subject,
                },
            ])
        }
    }
}

/// A strict check-out must reference the check-in that admitted its subject.
///
/// A subject checked in at genesis has no check-in record; its check-out
/// must carry no reference.
fn check_out_reference(ctx: &Context<'_>, view: &RecordView) -> Result<(), GateError> {
    let active = ctx.state.lifecycle().check_in_record(&view.subject);
    let Some(reference) = view.reference() else {
        if active.is_none() {
            return Ok(());
        }
        return Err(GateError::InvalidRefUid(
            "check-out must reference a check-in".to_string(),
        ));
    };
    if active != Some(reference) {
        return Err(GateError::InvalidRefUid(format!(
            "{reference} is not the active check-in of {}",
            view.subject
        )));
    }
    let check_in = ctx.fetch(&reference)?;
    if check_in.subject != view.subject {
        return Err(GateError::InvalidRefUid(format!(
            "{reference} concerns {}, not {}",
            check_in.subject, view.subject
        )));
    }
    Ok(())
}

fn attest(ctx: &Context<'_>, view: &RecordView) -> Result<Vec<StateChange>, GateError> {
    require_revocable(view, false)?;
    ctx.require_role(Role::Villager, &view.issuer, "attestation issuer")?;
    if ctx.policy.attest_requires_villager_subject {
        ctx.require_role(Role::Villager, &view.subject, "attestation subject")?;
    }

    let body = payload::decode_attestation(&view.payload)?;
    if !ctx.state.titles().is_allowed(&body.title) {
        return Err(GateError::InvalidAttestationTitle(body.title));
    }
    Ok(Vec::new())
}

fn reply(ctx: &Context<'_>, view: &RecordView) -> Result<Vec<StateChange>, GateError> {
    require_revocable(view, true)?;
    ctx.require_role(Role::Villager, &view.issuer, "reply issuer")?;

    let target = view
        .reference()
        .ok_or_else(|| GateError::InvalidRefUid("reply must reference a record".to_string()))?;
    let prior = ctx.fetch(&target)?;
    if prior.subject != view.issuer {
        return Err(GateError::InvalidRefUid(format!(
            "only the subject of {target} may reply to it"
        )));
    }

    if !ctx.policy.reply_gate {
        return Ok(Vec::new());
    }
    if ctx.state.lifecycle().has_active_reply(&target) {
        return Err(GateError::AlreadyHasResponse(target));
    }
    Ok(vec![StateChange::SetReplyGate {
        target,
        reply: Some(view.uid),
    }])
}
