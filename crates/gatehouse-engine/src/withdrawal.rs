//! Withdrawal rules for revocable records.

use crate::admission::Context;
use gatehouse_state::StateChange;
use gatehouse_types::{Action, GateError, RecordView, Role};

/// Plans the withdrawal of `view`, whose schema resolves to `action`.
pub(crate) fn plan(ctx: &Context<'_>, action: Action, view: &RecordView) -> Result<Vec<StateChange>, GateError> {
    match action {
        Action::None => Err(GateError::UnboundSchema(view.schema)),
        Action::AssignManager => {
            ctx.require_role(Role::Root, &view.issuer, "manager withdrawal issuer")?;
            ctx.require_role(Role::Manager, &view.subject, "withdrawal subject")?;
            Ok(vec![StateChange::RevokeRole {
                role: Role::Manager,
                account: view.subject,
            }])
        }
        Action::Reply => withdraw_reply(ctx, view),
        Action::AssignVillager | Action::Attest => Err(GateError::NotWithdrawable(action)),
    }
}

fn withdraw_reply(ctx: &Context<'_>, view: &RecordView) -> Result<Vec<StateChange>, GateError> {
    ctx.require_role(Role::Villager, &view.issuer, "reply issuer")?;
    if !ctx.policy.reply_gate {
        return Ok(Vec::new());
    }

    let target = view
        .reference()
        .ok_or_else(|| GateError::InvalidRefUid("reply references no record".to_string()))?;
    match ctx.state.lifecycle().active_reply(&target) {
        Some(holder) if holder == view.uid => Ok(vec![StateChange::SetReplyGate {
            target,
            reply: None,
        }]),
        Some(holder) => Err(GateError::InvalidRefUid(format!(
            "gate of {target} is held by reply {holder}"
        ))),
        None => Ok(Vec::new()),
    }
}
