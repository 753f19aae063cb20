//! Participant lifecycle tracker and reply gates.

use gatehouse_types::{Address, CheckStatus, GateError, LifecycleState, Uid};
use std::collections::BTreeMap;

/// Lifecycle record for one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Participant {
    /// Current state.
    pub state: LifecycleState,
    /// The check-in record that admitted the participant, while checked in.
    pub check_in: Option<Uid>,
}

/// Per-address lifecycle state plus per-record reply gates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleTracker {
    participants: BTreeMap<Address, Participant>,
    reply_gates: BTreeMap<Uid, Uid>,
}

/// Applies the check-in/check-out state machine.
///
/// Only the lifecycle is considered here; who may issue the transition is
/// the engine's concern.
///
/// # Errors
///
/// - [`GateError::AlreadyCheckedIn`] for a check-in while checked in.
/// - [`GateError::AlreadyCheckedOut`] for a check-out while checked out.
/// - [`GateError::InvalidTransition`] for a check-out before any check-in.
pub fn transition(from: LifecycleState, status: CheckStatus) -> Result<LifecycleState, GateError> {
    match (from, status) {
        (LifecycleState::Unregistered | LifecycleState::CheckedOut, CheckStatus::CheckIn) => {
            Ok(LifecycleState::CheckedIn)
        }
        (LifecycleState::CheckedIn, CheckStatus::CheckOut) => Ok(LifecycleState::CheckedOut),
        (LifecycleState::CheckedIn, CheckStatus::CheckIn) => Err(GateError::AlreadyCheckedIn),
        (LifecycleState::CheckedOut, CheckStatus::CheckOut) => Err(GateError::AlreadyCheckedOut),
        (LifecycleState::Unregistered, CheckStatus::CheckOut) => {
            Err(GateError::InvalidTransition { from, status })
        }
    }
}

impl LifecycleTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lifecycle state of `account`.
    pub fn state(&self, account: &Address) -> LifecycleState {
        self.participants
            .get(account)
            .map(|p| p.state)
            .unwrap_or_default()
    }

    /// Returns the check-in record currently admitting `account`, if any.
    pub fn check_in_record(&self, account: &Address) -> Option<Uid> {
        self.participants.get(account).and_then(|p| p.check_in)
    }

    /// Iterates over every registered participant.
    pub fn participants(&self) -> impl Iterator<Item = (&Address, &Participant)> + '_ {
        self.participants.iter()
    }

    /// Returns `true` if `target` has an active, unrevoked reply.
    pub fn has_active_reply(&self, target: &Uid) -> bool {
        self.reply_gates.contains_key(target)
    }

    /// Returns the reply currently holding the gate of `target`.
    pub fn active_reply(&self, target: &Uid) -> Option<Uid> {
        self.reply_gates.get(target).copied()
    }

    /// Iterates over every held reply gate as `(target, reply)`.
    pub fn reply_gates(&self) -> impl Iterator<Item = (&Uid, &Uid)> + '_ {
        self.reply_gates.iter()
    }

    pub(crate) fn set_state(&mut self, account: Address, state: LifecycleState, check_in: Option<Uid>) {
        if state == LifecycleState::Unregistered {
            self.participants.remove(&account);
            return;
        }
        let check_in = match state {
            LifecycleState::CheckedIn => check_in,
            _ => None,
        };
        self.participants
            .insert(account, Participant { state, check_in });
    }

    pub(crate) fn set_reply_gate(&mut self, target: Uid, reply: Option<Uid>) {
        match reply {
            Some(reply) => {
                self.reply_gates.insert(target, reply);
            }
            None => {
                self.reply_gates.remove(&target);
            }
        }
    }
}
