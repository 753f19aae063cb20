//! The rejection taxonomy.

use crate::{Action, CheckStatus, LifecycleState, Role, Uid};
use thiserror::Error;

/// Why a record or an administrative call was rejected.
///
/// Every variant is a local validation failure: the record is simply not
/// applied and no state changes. None of them is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// The caller lacks the required role or admin relation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The record's revocability flag does not match what its action requires.
    #[error("invalid revocability: action requires revocable = {expected}")]
    InvalidRevocability {
        /// The flag the action requires.
        expected: bool,
    },

    /// The record carries a finite expiration.
    #[error("invalid expiration: {0} (records must not expire)")]
    InvalidExpiration(u64),

    /// A role name was not recognized or not the one the action expects.
    #[error("invalid role: {0}")]
    InvalidRole(String),

    /// The attestation title is missing from the allowlist or disabled.
    #[error("invalid attestation title: {0}")]
    InvalidAttestationTitle(String),

    /// The reference uid is missing or does not point where it must.
    #[error("invalid reference uid: {0}")]
    InvalidRefUid(String),

    /// A check-out for an address that is already checked out.
    #[error("already checked out")]
    AlreadyCheckedOut,

    /// A check-in for an address that is already checked in.
    #[error("already checked in")]
    AlreadyCheckedIn,

    /// Any other lifecycle transition that the state machine does not allow.
    #[error("invalid lifecycle transition: {status} from {from}")]
    InvalidTransition {
        /// The current lifecycle state of the subject.
        from: LifecycleState,
        /// The requested status.
        status: CheckStatus,
    },

    /// The referenced record already has an active reply.
    #[error("record {0} already has a response")]
    AlreadyHasResponse(Uid),

    /// A value transfer reached an engine that does not accept payments.
    #[error("engine does not accept value transfers")]
    NotPayable,

    /// The record's schema resolves to `Action::None`.
    #[error("schema {0} is not bound to an action")]
    UnboundSchema(Uid),

    /// The subject already holds the role the record would grant.
    #[error("subject already holds {0}")]
    AlreadyHasRole(Role),

    /// The subject received the manager badge before and it cannot be reissued.
    #[error("manager badge already issued to subject")]
    BadgeAlreadyIssued,

    /// A check-in/check-out status token was not recognized.
    #[error("invalid status: {0}")]
    InvalidStatus(String),

    /// The payload could not be decoded for the resolved action.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Records of this action cannot be withdrawn.
    #[error("{0} records cannot be withdrawn")]
    NotWithdrawable(Action),

    /// The ledger could not serve a reference lookup.
    #[error("ledger unavailable: {0}")]
    Ledger(String),

    /// The state change could not be persisted.
    #[error("journal write failed: {0}")]
    Journal(String),
}

impl GateError {
    /// Returns a stable machine-readable code for this rejection.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::InvalidRevocability { .. } => "INVALID_REVOCABILITY",
            Self::InvalidExpiration(_) => "INVALID_EXPIRATION",
            Self::InvalidRole(_) => "INVALID_ROLE",
            Self::InvalidAttestationTitle(_) => "INVALID_ATTESTATION_TITLE",
            Self::InvalidRefUid(_) => "INVALID_REF_UID",
            Self::AlreadyCheckedOut => "ALREADY_CHECKED_OUT",
            Self::AlreadyCheckedIn => "ALREADY_CHECKED_IN",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::AlreadyHasResponse(_) => "ALREADY_HAS_RESPONSE",
            Self::NotPayable => "NOT_PAYABLE",
            Self::UnboundSchema(_) => "UNBOUND_SCHEMA",
            Self::AlreadyHasRole(_) => "ALREADY_HAS_ROLE",
            Self::BadgeAlreadyIssued => "BADGE_ALREADY_ISSUED",
            Self::InvalidStatus(_) => "INVALID_STATUS",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::NotWithdrawable(_) => "NOT_WITHDRAWABLE",
            Self::Ledger(_) => "LEDGER_UNAVAILABLE",
            Self::Journal(_) => "JOURNAL_FAILED",
        }
    }

    /// Shorthand for an [`GateError::Unauthorized`] with a message.
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }
}
