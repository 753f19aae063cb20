//! Shared types, error definitions, and configuration for Gatehouse.
//!
//! This crate provides the vocabulary every other Gatehouse crate speaks:
//! account addresses and record identifiers, the closed [`Role`] and
//! [`Action`] enumerations, the participant [`LifecycleState`], the
//! read-only [`RecordView`] handed in by the ledger, the [`GateError`]
//! rejection taxonomy, and the [`GatePolicy`] knobs that select between
//! the historical rule variants.
//!
//! Nothing in here holds state. The stores live in `gatehouse-state` and
//! the rules in `gatehouse-engine`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

mod error;
mod policy;
mod record;

pub use error::GateError;
pub use policy::{CheckoutReference, GatePolicy, ManagerIssuers};
pub use record::{LedgerError, RecordLedger, RecordView, NO_EXPIRATION};

/// Error returned when a hex identifier cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseIdError {
    /// The input had the wrong number of hex digits.
    #[error("expected {expected} hex digits, got {actual}")]
    Length {
        /// Required digit count.
        expected: usize,
        /// Digits supplied.
        actual: usize,
    },
    /// The input contained a non-hex character.
    #[error("invalid hex: {0}")]
    Hex(String),
}

macro_rules! hex_identifier {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name([u8; $len]);

        impl $name {
            /// The all-zero value.
            pub const ZERO: Self = Self([0u8; $len]);

            /// Wraps raw bytes.
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Returns the raw bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Returns `true` for the all-zero value.
            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; $len]
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            /// Parses `0x`-prefixed or bare hex, in either case.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let digits = s
                    .strip_prefix("0x")
                    .or_else(|| s.strip_prefix("0X"))
                    .unwrap_or(s);
                if digits.len() != $len * 2 {
                    return Err(ParseIdError::Length {
                        expected: $len * 2,
                        actual: digits.len(),
                    });
                }
                let mut bytes = [0u8; $len];
                hex::decode_to_slice(digits, &mut bytes)
                    .map_err(|e| ParseIdError::Hex(e.to_string()))?;
                Ok(Self(bytes))
            }
        }

        impl TryFrom<String> for $name {
            type Error = ParseIdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

hex_identifier!(
    /// A 20-byte account address (issuer, subject, or operator).
    Address,
    20
);

hex_identifier!(
    /// A 32-byte identifier for a record or a schema.
    ///
    /// The all-zero value stands for "no reference".
    Uid,
    32
);

/// The closed set of roles.
///
/// `Root` administers every role, itself included. Membership is
/// many-valued: an address may hold any combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Role {
    /// Administrative authority; the deployer starts with it.
    Root = 1,
    /// May check villagers in and out.
    Manager = 2,
    /// A checked-in participant.
    Villager = 3,
}

impl Role {
    /// All roles in hierarchy order.
    pub const ALL: [Role; 3] = [Role::Root, Role::Manager, Role::Villager];

    /// Returns the numeric code for this role.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Attempts to convert a numeric code to a `Role`.
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Root),
            2 => Some(Self::Manager),
            3 => Some(Self::Villager),
            _ => None,
        }
    }

    /// Returns the string label for this role.
    pub fn label(self) -> &'static str {
        match self {
            Self::Root => "ROOT",
            Self::Manager => "MANAGER",
            Self::Villager => "VILLAGER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Role {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ROOT" => Ok(Self::Root),
            "MANAGER" => Ok(Self::Manager),
            "VILLAGER" => Ok(Self::Villager),
            _ => Err(GateError::InvalidRole(s.to_string())),
        }
    }
}

/// The meaning a schema carries inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Action {
    /// Unbound. Records resolving here are always rejected.
    #[default]
    None = 0,
    /// Grants `Manager` to the subject.
    AssignManager = 1,
    /// Checks the subject in or out.
    AssignVillager = 2,
    /// A badge/event record between villagers.
    Attest = 3,
    /// A response to an earlier record.
    Reply = 4,
}

impl Action {
    /// Returns the numeric code for this action.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Attempts to convert a numeric code to an `Action`.
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::AssignManager),
            2 => Some(Self::AssignVillager),
            3 => Some(Self::Attest),
            4 => Some(Self::Reply),
            _ => None,
        }
    }

    /// Returns the string label for this action.
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::AssignManager => "ASSIGN_MANAGER",
            Self::AssignVillager => "ASSIGN_VILLAGER",
            Self::Attest => "ATTEST",
            Self::Reply => "REPLY",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-address participant lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Never checked in.
    #[default]
    Unregistered,
    /// Currently checked in; holds `Villager`.
    CheckedIn,
    /// Checked in at some point, currently out.
    CheckedOut,
}

impl LifecycleState {
    /// Returns the string label for this state.
    pub fn label(self) -> &'static str {
        match self {
            Self::Unregistered => "UNREGISTERED",
            Self::CheckedIn => "CHECKED_IN",
            Self::CheckedOut => "CHECKED_OUT",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for LifecycleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNREGISTERED" => Ok(Self::Unregistered),
            "CHECKED_IN" => Ok(Self::CheckedIn),
            "CHECKED_OUT" => Ok(Self::CheckedOut),
            _ => Err(format!("unknown lifecycle state: {}", s)),
        }
    }
}

/// The status token carried by an `AssignVillager` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckStatus {
    /// `"Check-in"`.
    #[serde(rename = "Check-in")]
    CheckIn,
    /// `"Check-out"`.
    #[serde(rename = "Check-out")]
    CheckOut,
}

impl CheckStatus {
    /// Returns the token as it appears in record payloads.
    pub fn token(self) -> &'static str {
        match self {
            Self::CheckIn => "Check-in",
            Self::CheckOut => "Check-out",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for CheckStatus {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Check-in" => Ok(Self::CheckIn),
            "Check-out" => Ok(Self::CheckOut),
            _ => Err(GateError::InvalidStatus(s.to_string())),
        }
    }
}
