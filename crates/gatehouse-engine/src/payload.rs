//! Action-specific payload decoding.
//!
//! Payloads arrive as opaque JSON. Each action accepts a couple of shapes
//! because issuers historically encoded them differently: a bare value, a
//! keyed object, or a positional array.

use gatehouse_types::{CheckStatus, GateError};
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
#[serde(untagged)]
enum RoleName {
    Bare(String),
    Keyed { role: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatusValue {
    Flag(bool),
    Named(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatusPayload {
    Bare(StatusValue),
    Keyed { status: StatusValue },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AttestationShape {
    Positional(String, String),
    Keyed {
        title: String,
        #[serde(default)]
        comment: String,
    },
}

/// The decoded body of an `Attest` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
    /// The badge or event title; must be on the allowlist.
    pub title: String,
    /// Free-form comment.
    pub comment: String,
}

/// Decodes the role name of an `AssignManager` payload.
///
/// Accepts `"Manager"` or `{"role": "Manager"}`.
///
/// # Errors
///
/// Returns [`GateError::InvalidRole`] if no role name can be read.
pub fn decode_role_name(payload: &Value) -> Result<String, GateError> {
    match RoleName::deserialize(payload) {
        Ok(RoleName::Bare(role) | RoleName::Keyed { role }) => Ok(role),
        Err(_) => Err(GateError::InvalidRole(payload.to_string())),
    }
}

/// Decodes the status token of an `AssignVillager` payload.
///
/// Accepts `"Check-in"`/`"Check-out"`, a boolean (`true` checks in), or
/// either form keyed under `"status"`.
///
/// # Errors
///
/// Returns [`GateError::InvalidStatus`] for anything else.
pub fn decode_status(payload: &Value) -> Result<CheckStatus, GateError> {
    let value = match StatusPayload::deserialize(payload) {
        Ok(StatusPayload::Bare(value) | StatusPayload::Keyed { status: value }) => value,
        Err(_) => return Err(GateError::InvalidStatus(payload.to_string())),
    };
    match value {
        StatusValue::Flag(true) => Ok(CheckStatus::CheckIn),
        StatusValue::Flag(false) => Ok(CheckStatus::CheckOut),
        StatusValue::Named(token) => token.parse(),
    }
}

/// Decodes the `(title, comment)` body of an `Attest` payload.
///
/// Accepts `{"title": .., "comment": ..}` or `[title, comment]`.
///
/// # Errors
///
/// Returns [`GateError::InvalidPayload`] if no title can be read.
pub fn decode_attestation(payload: &Value) -> Result<Attestation, GateError> {
    match AttestationShape::deserialize(payload) {
        Ok(AttestationShape::Positional(title, comment))
        | Ok(AttestationShape::Keyed { title, comment }) => Ok(Attestation { title, comment }),
        Err(_) => Err(GateError::InvalidPayload(format!(
            "expected attestation title and comment, got {payload}"
        ))),
    }
}
