//! The record view handed in by the ledger, and the ledger lookup seam.

use crate::{Address, Uid};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Expiration marker meaning "valid indefinitely".
pub const NO_EXPIRATION: u64 = 0;

/// A read-only view of an attestation record.
///
/// The engine never persists this structure; the ledger supplies it per
/// call. The payload is opaque until the record's action is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordView {
    /// Identifier assigned by the ledger.
    pub uid: Uid,
    /// The schema the record declares.
    pub schema: Uid,
    /// Who issued the record.
    pub issuer: Address,
    /// Who the record is about.
    pub subject: Address,
    /// Whether the issuing authority may later withdraw the record.
    pub revocable: bool,
    /// Expiration time in seconds; [`NO_EXPIRATION`] for open-ended records.
    #[serde(default)]
    pub expiration_time: u64,
    /// The prior record this one relates to; all-zero for none.
    #[serde(default)]
    pub ref_uid: Uid,
    /// Action-specific payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RecordView {
    /// Returns `true` when the record carries no expiration.
    pub fn is_open_ended(&self) -> bool {
        self.expiration_time == NO_EXPIRATION
    }

    /// Returns the reference uid, or `None` when the record references nothing.
    pub fn reference(&self) -> Option<Uid> {
        (!self.ref_uid.is_zero()).then_some(self.ref_uid)
    }
}

/// Failure of the ledger to answer a lookup.
#[derive(Debug, Error)]
#[error("ledger lookup failed: {0}")]
pub struct LedgerError(pub String);

/// Read access to previously committed records.
///
/// The ledger must only ever return records it actually committed; a record
/// the engine rejected must never come back from a lookup.
pub trait RecordLedger {
    /// Fetches a committed record by uid.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the ledger cannot be consulted.
    fn get_record(&self, uid: &Uid) -> Result<Option<RecordView>, LedgerError>;
}

impl RecordLedger for std::collections::HashMap<Uid, RecordView> {
    fn get_record(&self, uid: &Uid) -> Result<Option<RecordView>, LedgerError> {
        Ok(self.get(uid).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample() -> RecordView {
        RecordView {
            uid: Uid::new([1; 32]),
            schema: Uid::new([2; 32]),
            issuer: Address::new([3; 20]),
            subject: Address::new([4; 20]),
            revocable: false,
            expiration_time: NO_EXPIRATION,
            ref_uid: Uid::ZERO,
            payload: serde_json::json!({"title": "Good Person", "comment": ""}),
        }
    }

    #[test]
    fn reference_is_none_for_zero_uid() {
        let mut view = sample();
        assert_eq!(view.reference(), None);
        view.ref_uid = Uid::new([9; 32]);
        assert_eq!(view.reference(), Some(Uid::new([9; 32])));
    }

    #[test]
    fn optional_fields_default_when_absent() {
        let json = serde_json::json!({
            "uid": Uid::new([1; 32]),
            "schema": Uid::new([2; 32]),
            "issuer": Address::new([3; 20]),
            "subject": Address::new([4; 20]),
            "revocable": true,
        });
        let view: RecordView = serde_json::from_value(json).unwrap();
        assert!(view.is_open_ended());
        assert!(view.ref_uid.is_zero());
        assert!(view.payload.is_null());
    }

    #[test]
    fn hashmap_ledger_serves_committed_records() {
        let record = sample();
        let mut ledger = HashMap::new();
        ledger.insert(record.uid, record.clone());
        assert_eq!(ledger.get_record(&record.uid).unwrap(), Some(record));
        assert_eq!(ledger.get_record(&Uid::ZERO).unwrap(), None);
    }
}
