//! The records mirror: every record the engine admitted, for reference
//! lookups and audit.

use gatehouse_types::{Action, LedgerError, RecordLedger, RecordView, Uid};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use crate::error::DbError;
use crate::pool::DbPool;

/// A mirrored record plus its bookkeeping columns.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// The record as the engine saw it.
    pub view: RecordView,
    /// The action its schema resolved to at admission.
    pub action: Action,
    /// Admission timestamp.
    pub created_at: String,
    /// Withdrawal timestamp, if the record was withdrawn.
    pub withdrawn_at: Option<String>,
}

const RECORD_COLUMNS: &str = "uid, schema_uid, issuer, subject, revocable, expiration_time, \
                              ref_uid, payload_json, action_code, created_at, withdrawn_at";

type RawRecord = (
    String,
    String,
    String,
    String,
    bool,
    i64,
    String,
    String,
    u8,
    String,
    Option<String>,
);

fn raw_record(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

fn decode(raw: RawRecord) -> Result<StoredRecord, DbError> {
    let (uid, schema, issuer, subject, revocable, expiration, ref_uid, payload, action, created_at, withdrawn_at) =
        raw;
    let corrupt = |e: gatehouse_types::ParseIdError| DbError::corrupt("records", e);
    let payload: Value = serde_json::from_str(&payload)?;
    let expiration_time = u64::try_from(expiration)
        .map_err(|_| DbError::corrupt("records", format!("expiration {expiration}")))?;
    Ok(StoredRecord {
        view: RecordView {
            uid: uid.parse().map_err(corrupt)?,
            schema: schema.parse().map_err(corrupt)?,
            issuer: issuer.parse().map_err(corrupt)?,
            subject: subject.parse().map_err(corrupt)?,
            revocable,
            expiration_time,
            ref_uid: ref_uid.parse().map_err(corrupt)?,
            payload,
        },
        action: Action::from_u8(action)
            .ok_or_else(|| DbError::corrupt("records", format!("action code {action}")))?,
        created_at,
        withdrawn_at,
    })
}

/// Mirrors an admitted record.
///
/// # Errors
///
/// Returns [`DbError::Sqlite`] if the uid is already present.
pub fn insert_record(conn: &Connection, view: &RecordView, action: Action) -> Result<(), DbError> {
    let expiration = i64::try_from(view.expiration_time)
        .map_err(|_| DbError::corrupt("records", format!("expiration {}", view.expiration_time)))?;
    conn.execute(
        "INSERT INTO records (uid, schema_uid, issuer, subject, revocable, expiration_time,
                              ref_uid, payload_json, action_code)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            view.uid.to_string(),
            view.schema.to_string(),
            view.issuer.to_string(),
            view.subject.to_string(),
            view.revocable,
            expiration,
            view.ref_uid.to_string(),
            serde_json::to_string(&view.payload)?,
            action.as_u8(),
        ],
    )?;
    Ok(())
}

/// Fetches a mirrored record.
///
/// # Errors
///
/// Returns [`DbError`] on SQL failure or a corrupt row.
pub fn get_record(conn: &Connection, uid: &Uid) -> Result<Option<StoredRecord>, DbError> {
    let raw = conn
        .query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM records WHERE uid = ?1"),
            [uid.to_string()],
            raw_record,
        )
        .optional()?;
    raw.map(decode).transpose()
}

/// Stamps a record as withdrawn. Returns `false` if it was not present or
/// already withdrawn.
///
/// # Errors
///
/// Returns [`DbError::Sqlite`] on SQL failure.
pub fn mark_withdrawn(conn: &Connection, uid: &Uid) -> Result<bool, DbError> {
    let updated = conn.execute(
        "UPDATE records SET withdrawn_at = datetime('now')
         WHERE uid = ?1 AND withdrawn_at IS NULL",
        [uid.to_string()],
    )?;
    Ok(updated == 1)
}

/// A [`RecordLedger`] over the records mirror.
#[derive(Clone)]
pub struct SqliteLedger {
    pool: DbPool,
}

impl SqliteLedger {
    /// Wraps `pool`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl RecordLedger for SqliteLedger {
    fn get_record(&self, uid: &Uid) -> Result<Option<RecordView>, LedgerError> {
        let conn = self
            .pool
            .get()
            .map_err(|e| LedgerError(format!("no connection: {e}")))?;
        get_record(&conn, uid)
            .map(|found| found.map(|stored| stored.view))
            .map_err(|e| LedgerError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_migrations;
    use gatehouse_types::Address;
    use serde_json::json;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        run_migrations(&conn).expect("migrations");
        conn
    }

    fn view(uid: u8, subject: u8) -> RecordView {
        RecordView {
            uid: Uid::new([uid; 32]),
            schema: Uid::new([0xaa; 32]),
            issuer: Address::new([1; 20]),
            subject: Address::new([subject; 20]),
            revocable: true,
            expiration_time: 0,
            ref_uid: Uid::ZERO,
            payload: json!({"title": "Good Person", "comment": ""}),
        }
    }

    #[test]
    fn insert_then_get() {
        let conn = conn();
        insert_record(&conn, &view(1, 2), Action::Attest).expect("insert");

        let stored = get_record(&conn, &Uid::new([1; 32]))
            .expect("get")
            .expect("present");
        assert_eq!(stored.view, view(1, 2));
        assert_eq!(stored.action, Action::Attest);
        assert_eq!(stored.withdrawn_at, None);

        assert!(get_record(&conn, &Uid::new([9; 32])).expect("get").is_none());
    }

    #[test]
    fn duplicate_uid_is_rejected() {
        let conn = conn();
        insert_record(&conn, &view(1, 2), Action::Attest).expect("insert");
        assert!(matches!(
            insert_record(&conn, &view(1, 2), Action::Attest),
            Err(DbError::Sqlite(_))
        ));
    }

    #[test]
    fn withdrawal_is_stamped_once() {
        let conn = conn();
        insert_record(&conn, &view(1, 2), Action::Reply).expect("insert");
        assert!(mark_withdrawn(&conn, &Uid::new([1; 32])).expect("mark"));
        assert!(!mark_withdrawn(&conn, &Uid::new([1; 32])).expect("mark"));
        let stored = get_record(&conn, &Uid::new([1; 32])).expect("get").expect("present");
        assert!(stored.withdrawn_at.is_some());
    }
}
