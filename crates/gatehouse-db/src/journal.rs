//! Durable journal: writes change sets into the materialized state tables.

use gatehouse_state::{canonicalize, Journal, JournalError, RecordEntry, StateChange};
use gatehouse_types::{Action, LifecycleState};
use rusqlite::{params, Transaction};

use crate::pool::DbPool;
use crate::records::{insert_record, mark_withdrawn};

/// A [`Journal`] backed by the state tables.
///
/// Each change set runs in its own transaction, so a failure midway leaves
/// the tables as they were. Record decisions also write the records mirror
/// in that transaction: an admitted record is never missing from the mirror,
/// and a record whose mirror row cannot be written changes no state.
#[derive(Clone)]
pub struct SqliteJournal {
    pool: DbPool,
}

impl SqliteJournal {
    /// Wraps `pool`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl SqliteJournal {
    fn write(
        &self,
        entry: Option<RecordEntry<'_>>,
        changes: &[StateChange],
    ) -> Result<(), JournalError> {
        let mut conn = self
            .pool
            .get()
            .map_err(|e| JournalError(format!("no connection: {e}")))?;
        let tx = conn
            .transaction()
            .map_err(|e| JournalError(e.to_string()))?;
        if let Some(entry) = entry {
            write_entry(&tx, entry)?;
        }
        write_changes(&tx, changes).map_err(|e| JournalError(e.to_string()))?;
        tx.commit().map_err(|e| JournalError(e.to_string()))?;
        tracing::debug!(
            record = ?entry.map(|e| e.uid()),
            changes = changes.len(),
            "change set persisted"
        );
        Ok(())
    }
}

impl Journal for SqliteJournal {
    fn persist(&mut self, changes: &[StateChange]) -> Result<(), JournalError> {
        self.write(None, changes)
    }

    fn persist_record(
        &mut self,
        entry: RecordEntry<'_>,
        changes: &[StateChange],
    ) -> Result<(), JournalError> {
        self.write(Some(entry), changes)
    }
}

fn write_entry(tx: &Transaction<'_>, entry: RecordEntry<'_>) -> Result<(), JournalError> {
    match entry {
        RecordEntry::Admitted { view, action } => insert_record(tx, view, action)
            .map_err(|e| JournalError(format!("record {} not mirrored: {e}", view.uid))),
        RecordEntry::Withdrawn { uid } => match mark_withdrawn(tx, &uid) {
            Ok(true) => Ok(()),
            Ok(false) => Err(JournalError(format!(
                "record {uid} is not mirrored or already withdrawn"
            ))),
            Err(e) => Err(JournalError(format!("withdrawal of {uid} not stamped: {e}"))),
        },
    }
}

/// Writes `changes` inside an open transaction.
pub(crate) fn write_changes(tx: &Transaction<'_>, changes: &[StateChange]) -> rusqlite::Result<()> {
    for change in changes {
        match change {
            StateChange::GrantRole { role, account } => {
                tx.execute(
                    "INSERT OR IGNORE INTO role_members (role_code, address) VALUES (?1, ?2)",
                    params![role.as_u8(), account.to_string()],
                )?;
            }
            StateChange::RevokeRole { role, account } => {
                tx.execute(
                    "DELETE FROM role_members WHERE role_code = ?1 AND address = ?2",
                    params![role.as_u8(), account.to_string()],
                )?;
            }
            StateChange::IssueManagerBadge { account } => {
                tx.execute(
                    "INSERT OR IGNORE INTO manager_badges (address) VALUES (?1)",
                    [account.to_string()],
                )?;
            }
            StateChange::SetLifecycle {
                account,
                state: LifecycleState::Unregistered,
                ..
            } => {
                tx.execute(
                    "DELETE FROM participants WHERE address = ?1",
                    [account.to_string()],
                )?;
            }
            StateChange::SetLifecycle {
                account,
                state,
                check_in,
            } => {
                let check_in = match state {
                    LifecycleState::CheckedIn => check_in.map(|uid| uid.to_string()),
                    _ => None,
                };
                tx.execute(
                    "INSERT INTO participants (address, state, check_in_uid) VALUES (?1, ?2, ?3)
                     ON CONFLICT(address) DO UPDATE SET
                        state = excluded.state,
                        check_in_uid = excluded.check_in_uid,
                        updated_at = datetime('now')",
                    params![account.to_string(), state.label(), check_in],
                )?;
            }
            StateChange::SetReplyGate {
                target,
                reply: Some(reply),
            } => {
                tx.execute(
                    "INSERT INTO reply_gates (target_uid, reply_uid) VALUES (?1, ?2)
                     ON CONFLICT(target_uid) DO UPDATE SET
                        reply_uid = excluded.reply_uid,
                        opened_at = datetime('now')",
                    params![target.to_string(), reply.to_string()],
                )?;
            }
            StateChange::SetReplyGate { target, reply: None } => {
                tx.execute(
                    "DELETE FROM reply_gates WHERE target_uid = ?1",
                    [target.to_string()],
                )?;
            }
            StateChange::Bind { key, action } => {
                let role_code = key.role.map(|r| r.as_u8()).unwrap_or(0);
                if *action == Action::None {
                    tx.execute(
                        "DELETE FROM schema_bindings WHERE schema_uid = ?1 AND role_code = ?2",
                        params![key.schema.to_string(), role_code],
                    )?;
                } else {
                    tx.execute(
                        "INSERT INTO schema_bindings (schema_uid, role_code, action_code)
                         VALUES (?1, ?2, ?3)
                         ON CONFLICT(schema_uid, role_code) DO UPDATE SET
                            action_code = excluded.action_code,
                            updated_at = datetime('now')",
                        params![key.schema.to_string(), role_code, action.as_u8()],
                    )?;
                }
            }
            StateChange::SetTitle { title, valid } => {
                let key = hex::encode(canonicalize(title));
                if *valid {
                    tx.execute(
                        "INSERT INTO titles (title_key, title, valid, registry_seq)
                         VALUES (?1, ?2, 1, (SELECT COALESCE(MAX(registry_seq), 0) + 1 FROM titles))
                         ON CONFLICT(title_key) DO UPDATE SET
                            valid = 1,
                            registry_seq = COALESCE(titles.registry_seq, excluded.registry_seq),
                            updated_at = datetime('now')",
                        params![key, title],
                    )?;
                } else {
                    tx.execute(
                        "INSERT INTO titles (title_key, title, valid) VALUES (?1, ?2, 0)
                         ON CONFLICT(title_key) DO UPDATE SET
                            valid = 0,
                            updated_at = datetime('now')",
                        params![key, title],
                    )?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, get_record, run_migrations, DbRuntimeSettings};
    use gatehouse_state::BindingKey;
    use gatehouse_types::{Address, RecordView, Role, Uid};
    use serde_json::json;

    fn pool() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("journal.db");
        let pool = create_pool(path.to_str().expect("utf-8"), DbRuntimeSettings::default())
            .expect("pool");
        run_migrations(&pool.get().expect("conn")).expect("migrations");
        (dir, pool)
    }

    fn count(pool: &DbPool, sql: &str) -> i64 {
        pool.get()
            .expect("conn")
            .query_row(sql, [], |row| row.get(0))
            .expect("count")
    }

    #[test]
    fn role_changes_round_trip_through_rows() {
        let (_dir, pool) = pool();
        let mut journal = SqliteJournal::new(pool.clone());
        let account = Address::new([7; 20]);

        journal
            .persist(&[
                StateChange::GrantRole {
                    role: Role::Manager,
                    account,
                },
                StateChange::IssueManagerBadge { account },
            ])
            .expect("persist");
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM role_members"), 1);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM manager_badges"), 1);

        journal
            .persist(&[StateChange::RevokeRole {
                role: Role::Manager,
                account,
            }])
            .expect("persist");
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM role_members"), 0);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM manager_badges"), 1);
    }

    #[test]
    fn title_registry_seq_is_assigned_once() {
        let (_dir, pool) = pool();
        let mut journal = SqliteJournal::new(pool.clone());
        let set = |title: &str, valid| StateChange::SetTitle {
            title: title.to_string(),
            valid,
        };

        journal
            .persist(&[set("Early", false), set("Late", true), set("Early", true)])
            .expect("persist");
        journal
            .persist(&[set("Late", false), set("Late", true)])
            .expect("persist");

        let conn = pool.get().expect("conn");
        let seq = |title: &str| -> Option<i64> {
            conn.query_row(
                "SELECT registry_seq FROM titles WHERE title = ?1",
                [title],
                |row| row.get(0),
            )
            .expect("seq")
        };
        assert_eq!(seq("Late"), Some(1));
        assert_eq!(seq("Early"), Some(2));
    }

    #[test]
    fn unbinding_deletes_the_row() {
        let (_dir, pool) = pool();
        let mut journal = SqliteJournal::new(pool.clone());
        let key = BindingKey::qualified(Uid::new([3; 32]), Role::Manager);

        journal
            .persist(&[StateChange::Bind {
                key,
                action: Action::AssignVillager,
            }])
            .expect("persist");
        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM schema_bindings WHERE role_code = 2"),
            1
        );

        journal
            .persist(&[StateChange::Bind {
                key,
                action: Action::None,
            }])
            .expect("persist");
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM schema_bindings"), 0);
    }

    #[test]
    fn failed_change_set_leaves_tables_untouched() {
        let (_dir, pool) = pool();
        pool.get()
            .expect("conn")
            .execute_batch("DROP TABLE reply_gates;")
            .expect("drop");
        let mut journal = SqliteJournal::new(pool.clone());

        let result = journal.persist(&[
            StateChange::GrantRole {
                role: Role::Root,
                account: Address::new([1; 20]),
            },
            StateChange::SetReplyGate {
                target: Uid::new([1; 32]),
                reply: Some(Uid::new([2; 32])),
            },
        ]);
        assert!(result.is_err());
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM role_members"), 0);
    }

    fn appointment(uid: u8, subject: Address) -> RecordView {
        RecordView {
            uid: Uid::new([uid; 32]),
            schema: Uid::new([0x10; 32]),
            issuer: Address::new([1; 20]),
            subject,
            revocable: true,
            expiration_time: 0,
            ref_uid: Uid::ZERO,
            payload: json!("Manager"),
        }
    }

    #[test]
    fn record_decisions_write_the_mirror_with_their_changes() {
        let (_dir, pool) = pool();
        let mut journal = SqliteJournal::new(pool.clone());
        let account = Address::new([7; 20]);
        let view = appointment(1, account);
        let grant = StateChange::GrantRole {
            role: Role::Manager,
            account,
        };

        journal
            .persist_record(
                RecordEntry::Admitted {
                    view: &view,
                    action: Action::AssignManager,
                },
                &[grant],
            )
            .expect("persist");
        let conn = pool.get().expect("conn");
        let stored = get_record(&conn, &view.uid).expect("get").expect("mirrored");
        assert_eq!(stored.action, Action::AssignManager);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM role_members"), 1);

        journal
            .persist_record(RecordEntry::Withdrawn { uid: view.uid }, &[])
            .expect("withdraw");
        let stored = get_record(&conn, &view.uid).expect("get").expect("mirrored");
        assert!(stored.withdrawn_at.is_some());

        // A second withdrawal of the same record is refused.
        assert!(journal
            .persist_record(RecordEntry::Withdrawn { uid: view.uid }, &[])
            .is_err());
    }

    #[test]
    fn failed_mirror_write_discards_the_change_set() {
        let (_dir, pool) = pool();
        pool.get()
            .expect("conn")
            .execute_batch(
                "CREATE TRIGGER records_unavailable BEFORE INSERT ON records
                 BEGIN SELECT RAISE(ABORT, 'mirror unavailable'); END;",
            )
            .expect("trigger");
        let mut journal = SqliteJournal::new(pool.clone());
        let account = Address::new([7; 20]);
        let view = appointment(1, account);

        let result = journal.persist_record(
            RecordEntry::Admitted {
                view: &view,
                action: Action::AssignManager,
            },
            &[StateChange::GrantRole {
                role: Role::Manager,
                account,
            }],
        );
        assert!(result.is_err());
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM role_members"), 0);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM records"), 0);
    }

    #[test]
    fn withdrawing_an_unmirrored_record_discards_the_change_set() {
        let (_dir, pool) = pool();
        let mut journal = SqliteJournal::new(pool.clone());

        let result = journal.persist_record(
            RecordEntry::Withdrawn {
                uid: Uid::new([4; 32]),
            },
            &[StateChange::GrantRole {
                role: Role::Root,
                account: Address::new([1; 20]),
            }],
        );
        assert!(result.is_err());
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM role_members"), 0);
    }
}
