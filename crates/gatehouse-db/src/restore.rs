//! Rebuilds engine state from the state tables on startup.

use std::str::FromStr;

use gatehouse_state::{BindingKey, GateState, StateChange};
use gatehouse_types::{Action, Address, LifecycleState, Role, Uid};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::DbError;
use crate::journal::write_changes;

const GENESIS_ROOT_KEY: &str = "genesis_root";

fn parse<T: FromStr>(table: &'static str, raw: &str) -> Result<T, DbError>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| DbError::corrupt(table, format!("{raw}: {e}")))
}

fn role(table: &'static str, code: u8) -> Result<Role, DbError> {
    Role::from_u8(code).ok_or_else(|| DbError::corrupt(table, format!("role code {code}")))
}

/// Returns the address that received genesis authority, if genesis ran.
///
/// # Errors
///
/// Returns [`DbError`] on SQL failure or a malformed address.
pub fn genesis_root(conn: &Connection) -> Result<Option<Address>, DbError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM engine_meta WHERE key = ?1",
            [GENESIS_ROOT_KEY],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|raw| parse("engine_meta", &raw)).transpose()
}

/// Reads every state table and returns the change set that recreates it.
///
/// # Errors
///
/// Returns [`DbError::Corrupt`] for rows that fail to decode.
pub fn snapshot_changes(conn: &Connection) -> Result<Vec<StateChange>, DbError> {
    let mut changes = Vec::new();

    let mut stmt =
        conn.prepare("SELECT role_code, address FROM role_members ORDER BY role_code, address")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, u8>(0)?, row.get::<_, String>(1)?)))?;
    for row in rows {
        let (code, address) = row?;
        changes.push(StateChange::GrantRole {
            role: role("role_members", code)?,
            account: parse("role_members", &address)?,
        });
    }

    let mut stmt = conn.prepare("SELECT address FROM manager_badges ORDER BY address")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    for row in rows {
        changes.push(StateChange::IssueManagerBadge {
            account: parse("manager_badges", &row?)?,
        });
    }

    let mut stmt = conn.prepare(
        "SELECT schema_uid, role_code, action_code FROM schema_bindings
         ORDER BY schema_uid, role_code",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, u8>(1)?,
            row.get::<_, u8>(2)?,
        ))
    })?;
    for row in rows {
        let (schema, role_code, action_code) = row?;
        let role = match role_code {
            0 => None,
            code => Some(role("schema_bindings", code)?),
        };
        let action = Action::from_u8(action_code).ok_or_else(|| {
            DbError::corrupt("schema_bindings", format!("action code {action_code}"))
        })?;
        changes.push(StateChange::Bind {
            key: BindingKey {
                schema: parse("schema_bindings", &schema)?,
                role,
            },
            action,
        });
    }

    // Registered titles replay in registry order, enabled first and then
    // set to their stored flag. Titles that were only ever disabled follow.
    let mut stmt = conn.prepare(
        "SELECT title, valid, registry_seq FROM titles
         ORDER BY registry_seq IS NULL, registry_seq, title_key",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, bool>(1)?,
            row.get::<_, Option<i64>>(2)?,
        ))
    })?;
    for row in rows {
        let (title, valid, seq) = row?;
        if seq.is_some() {
            changes.push(StateChange::SetTitle {
                title: title.clone(),
                valid: true,
            });
            if !valid {
                changes.push(StateChange::SetTitle {
                    title,
                    valid: false,
                });
            }
        } else {
            changes.push(StateChange::SetTitle {
                title,
                valid: false,
            });
        }
    }

    let mut stmt =
        conn.prepare("SELECT address, state, check_in_uid FROM participants ORDER BY address")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
        ))
    })?;
    for row in rows {
        let (address, state, check_in) = row?;
        let state: LifecycleState = parse("participants", &state)?;
        let check_in: Option<Uid> = check_in
            .map(|raw| parse("participants", &raw))
            .transpose()?;
        changes.push(StateChange::SetLifecycle {
            account: parse("participants", &address)?,
            state,
            check_in,
        });
    }

    let mut stmt =
        conn.prepare("SELECT target_uid, reply_uid FROM reply_gates ORDER BY target_uid")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    for row in rows {
        let (target, reply) = row?;
        changes.push(StateChange::SetReplyGate {
            target: parse("reply_gates", &target)?,
            reply: Some(parse("reply_gates", &reply)?),
        });
    }

    Ok(changes)
}

/// Loads the stores from the state tables and checks them.
///
/// # Errors
///
/// Returns [`DbError::Inconsistent`] when villager membership and the
/// lifecycle disagree, or any error from [`snapshot_changes`].
pub fn load_state(conn: &Connection) -> Result<GateState, DbError> {
    let changes = snapshot_changes(conn)?;
    let mut state = GateState::new();
    state.apply(&changes);
    state.check_consistency()?;
    tracing::info!(rows = changes.len(), "engine state restored");
    Ok(state)
}

/// Restores persisted state, or runs genesis on an empty database.
///
/// Genesis changes and the genesis marker are written in one transaction.
/// If the database was initialized for a different root, the stored
/// authority wins and a warning is logged.
///
/// # Errors
///
/// Returns [`DbError`] on SQL failure or an inconsistent snapshot.
pub fn restore_or_bootstrap(
    conn: &mut Connection,
    root: Address,
    all_roles: bool,
) -> Result<GateState, DbError> {
    if let Some(stored) = genesis_root(conn)? {
        if stored != root {
            tracing::warn!(
                configured = %root,
                stored = %stored,
                "configured root differs from the genesis root; keeping stored state"
            );
        }
        return load_state(conn);
    }

    let changes = GateState::genesis(root, all_roles);
    let tx = conn.transaction()?;
    write_changes(&tx, &changes)?;
    tx.execute(
        "INSERT INTO engine_meta (key, value) VALUES (?1, ?2)",
        params![GENESIS_ROOT_KEY, root.to_string()],
    )?;
    tx.commit()?;
    tracing::info!(%root, all_roles, "genesis authority established");

    let mut state = GateState::new();
    state.apply(&changes);
    Ok(state)
}
