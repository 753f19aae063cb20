//! Persistence operations for the decision log.
//!
//! Writes go through [`emit_event`], which derives the domain, event type and
//! entity from the payload and assigns the next sequence number in the same
//! statement as the insert. Reads go through [`query_events`].

use rusqlite::{params, Connection, Row};

use crate::error::ObserveError;
use crate::event::{EventDomain, EventPayload, LoggedEvent};

/// Appends one event to the log.
///
/// # Errors
///
/// Returns `ObserveError::Database` on SQL failure or
/// `ObserveError::Serialization` if the payload cannot be serialised.
pub fn emit_event(conn: &Connection, payload: &EventPayload) -> Result<LoggedEvent, ObserveError> {
    let payload_json = serde_json::to_string(payload)?;
    let domain = payload.domain();
    let event_type = payload.event_type();
    let entity_type = payload.entity_type();
    let entity_id = payload.entity_id();

    let (id, seq, occurred_at) = conn.query_row(
        "INSERT INTO event_log
            (domain, event_type, entity_type, entity_id, seq, payload_json, occurred_at)
         VALUES (
            ?1, ?2, ?3, ?4,
            (SELECT COALESCE(MAX(seq), 0) + 1 FROM event_log),
            ?5,
            datetime('now')
         )
         RETURNING id, seq, occurred_at",
        params![domain.as_str(), event_type, entity_type, entity_id, payload_json],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?)),
    )?;
    tracing::debug!(seq, event_type, entity_id = %entity_id, "decision logged");

    Ok(LoggedEvent {
        id,
        domain: domain.as_str().to_string(),
        event_type: event_type.to_string(),
        entity_type: entity_type.to_string(),
        entity_id,
        seq,
        payload: serde_json::to_value(payload)?,
        occurred_at,
    })
}

/// Appends several events atomically, in order.
///
/// # Errors
///
/// Same as [`emit_event`]; on error nothing is written.
pub fn emit_events(
    conn: &Connection,
    payloads: &[EventPayload],
) -> Result<Vec<LoggedEvent>, ObserveError> {
    let tx = conn.unchecked_transaction()?;
    let events = payloads
        .iter()
        .map(|payload| emit_event(&tx, payload))
        .collect::<Result<Vec<_>, _>>()?;
    tx.commit()?;
    Ok(events)
}

/// Returns the sequence number the next event will receive.
///
/// # Errors
///
/// Returns `ObserveError::Database` on SQL failure.
pub fn next_seq(conn: &Connection) -> Result<i64, ObserveError> {
    let max_seq: Option<i64> =
        conn.query_row("SELECT MAX(seq) FROM event_log", [], |row| row.get(0))?;
    Ok(max_seq.unwrap_or(0) + 1)
}

/// Filter criteria for querying the decision log.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by event domain.
    pub domain: Option<EventDomain>,
    /// Filter by event type string.
    pub event_type: Option<String>,
    /// Filter by entity type string.
    pub entity_type: Option<String>,
    /// Filter by entity ID.
    pub entity_id: Option<String>,
    /// Return only events with a sequence number greater than this cursor.
    pub after_seq: Option<i64>,
    /// Maximum number of events to return (default: 100).
    pub limit: Option<i64>,
}

fn logged_event(row: &Row<'_>) -> rusqlite::Result<(LoggedEvent, String)> {
    Ok((
        LoggedEvent {
            id: row.get(0)?,
            domain: row.get(1)?,
            event_type: row.get(2)?,
            entity_type: row.get(3)?,
            entity_id: row.get(4)?,
            seq: row.get(5)?,
            payload: serde_json::Value::Null,
            occurred_at: row.get(7)?,
        },
        row.get(6)?,
    ))
}

/// Queries the decision log.
///
/// Results are ordered by sequence number, oldest first, bounded by
/// `filter.limit`. Pass the last `seq` seen as `filter.after_seq` to page.
///
/// # Errors
///
/// Returns `ObserveError::Database` on SQL failure or
/// `ObserveError::Serialization` for a stored payload that does not parse.
pub fn query_events(conn: &Connection, filter: &EventFilter) -> Result<Vec<LoggedEvent>, ObserveError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    let mut push = |column: &str, op: &str, value: Box<dyn rusqlite::types::ToSql>| {
        values.push(value);
        clauses.push(format!("{column} {op} ?{}", values.len()));
    };

    if let Some(domain) = filter.domain {
        push("domain", "=", Box::new(domain.as_str()));
    }
    if let Some(ref event_type) = filter.event_type {
        push("event_type", "=", Box::new(event_type.clone()));
    }
    if let Some(ref entity_type) = filter.entity_type {
        push("entity_type", "=", Box::new(entity_type.clone()));
    }
    if let Some(ref entity_id) = filter.entity_id {
        push("entity_id", "=", Box::new(entity_id.clone()));
    }
    if let Some(after) = filter.after_seq {
        push("seq", ">", Box::new(after));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    values.push(Box::new(filter.limit.unwrap_or(100)));
    let sql = format!(
        "SELECT id, domain, event_type, entity_type, entity_id, seq, payload_json, occurred_at
         FROM event_log
         {where_clause}
         ORDER BY seq ASC
         LIMIT ?{}",
        values.len()
    );

    let refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| &**v).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(refs.as_slice(), logged_event)?;

    let mut events = Vec::new();
    for row in rows {
        let (mut event, payload_json) = row?;
        event.payload = serde_json::from_str(&payload_json)?;
        events.push(event);
    }
    Ok(events)
}
