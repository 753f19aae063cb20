//! Unit tests for the decision log.

use gatehouse_state::{BindingKey, StateChange};
use gatehouse_types::{Action, Address, LifecycleState, Role, Uid};
use rusqlite::Connection;

use crate::error::ObserveError;
use crate::event::{EventDomain, EventPayload};
use crate::store::{emit_event, emit_events, next_seq, query_events, EventFilter};

fn test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("should open in-memory db");
    gatehouse_db::run_migrations(&conn).expect("migrations should succeed");
    conn
}

fn admitted(n: u8) -> EventPayload {
    EventPayload::RecordAdmitted {
        uid: Uid::new([n; 32]),
        schema: Uid::new([0xaa; 32]),
        action: Action::Attest,
        issuer: Address::new([1; 20]),
        subject: Address::new([2; 20]),
    }
}

fn granted(n: u8) -> EventPayload {
    EventPayload::RoleGranted {
        role: Role::Manager,
        account: Address::new([n; 20]),
    }
}

// ── emit_event ───────────────────────────────────────────────────────

#[test]
fn emit_event_inserts_row() {
    let conn = test_db();
    let event = emit_event(&conn, &admitted(7)).expect("emit should succeed");

    assert!(event.id > 0);
    assert_eq!(event.seq, 1);
    assert_eq!(event.domain, "ADMISSION");
    assert_eq!(event.event_type, "RECORD_ADMITTED");
    assert_eq!(event.entity_type, "record");
    assert_eq!(event.entity_id, Uid::new([7; 32]).to_string());

    let stored: String = conn
        .query_row(
            "SELECT payload_json FROM event_log WHERE id = ?1",
            [event.id],
            |row| row.get(0),
        )
        .expect("should query payload");
    let restored: EventPayload = serde_json::from_str(&stored).expect("payload should parse");
    assert_eq!(restored, admitted(7));
}

#[test]
fn payload_json_is_tagged() {
    let json = serde_json::to_value(granted(3)).expect("serialise");
    assert_eq!(json["event"], "ROLE_GRANTED");
    assert_eq!(json["role"], "MANAGER");
}

#[test]
fn emit_event_on_missing_table_returns_database_error() {
    let conn = Connection::open_in_memory().expect("open");
    assert!(matches!(
        emit_event(&conn, &granted(1)),
        Err(ObserveError::Database(_))
    ));
}

// ── Sequence numbers ─────────────────────────────────────────────────

#[test]
fn sequence_numbers_increase() {
    let conn = test_db();
    assert_eq!(next_seq(&conn).expect("next_seq"), 1);
    emit_event(&conn, &granted(1)).expect("emit");
    emit_event(&conn, &granted(2)).expect("emit");
    assert_eq!(next_seq(&conn).expect("next_seq"), 3);
}

#[test]
fn emit_events_is_ordered() {
    let conn = test_db();
    let events = emit_events(&conn, &[admitted(1), granted(2), granted(3)]).expect("emit");
    let seqs: Vec<_> = events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
}

// ── query_events ─────────────────────────────────────────────────────

#[test]
fn query_filters_by_domain_and_entity() {
    let conn = test_db();
    emit_events(&conn, &[admitted(1), granted(2), granted(3), admitted(4)]).expect("emit");

    let roles = query_events(
        &conn,
        &EventFilter {
            domain: Some(EventDomain::Roles),
            ..EventFilter::default()
        },
    )
    .expect("query");
    assert_eq!(roles.len(), 2);

    let one = query_events(
        &conn,
        &EventFilter {
            entity_id: Some(Address::new([3; 20]).to_string()),
            ..EventFilter::default()
        },
    )
    .expect("query");
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].payload["account"], Address::new([3; 20]).to_string());
}

#[test]
fn query_pages_with_cursor_and_limit() {
    let conn = test_db();
    for n in 1..=5 {
        emit_event(&conn, &granted(n)).expect("emit");
    }

    let first = query_events(
        &conn,
        &EventFilter {
            limit: Some(2),
            ..EventFilter::default()
        },
    )
    .expect("query");
    assert_eq!(first.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2]);

    let rest = query_events(
        &conn,
        &EventFilter {
            after_seq: Some(2),
            ..EventFilter::default()
        },
    )
    .expect("query");
    assert_eq!(rest.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 4, 5]);
}

// ── Domain and payload mapping ───────────────────────────────────────

#[test]
fn event_domain_round_trip() {
    for domain in [
        EventDomain::Admission,
        EventDomain::Roles,
        EventDomain::Lifecycle,
        EventDomain::Config,
    ] {
        assert_eq!(domain.as_str().parse::<EventDomain>().unwrap(), domain);
        assert_eq!(domain.to_string(), domain.as_str());
    }
    assert!("MODERATION".parse::<EventDomain>().is_err());
}

#[test]
fn every_change_maps_to_an_event() {
    let account = Address::new([5; 20]);
    let target = Uid::new([6; 32]);
    let cases = [
        (
            StateChange::GrantRole {
                role: Role::Villager,
                account,
            },
            "ROLE_GRANTED",
            EventDomain::Roles,
        ),
        (
            StateChange::RevokeRole {
                role: Role::Villager,
                account,
            },
            "ROLE_REVOKED",
            EventDomain::Roles,
        ),
        (
            StateChange::IssueManagerBadge { account },
            "MANAGER_BADGE_ISSUED",
            EventDomain::Roles,
        ),
        (
            StateChange::SetLifecycle {
                account,
                state: LifecycleState::CheckedIn,
                check_in: Some(target),
            },
            "LIFECYCLE_CHANGED",
            EventDomain::Lifecycle,
        ),
        (
            StateChange::SetReplyGate {
                target,
                reply: Some(Uid::new([7; 32])),
            },
            "REPLY_GATE_OPENED",
            EventDomain::Lifecycle,
        ),
        (
            StateChange::SetReplyGate { target, reply: None },
            "REPLY_GATE_CLOSED",
            EventDomain::Lifecycle,
        ),
        (
            StateChange::Bind {
                key: BindingKey::schema(target),
                action: Action::Reply,
            },
            "SCHEMA_BOUND",
            EventDomain::Config,
        ),
        (
            StateChange::SetTitle {
                title: "Good Person".to_string(),
                valid: true,
            },
            "TITLE_SET",
            EventDomain::Config,
        ),
    ];

    for (change, event_type, domain) in cases {
        let payload = EventPayload::from_change(&change);
        assert_eq!(payload.event_type(), event_type);
        assert_eq!(payload.domain(), domain);
    }
}
