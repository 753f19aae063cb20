//! Decision log for Gatehouse.
//!
//! Every admitted, rejected or withdrawn record and every state change it
//! caused is appended to the `event_log` table, so operators can audit why
//! an address holds a role or why a record was turned away.
//!
//! # Event domains
//!
//! | Domain | Example events |
//! |--------|---------------|
//! | `ADMISSION` | `RECORD_ADMITTED`, `RECORD_REJECTED`, `RECORD_WITHDRAWN` |
//! | `ROLES` | `ROLE_GRANTED`, `ROLE_REVOKED`, `MANAGER_BADGE_ISSUED` |
//! | `LIFECYCLE` | `LIFECYCLE_CHANGED`, `REPLY_GATE_OPENED`, `REPLY_GATE_CLOSED` |
//! | `CONFIG` | `SCHEMA_BOUND`, `TITLE_SET` |
//!
//! # Usage
//!
//! ```rust,ignore
//! use gatehouse_observe::{emit_event, EventPayload};
//!
//! for change in &decision.changes {
//!     emit_event(&conn, &EventPayload::from_change(change))?;
//! }
//! ```

mod error;
mod event;
mod store;

pub use error::ObserveError;
pub use event::{EventDomain, EventPayload, LoggedEvent, ParseEventDomainError};
pub use store::{emit_event, emit_events, next_seq, query_events, EventFilter};

#[cfg(test)]
mod tests;
