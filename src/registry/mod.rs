//! Session registry
//!
//! The registry maps joined sessions to their display names and enforces
//! that a normalized name is held by at most one live session. It is the only
//! shared mutable state in the hub.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<SessionRegistry>
//!                   ┌──────────────────────────┐
//!                   │ RwLock<                  │
//!                   │   by_id:   Id -> Member  │
//!                   │   by_name: Name -> Id    │
//!                   │ >                        │
//!                   └────────────┬─────────────┘
//!                                │
//!         ┌──────────────────────┼──────────────────────┐
//!         │                      │                      │
//!         ▼                      ▼                      ▼
//!   [Connection]           [FanOut worker]        [FanOut worker]
//!   try_join / leave       recipients()/roster()  leave() on failed send
//! ```
//!
//! A session appears here iff it is in the `Joined` phase.

pub mod entry;
pub mod error;
pub mod store;

pub use entry::{Member, SessionHandle, SessionId, SessionSender};
pub use error::JoinError;
pub use store::{Roster, SessionRegistry};
