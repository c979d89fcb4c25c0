//! Connection hub
//!
//! The hub owns the session registry and the three fan-out pipelines, and
//! routes every inbound frame through the session state machine.
//!
//! ```text
//!   [Connection] ──frame──► Hub::handle_frame ──► SessionRegistry
//!                                  │
//!                                  └──publish──► chat / presence / typing
//!                                                 queues ──► FanOut workers
//!                                                              │
//!   [Connection] ◄── outbound buffer ◄────────────────────────┘
//! ```

pub mod config;
pub mod event;
pub mod fanout;
pub mod router;

pub use config::HubConfig;
pub use event::{Pipeline, RelayEvent, WallClock};
pub use fanout::FanOutWorkers;
pub use router::{Directive, Hub};
