#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Core event bus for the session engine.
//!
//! The bus provides a typed event enum, sequential identifiers, and support
//! for replaying recent events when subscribers reconnect. Internally it uses
//! `tokio::broadcast` with a bounded buffer; when the channel overflows, the
//! oldest events are dropped, matching the desired backpressure behaviour.

pub mod bus;
pub mod error;
pub mod event;

pub use bus::{EventBus, EventStream};
pub use error::{EventBusError, EventBusResult};
pub use event::{
    DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId, PersistedStatus, SessionMode,
    TransferPhase,
};
