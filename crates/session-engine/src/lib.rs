#![deny(
    warnings,
    unsafe_code,
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

//! The session engine: the fleet/focus scheduler, streaming piece-priority
//! window, LRU eviction, and state reporter that together implement the
//! session lifecycle (spec §4).
//!
//! `session-engine` depends only on `session-core`'s vocabulary and
//! `session-events`'s bus; it never constructs a concrete `TorrentClient` or
//! `SessionRepository` itself — those are supplied by `session-client` and
//! `session-data` and wired together by `session-app`.

mod engine;
mod eviction;
mod focus;
mod registry;
mod reporter;
mod state_machine;

pub use engine::{EngineConfig, SessionEngine};
