#![deny(
    unsafe_code,
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Session application bootstrap wiring.
//!
//! Loads configuration, constructs the repository, client, event bus and
//! [`session_engine::SessionEngine`], restores persisted sessions, and runs
//! until a shutdown signal arrives.

/// Application bootstrap and environment loading.
pub mod bootstrap;
/// Application-level error type.
pub mod error;

pub use bootstrap::run_app;
