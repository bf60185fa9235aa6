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
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Environment-backed configuration loading for the session engine.

pub mod error;
pub mod loader;

pub use error::{ConfigError, ConfigResult};
pub use loader::EngineConfig;
