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

//! Persistence layer for the session engine's catalog: a Postgres-backed
//! [`SessionRepository`](session_core::SessionRepository) plus an
//! in-memory fallback for tests and configurations without a database.

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::{DataError, Result as DataResult};
pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;
