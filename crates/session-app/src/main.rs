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

//! Binary entrypoint that wires the session engine's dependencies together
//! and runs until shutdown.

use anyhow::Result;

/// Bootstraps the session application and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<()> {
    session_app::run_app().await.map_err(anyhow::Error::from)
}
