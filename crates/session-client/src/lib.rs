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

//! In-process test double for `session-core`'s torrent client primitive.
//!
//! This crate ships the one concrete `TorrentClient` this workspace carries:
//! a stub that never opens a socket. It derives a stable info-hash from
//! whatever source it is handed and simulates download/upload progress from
//! wall-clock time rather than wire traffic. No real BitTorrent protocol
//! implementation lives here.

mod reader;
mod stub;

pub use stub::{StubClient, StubClientConfig};
