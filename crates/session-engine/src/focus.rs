//! The three bandwidth-arbitration policies the focus scheduler applies to
//! a torrent handle (spec §4.3).

use session_core::{ClientHandle, DEFAULT_MAX_CONNECTIONS, Priority};

/// Disallow up/down and zero out connections, forcing the client to drop
/// every peer for this torrent.
pub(crate) async fn hard_pause(handle: &dyn ClientHandle) {
    handle.set_download_allowed(false).await;
    handle.set_upload_allowed(false).await;
    handle.set_max_connections(0).await;
}

/// Restore the default connection cap, allow up/down, and request that the
/// client fetch every piece.
pub(crate) async fn resume_normal(handle: &dyn ClientHandle) {
    handle.set_max_connections(DEFAULT_MAX_CONNECTIONS).await;
    handle.set_download_allowed(true).await;
    handle.set_upload_allowed(true).await;
    handle.start_download_all().await;
}

/// Restore the default connection cap and allow up/down, but reset every
/// piece's priority to `None` instead of requesting download-all. Only the
/// streaming reader's priority window (§4.4) raises priorities from here.
pub(crate) async fn resume_for_streaming(handle: &dyn ClientHandle) {
    handle.set_max_connections(DEFAULT_MAX_CONNECTIONS).await;
    handle.set_download_allowed(true).await;
    handle.set_upload_allowed(true).await;
    for piece in 0..handle.num_pieces() {
        let _ = handle.set_piece_priority(piece, Priority::None).await;
    }
}
