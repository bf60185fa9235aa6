//! A seekable, zero-filled `TorrentReader` standing in for a real piece
//! reader. Bytes are synthesized rather than fetched; the reader's only job
//! is to exercise the `AsyncRead + AsyncSeek` contract and respect
//! cancellation/readahead plumbing.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use session_core::TorrentReader;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
use tokio::sync::Notify;

/// Zero-filled reader over `[0, length)`.
pub(crate) struct ZeroReader {
    length: u64,
    position: u64,
    /// Caps the per-call read size once set, simulating bounded prefetch.
    readahead: u64,
    cancelled: Arc<AtomicBool>,
}

impl ZeroReader {
    pub(crate) fn new(length: u64, start: u64) -> Self {
        Self {
            length,
            position: start.min(length),
            readahead: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn remaining(&self) -> u64 {
        self.length.saturating_sub(self.position)
    }
}

impl TorrentReader for ZeroReader {
    fn set_cancellation(&mut self, cancellation: Arc<Notify>) {
        let cancelled = Arc::clone(&self.cancelled);
        tokio::spawn(async move {
            cancellation.notified().await;
            cancelled.store(true, Ordering::SeqCst);
        });
    }

    fn set_readahead(&mut self, bytes: u64) {
        self.readahead = bytes;
    }
}

impl AsyncRead for ZeroReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.cancelled.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::Interrupted, "reader cancelled")));
        }
        let remaining = this.remaining();
        if remaining == 0 {
            return Poll::Ready(Ok(()));
        }
        let cap = if this.readahead == 0 {
            remaining
        } else {
            remaining.min(this.readahead)
        };
        let want = u64::try_from(buf.remaining()).unwrap_or(u64::MAX).min(cap);
        #[allow(clippy::cast_possible_truncation)]
        let want_usize = want as usize;
        buf.put_slice(&vec![0_u8; want_usize]);
        this.position += want;
        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for ZeroReader {
    fn start_seek(self: Pin<&mut Self>, position: io::SeekFrom) -> io::Result<()> {
        let this = self.get_mut();
        let target = match position {
            io::SeekFrom::Start(offset) => i128::from(offset),
            io::SeekFrom::End(offset) => i128::from(this.length) + i128::from(offset),
            io::SeekFrom::Current(offset) => i128::from(this.position) + i128::from(offset),
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before byte zero",
            ));
        }
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let target = target.min(i128::from(this.length)) as u64;
        this.position = target;
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.position))
    }
}
