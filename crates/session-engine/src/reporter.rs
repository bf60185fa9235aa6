//! The state reporter (spec §4.6): periodic sampling, speed derivation, and
//! completion/bitfield high-water-mark reconciliation.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use session_core::{
    ClientHandle, FileRef, PersistedStatus, SessionMode, SessionState, SpeedSample, TorrentId,
    TransferPhase,
};

/// Result of sampling one session: the derived snapshot, the speed sample to
/// cache for the next poll, and whether the session just crossed into
/// completion (the caller, not this function, performs the mode transition).
pub(crate) struct SampleOutcome {
    /// The derived, read-only snapshot.
    pub state: SessionState,
    /// The sample to retain for next poll's delta computation.
    pub sample: SpeedSample,
    /// Whether `completed >= length > 0` while status was Active.
    pub reached_completion: bool,
}

/// Sample one session's handle and fold it against its prior high-water
/// marks. `peak_completed`/`peak_bitfield` are updated in place.
pub(crate) async fn sample_session(
    id: &TorrentId,
    handle: &dyn ClientHandle,
    mode: SessionMode,
    peak_completed: &mut u64,
    peak_bitfield: &mut Vec<u8>,
    previous: Option<SpeedSample>,
) -> SampleOutcome {
    let stats = handle.stats().await;
    let files = handle.files();
    let length: u64 = files.iter().map(|f| f.length).sum();
    let num_pieces = handle.num_pieces();
    let piece_length = handle.piece_length();

    let raw_completed = stats.bytes_read_useful;
    let old_peak = *peak_completed;
    let completed = raw_completed.max(old_peak);
    *peak_completed = completed;

    let current_bitfield = compute_bitfield(handle, num_pieces);
    or_into(peak_bitfield, &current_bitfield);

    let now = Utc::now();
    let (download_bps, upload_bps) = match &previous {
        Some(prev) => speed_delta(prev, stats.bytes_read_useful, stats.bytes_written_data, now),
        None => (0, 0),
    };

    let status = PersistedStatus::from(mode);
    let active = matches!(status, PersistedStatus::Active)
        && !matches!(mode, SessionMode::Stopped | SessionMode::Completed);
    let phase = if active {
        Some(if raw_completed < old_peak {
            TransferPhase::Verifying
        } else {
            TransferPhase::Downloading
        })
    } else {
        None
    };

    let progress = if length == 0 {
        0.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        let value = completed as f64 / length as f64;
        value.min(1.0)
    };

    let file_refs = files
        .iter()
        .enumerate()
        .map(|(index, file)| {
            build_file_ref(
                u32::try_from(index).unwrap_or(u32::MAX),
                file.path.clone(),
                file.offset,
                file.length,
                piece_length,
                num_pieces,
                peak_bitfield,
            )
        })
        .collect();

    let reached_completion = length > 0 && completed >= length && matches!(status, PersistedStatus::Active);

    let state = SessionState {
        id: id.clone(),
        status,
        mode,
        progress,
        peer_count: stats.active_peers,
        download_bps,
        upload_bps,
        files: file_refs,
        piece_count: num_pieces,
        bitfield: BASE64.encode(peak_bitfield.as_slice()),
        phase,
        updated_at: now,
    };

    SampleOutcome {
        state,
        sample: SpeedSample {
            at: now,
            bytes_read: stats.bytes_read_useful,
            bytes_written: stats.bytes_written_data,
        },
        reached_completion,
    }
}

fn speed_delta(
    prev: &SpeedSample,
    bytes_read: u64,
    bytes_written: u64,
    now: chrono::DateTime<Utc>,
) -> (u64, u64) {
    let dt_ms = (now - prev.at).num_milliseconds();
    if dt_ms <= 0 {
        return (0, 0);
    }
    #[allow(clippy::cast_precision_loss)]
    let dt_secs = dt_ms as f64 / 1000.0;
    let down = bytes_read.saturating_sub(prev.bytes_read);
    let up = bytes_written.saturating_sub(prev.bytes_written);
    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let down_bps = (down as f64 / dt_secs) as u64;
    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let up_bps = (up as f64 / dt_secs) as u64;
    (down_bps, up_bps)
}

fn compute_bitfield(handle: &dyn ClientHandle, num_pieces: u32) -> Vec<u8> {
    let num_bytes = (num_pieces as usize).div_ceil(8);
    let mut bytes = vec![0_u8; num_bytes];
    for piece in 0..num_pieces {
        if handle.piece_complete(piece) {
            let idx = (piece / 8) as usize;
            bytes[idx] |= 0x80 >> (piece % 8);
        }
    }
    bytes
}

fn or_into(peak: &mut Vec<u8>, current: &[u8]) {
    if peak.len() < current.len() {
        peak.resize(current.len(), 0);
    }
    for (p, c) in peak.iter_mut().zip(current.iter()) {
        *p |= c;
    }
}

fn piece_for_offset(offset: u64, piece_length: u64) -> u32 {
    if piece_length == 0 {
        return 0;
    }
    u32::try_from(offset / piece_length).unwrap_or(u32::MAX)
}

#[allow(clippy::too_many_arguments)]
fn build_file_ref(
    index: u32,
    path: String,
    offset: u64,
    length: u64,
    piece_length: u64,
    num_pieces: u32,
    bitfield: &[u8],
) -> FileRef {
    let piece_start = piece_for_offset(offset, piece_length).min(num_pieces);
    let piece_end = if piece_length == 0 {
        piece_start
    } else {
        let end = offset.saturating_add(length).div_ceil(piece_length);
        u32::try_from(end).unwrap_or(u32::MAX).min(num_pieces)
    };

    let mut completed_pieces: u64 = 0;
    for piece in piece_start..piece_end {
        let byte = (piece / 8) as usize;
        let mask = 0x80_u8 >> (piece % 8);
        if bitfield.get(byte).is_some_and(|b| b & mask != 0) {
            completed_pieces += 1;
        }
    }
    let bytes_completed = completed_pieces.saturating_mul(piece_length).min(length);

    FileRef {
        index,
        path,
        length,
        bytes_completed,
        piece_start,
        piece_end,
    }
}
