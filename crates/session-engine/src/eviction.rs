//! LRU eviction policy enforcing the session cap (spec §4.5).

use session_core::{SessionMode, TorrentId};

use crate::registry::Registry;

/// Select the least-recently-accessed eligible session to evict, if any.
///
/// Every mode except `Focused` is eligible — an active `Downloading`
/// session is still the least-recently-used candidate if no idler one
/// exists. Returns `None` if no eligible candidate exists.
#[must_use]
pub(crate) fn pick_victim(registry: &Registry) -> Option<TorrentId> {
    registry
        .sessions
        .iter()
        .filter(|(_, entry)| !matches!(entry.mode, SessionMode::Focused))
        .min_by_key(|(_, entry)| entry.last_access)
        .map(|(id, _)| id.clone())
}
