//! The six-mode lifecycle adjacency graph (spec §4.1), expressed as data
//! rather than a class hierarchy so the engine can validate transitions
//! without special-casing callers.

use session_core::SessionMode;

/// Returns whether `from -> to` is a legal transition. Same-state
/// transitions are always allowed (a no-op, not an error).
#[must_use]
pub(crate) fn is_allowed(from: SessionMode, to: SessionMode) -> bool {
    use SessionMode::{Completed, Downloading, Focused, Idle, Paused, Stopped};

    if from == to {
        return true;
    }

    matches!(
        (from, to),
        (Idle, Downloading)
            | (Idle, Paused)
            | (Idle, Stopped)
            | (Downloading, Stopped)
            | (Downloading, Focused)
            | (Downloading, Paused)
            | (Downloading, Completed)
            | (Focused, Downloading)
            | (Focused, Stopped)
            | (Focused, Completed)
            | (Paused, Downloading)
            | (Paused, Focused)
            | (Paused, Stopped)
            | (Stopped, Downloading)
            | (Stopped, Paused)
            | (Stopped, Idle)
            | (Completed, Stopped)
            | (Completed, Focused)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionMode::{Completed, Downloading, Focused, Idle, Paused, Stopped};

    #[test]
    fn adjacency_matches_spec_graph() {
        assert!(is_allowed(Idle, Downloading));
        assert!(is_allowed(Idle, Paused));
        assert!(is_allowed(Idle, Stopped));
        assert!(!is_allowed(Idle, Focused));
        assert!(!is_allowed(Idle, Completed));

        assert!(is_allowed(Downloading, Stopped));
        assert!(is_allowed(Downloading, Focused));
        assert!(is_allowed(Downloading, Paused));
        assert!(is_allowed(Downloading, Completed));
        assert!(!is_allowed(Downloading, Idle));

        assert!(is_allowed(Focused, Downloading));
        assert!(is_allowed(Focused, Stopped));
        assert!(is_allowed(Focused, Completed));
        assert!(!is_allowed(Focused, Paused));
        assert!(!is_allowed(Focused, Idle));

        assert!(is_allowed(Paused, Downloading));
        assert!(is_allowed(Paused, Focused));
        assert!(is_allowed(Paused, Stopped));
        assert!(!is_allowed(Paused, Idle));
        assert!(!is_allowed(Paused, Completed));

        assert!(is_allowed(Stopped, Downloading));
        assert!(is_allowed(Stopped, Paused));
        assert!(is_allowed(Stopped, Idle));
        assert!(!is_allowed(Stopped, Focused));
        assert!(!is_allowed(Stopped, Completed));

        assert!(is_allowed(Completed, Stopped));
        assert!(is_allowed(Completed, Focused));
        assert!(!is_allowed(Completed, Downloading));
        assert!(!is_allowed(Completed, Idle));
        assert!(!is_allowed(Completed, Paused));
    }

    #[test]
    fn same_state_is_always_a_noop() {
        for mode in [Idle, Downloading, Focused, Paused, Stopped, Completed] {
            assert!(is_allowed(mode, mode));
        }
    }
}
