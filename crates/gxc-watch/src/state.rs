//! Watch lifecycle
//!
//! `Idle → Resolving → Live → Terminated`. Any state may terminate;
//! `Terminated` is final and a new subscription is the only way back.

use crate::error::WatchError;
use serde::{Deserialize, Serialize};

/// Lifecycle state of one watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchState {
    /// Created, pipeline not started
    #[default]
    Idle,
    /// Waiting for the collection and the first page
    Resolving,
    /// Subscribed to changes, emitting debounced pages
    Live,
    /// Cancelled, failed, or timed out
    Terminated,
}

impl WatchState {
    /// Whether no further pages can be produced
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: WatchState) -> &'static [WatchState] {
    use WatchState::*;
    match from {
        Idle => &[Resolving, Terminated],
        Resolving => &[Live, Terminated],
        Live => &[Terminated],
        Terminated => &[],
    }
}

/// Validates a state transition.
///
/// # Errors
/// - `WatchError::IllegalTransition` if `to` is not reachable from `from`
pub fn validate_transition(from: WatchState, to: WatchState) -> Result<(), WatchError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(WatchError::IllegalTransition { from, to })
    }
}
