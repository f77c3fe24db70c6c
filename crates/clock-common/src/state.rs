//! Lifecycle state of a bridged clock instance.
//!
//! State transitions follow the native handle's lifetime:
//! CREATING → LIVE → DESTROYING → DESTROYED
//!
//! A failed destroy returns the instance to LIVE so the caller may retry.
//! DESTROYED is terminal: the handle has been released exactly once.

use crate::error::{ClockError, ClockResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of a clock instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    /// Foreign constructor in flight; no handle yet.
    #[default]
    Creating,
    /// Handle valid and registered for event delivery.
    Live,
    /// Foreign destructor in flight.
    Destroying,
    /// Handle released; every operation is rejected.
    Destroyed,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creating => write!(f, "CREATING"),
            Self::Live => write!(f, "LIVE"),
            Self::Destroying => write!(f, "DESTROYING"),
            Self::Destroyed => write!(f, "DESTROYED"),
        }
    }
}

impl InstanceState {
    /// Check if a transition to `target` is valid from the current state.
    #[must_use]
    pub fn can_transition_to(&self, target: InstanceState) -> bool {
        use InstanceState::{Creating, Destroyed, Destroying, Live};

        matches!(
            (self, target),
            (Creating, Live)
                | (Live, Destroying)
                | (Destroying, Destroyed)
                // Foreign destructor failed; handle is still owned
                | (Destroying, Live)
        )
    }

    /// Attempt to transition to `target`, returning error if invalid.
    pub fn transition_to(&mut self, target: InstanceState) -> ClockResult<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(ClockError::InvalidInstance(format!(
                "invalid state transition from {self} to {target}"
            )))
        }
    }

    /// Returns true if requests may be sent for this instance.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Returns true once the handle has been released.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        matches!(self, Self::Destroyed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_lifecycle() {
        let mut state = InstanceState::default();
        assert_eq!(state, InstanceState::Creating);

        state.transition_to(InstanceState::Live).unwrap();
        assert!(state.is_live());

        state.transition_to(InstanceState::Destroying).unwrap();
        state.transition_to(InstanceState::Destroyed).unwrap();
        assert!(state.is_destroyed());
    }

    #[test]
    fn test_destroyed_is_terminal() {
        let mut state = InstanceState::Destroyed;
        assert!(state.transition_to(InstanceState::Live).is_err());
        assert!(state.transition_to(InstanceState::Destroying).is_err());
        assert_eq!(state, InstanceState::Destroyed);
    }

    #[test]
    fn test_failed_destroy_returns_to_live() {
        let mut state = InstanceState::Live;
        state.transition_to(InstanceState::Destroying).unwrap();
        state.transition_to(InstanceState::Live).unwrap();
        assert!(state.is_live());
    }

    #[test]
    fn test_invalid_transition_reports_states() {
        let mut state = InstanceState::Creating;
        let err = state.transition_to(InstanceState::Destroyed).unwrap_err();
        assert_eq!(
            err,
            ClockError::InvalidInstance(
                "invalid state transition from CREATING to DESTROYED".into()
            )
        );
    }
}
