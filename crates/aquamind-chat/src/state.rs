//! Turn state machine for a session.
//!
//! A session alternates between `Idle` and `AwaitingResponse`. The state is
//! published through a `watch` channel so observers always see the latest
//! value, and the Idle -> AwaitingResponse transition is a single atomic
//! compare-and-set on that channel.

use std::fmt;

use serde::Serialize;
use tokio::sync::watch;

use crate::error::ChatError;

/// Whether a session is free to accept a new turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    AwaitingResponse,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnState::Idle => write!(f, "Idle"),
            TurnState::AwaitingResponse => write!(f, "AwaitingResponse"),
        }
    }
}

impl TurnState {
    pub fn can_transition_to(&self, target: &TurnState) -> bool {
        matches!(
            (self, target),
            (TurnState::Idle, TurnState::AwaitingResponse)
                | (TurnState::AwaitingResponse, TurnState::Idle)
        )
    }
}

/// Owns the turn state of one session.
#[derive(Debug)]
pub struct TurnStateMachine {
    tx: watch::Sender<TurnState>,
}

impl Default for TurnStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnStateMachine {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(TurnState::Idle);
        Self { tx }
    }

    pub fn current(&self) -> TurnState {
        *self.tx.borrow()
    }

    pub fn is_idle(&self) -> bool {
        self.current() == TurnState::Idle
    }

    /// Claim the session for a turn.
    ///
    /// Fails with `TurnInProgress` unless the session is idle. The returned
    /// guard puts the session back to `Idle` when dropped.
    pub fn begin_turn(&self) -> Result<TurnGuard<'_>, ChatError> {
        let claimed = self.tx.send_if_modified(|state| {
            if state.can_transition_to(&TurnState::AwaitingResponse) {
                *state = TurnState::AwaitingResponse;
                true
            } else {
                false
            }
        });

        if claimed {
            tracing::debug!("Turn state: Idle -> AwaitingResponse");
            Ok(TurnGuard { machine: self })
        } else {
            Err(ChatError::TurnInProgress)
        }
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<TurnState> {
        self.tx.subscribe()
    }

    fn release(&self) {
        self.tx.send_if_modified(|state| {
            if *state == TurnState::Idle {
                false
            } else {
                *state = TurnState::Idle;
                true
            }
        });
        tracing::debug!("Turn state: AwaitingResponse -> Idle");
    }
}

/// Held for the duration of a turn.
#[derive(Debug)]
pub struct TurnGuard<'a> {
    machine: &'a TurnStateMachine,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.machine.release();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_idle() {
        let machine = TurnStateMachine::new();
        assert_eq!(machine.current(), TurnState::Idle);
        assert!(machine.is_idle());
    }

    #[test]
    fn test_transitions() {
        assert!(TurnState::Idle.can_transition_to(&TurnState::AwaitingResponse));
        assert!(TurnState::AwaitingResponse.can_transition_to(&TurnState::Idle));
        assert!(!TurnState::Idle.can_transition_to(&TurnState::Idle));
        assert!(!TurnState::AwaitingResponse.can_transition_to(&TurnState::AwaitingResponse));
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let machine = TurnStateMachine::new();
        {
            let _guard = machine.begin_turn().unwrap();
            assert_eq!(machine.current(), TurnState::AwaitingResponse);
        }
        assert_eq!(machine.current(), TurnState::Idle);
    }

    #[test]
    fn test_second_turn_rejected_while_pending() {
        let machine = TurnStateMachine::new();
        let guard = machine.begin_turn().unwrap();
        assert!(matches!(machine.begin_turn(), Err(ChatError::TurnInProgress)));
        drop(guard);
        assert!(machine.begin_turn().is_ok());
    }

    #[test]
    fn test_display_and_serialize() {
        assert_eq!(TurnState::AwaitingResponse.to_string(), "AwaitingResponse");
        assert_eq!(
            serde_json::to_string(&TurnState::AwaitingResponse).unwrap(),
            "\"awaiting_response\""
        );
    }

    #[tokio::test]
    async fn test_subscribers_observe_changes() {
        let machine = TurnStateMachine::new();
        let mut rx = machine.subscribe();
        assert_eq!(*rx.borrow_and_update(), TurnState::Idle);

        let guard = machine.begin_turn().unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), TurnState::AwaitingResponse);

        drop(guard);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), TurnState::Idle);
    }
}
