// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Whether the service's readers and subscriptions are bound to a session.

use crate::client::connection::ConnectionChange;

/// Binding of the service to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WiringState {
    /// No session bound.
    #[default]
    Unwired,
    /// Bound to the session with this id.
    Wired(u64),
}

/// What the wiring listener must do for a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WiringAction {
    /// Bind to the session.
    Wire(u64),
    /// Drop the binding; start auto-reconnect when `reconnect` is set.
    Unwire {
        /// The loss was not requested.
        reconnect: bool,
    },
    /// Already bound, or nothing to bind.
    Nothing,
}

impl WiringState {
    /// Next state and the action it requires.
    pub fn on(self, change: &ConnectionChange) -> (WiringState, WiringAction) {
        match (self, change.online, change.session_id) {
            (Self::Wired(current), true, Some(id)) if current == id => (self, WiringAction::Nothing),
            (_, true, Some(id)) => (Self::Wired(id), WiringAction::Wire(id)),
            // Online without a session id cannot be bound.
            (_, true, None) => (self, WiringAction::Nothing),
            // Loss of a session that was already superseded.
            (Self::Wired(current), false, Some(id)) if current != id => (self, WiringAction::Nothing),
            (_, false, _) => (
                Self::Unwired,
                WiringAction::Unwire {
                    reconnect: change.reason.is_fault(),
                },
            ),
        }
    }

    /// Returns `true` when bound.
    pub fn is_wired(&self) -> bool {
        matches!(self, Self::Wired(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::connection::ChangeReason;

    fn online(id: u64) -> ConnectionChange {
        ConnectionChange {
            online: true,
            session_id: Some(id),
            reason: ChangeReason::Connected,
        }
    }

    fn offline(reason: ChangeReason) -> ConnectionChange {
        ConnectionChange {
            online: false,
            session_id: Some(1),
            reason,
        }
    }

    #[test]
    fn test_wire_transitions() {
        let (s, a) = WiringState::Unwired.on(&online(1));
        assert_eq!((s, a), (WiringState::Wired(1), WiringAction::Wire(1)));

        let (s, a) = s.on(&online(1));
        assert_eq!((s, a), (WiringState::Wired(1), WiringAction::Nothing));

        let (s, a) = s.on(&online(2));
        assert_eq!((s, a), (WiringState::Wired(2), WiringAction::Wire(2)));
        assert!(s.is_wired());
    }

    #[test]
    fn test_unwire_transitions() {
        let wired = WiringState::Wired(1);

        let (s, a) = wired.on(&offline(ChangeReason::KeepAliveFailed));
        assert_eq!(s, WiringState::Unwired);
        assert_eq!(a, WiringAction::Unwire { reconnect: true });

        let (_, a) = wired.on(&offline(ChangeReason::SessionClosing));
        assert_eq!(a, WiringAction::Unwire { reconnect: true });

        let (s, a) = wired.on(&offline(ChangeReason::Requested));
        assert_eq!(s, WiringState::Unwired);
        assert_eq!(a, WiringAction::Unwire { reconnect: false });

        let (_, a) = WiringState::Unwired.on(&offline(ChangeReason::KeepAliveFailed));
        assert_eq!(a, WiringAction::Unwire { reconnect: true });
    }

    #[test]
    fn test_stale_offline_is_ignored() {
        let (s, a) = WiringState::Wired(2).on(&offline(ChangeReason::KeepAliveFailed));
        assert_eq!((s, a), (WiringState::Wired(2), WiringAction::Nothing));
    }
}
