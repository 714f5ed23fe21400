//! Connection lifecycle state machine
//!
//! AwaitingPairing -> Authenticated -> Ready, with Disconnected reachable from
//! any state and looping back to AwaitingPairing (new QR) or Authenticated
//! (restored session). Events outside that order are logged but not refused:
//! the session follows whatever the transport reports.

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::warn;

/// Connection phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    AwaitingPairing,
    Authenticated,
    Ready,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::AwaitingPairing => write!(f, "awaiting_pairing"),
            ConnectionState::Authenticated => write!(f, "authenticated"),
            ConnectionState::Ready => write!(f, "ready"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

impl ConnectionState {
    /// Whether the lifecycle permits moving from `self` to `next`
    pub fn can_transition(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (_, Disconnected)
                | (AwaitingPairing, AwaitingPairing)
                | (AwaitingPairing, Authenticated)
                | (Authenticated, Ready)
                | (Disconnected, AwaitingPairing)
                | (Disconnected, Authenticated)
        )
    }
}

/// What the caller must do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// State changed; nothing else to do
    Applied,
    /// Entered Ready: start the status poller
    StartPoller,
    /// Left Ready: stop the status poller
    StopPoller,
    /// Repeated event for the current state; ignored
    Ignored,
}

/// Process-wide session state, mutated only through the transition methods
#[derive(Debug, Clone)]
pub struct SessionState {
    state: ConnectionState,
    qr_token: Option<String>,
    user: Option<String>,
    started_at: DateTime<Utc>,
    ready_since: Option<DateTime<Utc>>,
    last_disconnect: Option<String>,
}

impl SessionState {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            state: ConnectionState::AwaitingPairing,
            qr_token: None,
            user: None,
            started_at,
            ready_since: None,
            last_disconnect: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn qr_token(&self) -> Option<&str> {
        self.qr_token.as_deref()
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn last_disconnect(&self) -> Option<&str> {
        self.last_disconnect.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn ready_since(&self) -> Option<DateTime<Utc>> {
        self.ready_since
    }

    /// Seconds since process start
    pub fn uptime_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_seconds().max(0)
    }

    /// A new pairing token was issued; replaces any previous token
    pub fn on_qr(&mut self, token: String) -> Transition {
        let transition = self.advance(ConnectionState::AwaitingPairing);
        self.qr_token = Some(token);
        transition
    }

    pub fn on_authenticated(&mut self) -> Transition {
        if self.state == ConnectionState::Authenticated {
            return Transition::Ignored;
        }
        self.advance(ConnectionState::Authenticated)
    }

    /// Entered Ready: clears the token; asks for the poller only on first entry
    pub fn on_ready(&mut self, user: Option<String>, now: DateTime<Utc>) -> Transition {
        if self.state == ConnectionState::Ready {
            return Transition::Ignored;
        }
        let transition = self.advance(ConnectionState::Ready);
        self.qr_token = None;
        self.user = user;
        self.ready_since = Some(now);
        transition
    }

    pub fn on_disconnected(&mut self, reason: String) -> Transition {
        let transition = self.advance(ConnectionState::Disconnected);
        self.last_disconnect = Some(reason);
        transition
    }

    /// Move to `next`. The transport is authoritative, so an out-of-order
    /// event is logged and still applied.
    fn advance(&mut self, next: ConnectionState) -> Transition {
        let prev = self.state;
        if !prev.can_transition(next) {
            warn!("{}, applying anyway", Error::InvalidTransition { from: prev, to: next });
        }
        self.state = next;

        match (prev == ConnectionState::Ready, next == ConnectionState::Ready) {
            (false, true) => Transition::StartPoller,
            (true, false) => {
                self.ready_since = None;
                Transition::StopPoller
            }
            _ => Transition::Applied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_happy_path() {
        let mut s = SessionState::new(t0());
        assert_eq!(s.state(), ConnectionState::AwaitingPairing);

        assert_eq!(s.on_qr("tok-1".into()), Transition::Applied);
        assert_eq!(s.qr_token(), Some("tok-1"));

        assert_eq!(s.on_authenticated(), Transition::Applied);
        assert_eq!(s.state(), ConnectionState::Authenticated);

        assert_eq!(s.on_ready(Some("Jane".into()), t0()), Transition::StartPoller);
        assert!(s.is_connected());
        assert_eq!(s.qr_token(), None);
        assert_eq!(s.user(), Some("Jane"));
    }

    #[test]
    fn test_qr_refresh_replaces_token() {
        let mut s = SessionState::new(t0());
        s.on_qr("tok-1".into());
        s.on_qr("tok-2".into());
        assert_eq!(s.qr_token(), Some("tok-2"));
    }

    #[test]
    fn test_repeated_ready_does_not_restart_poller() {
        let mut s = SessionState::new(t0());
        s.on_authenticated();
        assert_eq!(s.on_ready(None, t0()), Transition::StartPoller);
        assert_eq!(s.on_ready(None, t0()), Transition::Ignored);
    }

    #[test]
    fn test_disconnect_from_ready_stops_poller() {
        let mut s = SessionState::new(t0());
        s.on_authenticated();
        s.on_ready(None, t0());
        assert_eq!(
            s.on_disconnected("LOGOUT".into()),
            Transition::StopPoller
        );
        assert_eq!(s.state(), ConnectionState::Disconnected);
        assert_eq!(s.last_disconnect(), Some("LOGOUT"));
        assert!(s.ready_since().is_none());
    }

    #[test]
    fn test_disconnect_reachable_from_any_state() {
        for setup in 0..3 {
            let mut s = SessionState::new(t0());
            if setup >= 1 {
                s.on_authenticated();
            }
            if setup >= 2 {
                s.on_ready(None, t0());
            }
            s.on_disconnected("x".into());
            assert_eq!(s.state(), ConnectionState::Disconnected);
        }
    }

    #[test]
    fn test_repairing_after_disconnect() {
        let mut s = SessionState::new(t0());
        s.on_authenticated();
        s.on_ready(None, t0());
        s.on_disconnected("NAVIGATION".into());

        s.on_qr("tok-3".into());
        assert_eq!(s.state(), ConnectionState::AwaitingPairing);
        s.on_authenticated();
        assert_eq!(s.on_ready(None, t0()), Transition::StartPoller);
    }

    #[test]
    fn test_ready_without_authenticated_is_applied() {
        let mut s = SessionState::new(t0());
        s.on_qr("tok-1".into());
        assert_eq!(s.on_ready(Some("Jane".into()), t0()), Transition::StartPoller);
        assert!(s.is_connected());
        assert_eq!(s.qr_token(), None);
    }

    #[test]
    fn test_leaving_ready_out_of_order_stops_poller() {
        let mut s = SessionState::new(t0());
        s.on_authenticated();
        s.on_ready(None, t0());

        assert_eq!(s.on_qr("late".into()), Transition::StopPoller);
        assert_eq!(s.state(), ConnectionState::AwaitingPairing);
        assert_eq!(s.qr_token(), Some("late"));
        assert!(s.ready_since().is_none());

        s.on_ready(None, t0());
        assert_eq!(s.on_authenticated(), Transition::StopPoller);
        assert_eq!(s.state(), ConnectionState::Authenticated);
    }

    #[test]
    fn test_can_transition_table() {
        use ConnectionState::*;
        assert!(AwaitingPairing.can_transition(Authenticated));
        assert!(Ready.can_transition(Disconnected));
        assert!(Disconnected.can_transition(AwaitingPairing));
        assert!(!AwaitingPairing.can_transition(Ready));
        assert!(!Ready.can_transition(AwaitingPairing));
    }

    #[test]
    fn test_uptime() {
        let s = SessionState::new(t0());
        let later = t0() + chrono::Duration::seconds(90);
        assert_eq!(s.uptime_secs(later), 90);
        assert_eq!(s.uptime_secs(t0() - chrono::Duration::seconds(5)), 0);
    }
}
