//! Connection state machine

use crate::{Error, Result};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live session (never connected, or cleanly closed)
    Idle,

    /// Building the transport and performing the TLS handshake
    Connecting,

    /// Session established, ready for reads and writes
    Active,

    /// Tearing down a session after a transient failure or an explicit close
    Closing,

    /// Last operation failed terminally (fatal error or retries exhausted)
    Failed,
}

impl ConnectionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Idle, Connecting)
                | (Failed, Connecting)
                | (Closing, Connecting)
                // transport reports a stale session
                | (Active, Connecting)
                | (Connecting, Active)
                | (Connecting, Closing)
                | (Connecting, Failed)
                | (Connecting, Idle)
                | (Active, Closing)
                // transport kept after a failed handshake
                | (Idle, Closing)
                | (Idle, Failed)
                | (Active, Failed)
                | (Closing, Idle)
                | (Closing, Failed)
                | (Failed, Idle)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {:?}", self),
                actual: format!("{:?}", next),
            });
        }
        tracing::trace!(from = %self, to = %next, "connection state transition");
        *self = next;
        Ok(())
    }

    /// Force the machine back to `Idle` from wherever it was left
    ///
    /// Only for recovering from an operation that was dropped mid-flight, when the
    /// recorded state no longer describes the (discarded) transport.
    pub fn reset(&mut self) {
        if *self != ConnectionState::Idle {
            tracing::trace!(from = %self, "connection state reset");
            *self = ConnectionState::Idle;
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Active => write!(f, "active"),
            Self::Closing => write!(f, "closing"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
