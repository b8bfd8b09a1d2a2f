//! Transport session state machine
//!
//! # State Diagram
//!
//! ```text
//!            open()                      send() pending
//! ┌────────┐ ─────► ┌─────────┐ ─────► ┌──────┐ ─────► ┌──────────────┐
//! │ Closed │        │ Opening │        │ Open │ ◄───── │ WritePending │
//! └────────┘ ◄───── └─────────┘        └──────┘  done  └──────────────┘
//!      ▲   rejected       │              │  ▲
//!      │                  ▼              ▼  │ done
//!      │              ┌───────┐      ┌─────────────┐
//!      └───────────── │ Error │ ◄─── │ ReadPending │
//!         close()     └───────┘      └─────────────┘
//! ```
//!
//! Reads and writes may be in flight at the same time; the state reports the
//! write first because it is what gates the flush scheduler.

use uartlog_core::{UartLogError, UartLogResult};

/// Lifecycle state of a transport session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// No port held (initial state)
    #[default]
    Closed,
    /// Port is being acquired and configured
    Opening,
    /// Port is open and idle
    Open,
    /// A write has been submitted and not yet completed
    WritePending,
    /// A read has been submitted and not yet completed
    ReadPending,
    /// The session failed unrecoverably; the port has been released
    Error,
}

impl TransportState {
    /// Check if the session holds an open port
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            TransportState::Open | TransportState::WritePending | TransportState::ReadPending
        )
    }

    /// Check if `open` may be called from this state
    pub fn can_open(&self) -> bool {
        matches!(self, TransportState::Closed | TransportState::Error)
    }

    /// Validate state transition
    ///
    /// # Valid Transitions
    /// - `Closed`/`Error` -> `Opening` (on open)
    /// - `Opening` -> `Open` (port configured)
    /// - `Opening` -> `Closed` (port unavailable)
    /// - `Opening` -> `Error` (configuration rejected)
    /// - `Open` <-> `WritePending`/`ReadPending` (I/O in flight)
    /// - `WritePending` <-> `ReadPending` (the other direction completes)
    /// - any open state -> `Error` (device removed)
    /// - any state -> `Closed` (on close)
    pub fn validate_transition(&self, new_state: TransportState) -> UartLogResult<()> {
        use TransportState::*;

        let valid = match (*self, new_state) {
            (Closed | Error, Opening) => true,
            (Opening, Open | Closed | Error) => true,
            (Open, WritePending | ReadPending) => true,
            (WritePending | ReadPending, Open) => true,
            (WritePending, ReadPending) | (ReadPending, WritePending) => true,
            (Open | WritePending | ReadPending, Error) => true,
            (_, Closed) => true,
            // Self-transitions (idempotent operations)
            (Open, Open) | (WritePending, WritePending) | (ReadPending, ReadPending) => true,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(UartLogError::InvalidState(format!(
                "Invalid state transition: {:?} -> {:?}",
                self, new_state
            )))
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportState::Closed => "Closed",
            TransportState::Opening => "Opening",
            TransportState::Open => "Open",
            TransportState::WritePending => "WritePending",
            TransportState::ReadPending => "ReadPending",
            TransportState::Error => "Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(TransportState::Closed.can_open());
        assert!(TransportState::Error.can_open());
        assert!(!TransportState::Open.can_open());
        assert!(TransportState::WritePending.is_open());
        assert!(!TransportState::Opening.is_open());
        assert_eq!(TransportState::default(), TransportState::Closed);
    }

    #[test]
    fn test_valid_transitions() {
        let closed = TransportState::Closed;
        assert!(closed.validate_transition(TransportState::Opening).is_ok());
        assert!(TransportState::Opening.validate_transition(TransportState::Open).is_ok());
        assert!(TransportState::Open.validate_transition(TransportState::WritePending).is_ok());
        assert!(TransportState::WritePending.validate_transition(TransportState::Open).is_ok());
        assert!(TransportState::ReadPending.validate_transition(TransportState::Error).is_ok());
        assert!(TransportState::Error.validate_transition(TransportState::Opening).is_ok());
        assert!(TransportState::Error.validate_transition(TransportState::Closed).is_ok());
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(TransportState::Closed.validate_transition(TransportState::Open).is_err());
        assert!(TransportState::Closed.validate_transition(TransportState::WritePending).is_err());
        assert!(TransportState::Open.validate_transition(TransportState::Opening).is_err());
        assert!(TransportState::Error.validate_transition(TransportState::Open).is_err());
    }
}
