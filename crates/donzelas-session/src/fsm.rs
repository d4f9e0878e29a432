//! Session lifecycle state machine using rust-fsm.
//!
//! The machine makes the legal lifecycle transitions explicit instead of
//! deriving "signed in or not" from whatever happens to be in the vault.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │  Initializing   │ (initial)
//! └───┬─────────┬───┘
//!     │         │ RestoreFailed
//!     │         ▼
//!     │  ┌─────────────────┐
//!     │  │ Unauthenticated │ ◄──┐
//!     │  └────────┬────────┘    │
//!     │           │ SignedIn    │ SignedOut
//!     │           ▼             │
//!     │  ┌─────────────────┐    │
//!     └─►│  Authenticated  │ ───┘
//!        └─────────────────┘
//!   (SessionRestored / SignedIn)
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

// Define the FSM using rust-fsm's declarative macro
// This generates a module `session_machine` with:
// - session_machine::State (enum)
// - session_machine::Input (enum)
// - session_machine::StateMachine (type alias)
state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Initializing)

    Initializing => {
        SessionRestored => Authenticated,
        RestoreFailed => Unauthenticated,
        SignedIn => Authenticated
    },
    Unauthenticated => {
        SignedIn => Authenticated
    },
    Authenticated => {
        // A repeated sign-in (or a restored-session notification) keeps
        // the session; only SignedOut ends it
        SignedIn => Authenticated,
        SessionRestored => Authenticated,
        SignedOut => Unauthenticated
    }
}

// Re-export the generated types with clearer names
pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// User-facing session state for UI and event consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Startup restore has not resolved yet.
    Initializing,
    /// A user is signed in with a live session.
    Authenticated,
    /// No session (never signed in, signed out, or restore failed).
    Unauthenticated,
}

impl SessionState {
    /// Returns true if a user is signed in.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated)
    }
}

impl From<&SessionMachineState> for SessionState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Initializing => SessionState::Initializing,
            SessionMachineState::Authenticated => SessionState::Authenticated,
            SessionMachineState::Unauthenticated => SessionState::Unauthenticated,
        }
    }
}
