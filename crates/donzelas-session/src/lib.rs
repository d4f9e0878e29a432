//! Session lifecycle for the Donzelas core.
//!
//! This crate owns "who is signed in, with what profile, and for how
//! long":
//! - Sign-in and sign-up serialized through a rate-limit-aware retry queue
//! - Explicit FSM-based lifecycle state (initializing, authenticated,
//!   unauthenticated)
//! - Token persistence through a pluggable vault
//! - Profile completeness repair with platform defaults
//! - Automatic sign-out after an inactivity timeout

mod backend;
mod error;
mod events;
mod fsm;
mod inactivity;
mod manager;
mod profile;

pub use backend::SessionBackend;
pub use error::{SessionError, SessionResult};
pub use events::AuthEvent;
pub use fsm::session_machine;
pub use fsm::{SessionMachine, SessionMachineInput, SessionMachineState, SessionState};
pub use inactivity::ActivitySignal;
pub use manager::{SessionConfig, SessionManager, SignInOutcome};
pub use profile::{
    normalize_account_type, Profile, ProfileUpdate, ACCOUNT_TYPES, DEFAULT_ACCOUNT_TYPE,
    DEFAULT_CITY,
};
