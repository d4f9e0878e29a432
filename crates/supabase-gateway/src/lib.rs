//! Supabase API client for the Donzelas client core.
//!
//! Wraps the three API surfaces the app uses:
//! - **Auth (GoTrue)**: password grant, sign-up, refresh, sign-out
//! - **Tables (PostgREST)**: select, insert, upsert, update, delete, RPC
//! - **Storage**: upload, list, remove, signed URLs
//!
//! Errors carry enough classification ([`GatewayError::is_rate_limited`],
//! [`GatewayError::is_transient`]) for the retry queue to decide how to
//! handle a failure.

mod auth;
mod client;
mod error;
mod object_store;
mod tables;

pub use auth::{AuthSession, AuthUser, SignUpOutcome, UserAttributes};
pub use client::SupabaseGateway;
pub use error::{GatewayError, GatewayResult};
pub use object_store::ObjectInfo;
