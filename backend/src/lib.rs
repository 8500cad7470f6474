//! HTTP façade over the lending protocol core.
//!
//! The backend authenticates callers with bearer tokens, resolves each token
//! to a principal, and forwards every operation to the orchestration gateway
//! behind a single mutex, the serialization point the protocol's atomicity
//! guarantee depends on.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
