//! Shared Lambda runtime bootstrap primitives.
//!
//! This crate owns the transport-independent records exchanged with the
//! control plane, the Runtime API route and header contract, and the poll
//! retry schedule. It intentionally excludes HTTP clients and process wiring.

pub mod protocol;
pub mod retry;
pub mod routes;
