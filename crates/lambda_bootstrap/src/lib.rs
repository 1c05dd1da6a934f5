//! Lambda custom runtime bootstrap.
//!
//! Polls the Runtime API for invocations, runs each one through a
//! [`Handler`](adapter::Handler) and reports the outcome. The same handlers can
//! also be served over the framed local channel in [`local`].
//! Wire records, routes and retry policy live in `lambda_bootstrap_core`.

pub mod adapter;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod invocation_loop;
pub mod local;
pub mod logging;
mod metadata;

pub use lambda_bootstrap_core::{protocol, retry, routes};

pub use adapter::{handler_fn, invoke_handler, json_handler, Handler};
pub use client::{RuntimeApi, RuntimeClient};
pub use error::{ClientError, LoopError};
pub use invocation_loop::{InvocationLoop, LoopConfig, LoopExit, LoopStats};
