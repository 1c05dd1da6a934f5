//! Start-up configuration for the bootstrap binaries.
//!
//! Every value can come from a flag or from the environment; the Runtime API
//! endpoint is read once here and handed to the client explicitly.

use std::time::Duration;

use clap::{Args, Parser};
use lambda_bootstrap_core::retry::RetryPolicy;
use lambda_bootstrap_core::routes::{RouteError, RuntimeRoutes};
use thiserror::Error;

use crate::handlers::HandlerKind;
use crate::invocation_loop::LoopConfig;

pub const RUNTIME_API_ENV: &str = "AWS_LAMBDA_RUNTIME_API";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {env}: {0}", env = RUNTIME_API_ENV)]
    InvalidEndpoint(RouteError),
}

/// Handler selection shared by both binaries.
#[derive(Debug, Clone, Args)]
pub struct HandlerArgs {
    /// Built-in handler to serve
    #[arg(long, env = "BOOTSTRAP_HANDLER", value_enum, default_value_t = HandlerKind::Echo)]
    pub handler: HandlerKind,

    /// Request process exit after reporting a handler panic
    #[arg(long, env = "BOOTSTRAP_EXIT_ON_PANIC")]
    pub exit_on_panic: bool,
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "bootstrap",
    about = "Poll the Lambda Runtime API and dispatch invocations to a handler"
)]
pub struct BootstrapArgs {
    /// Runtime API endpoint as host:port
    #[arg(long, env = RUNTIME_API_ENV)]
    pub runtime_api: String,

    #[command(flatten)]
    pub handler: HandlerArgs,

    /// Consecutive failed polls tolerated before giving up
    #[arg(long, env = "BOOTSTRAP_MAX_POLL_RETRIES", default_value_t = 0)]
    pub max_poll_retries: u32,

    /// Delay before the first poll retry, in milliseconds
    #[arg(long, env = "BOOTSTRAP_RETRY_BASE_MS", default_value_t = 100)]
    pub retry_base_ms: u64,

    /// Upper bound for the poll retry delay, in milliseconds
    #[arg(long, env = "BOOTSTRAP_RETRY_MAX_MS", default_value_t = 5_000)]
    pub retry_max_ms: u64,

    /// Stop after this many invocations (unbounded when absent)
    #[arg(long, env = "BOOTSTRAP_MAX_INVOCATIONS")]
    pub max_invocations: Option<u64>,
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "local_runtime",
    about = "Serve framed Function.Ping / Function.Invoke calls on stdin/stdout"
)]
pub struct LocalArgs {
    #[command(flatten)]
    pub handler: HandlerArgs,
}

/// Validated configuration for the HTTP polling runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub routes: RuntimeRoutes,
    pub handler: HandlerKind,
    pub loop_config: LoopConfig,
}

impl BootstrapArgs {
    pub fn into_config(self) -> Result<BootstrapConfig, ConfigError> {
        let routes = RuntimeRoutes::new(&self.runtime_api).map_err(ConfigError::InvalidEndpoint)?;
        let retry = RetryPolicy::fail_fast()
            .with_max_retries(self.max_poll_retries)
            .with_delays(
                Duration::from_millis(self.retry_base_ms),
                Duration::from_millis(self.retry_max_ms),
            );

        Ok(BootstrapConfig {
            routes,
            handler: self.handler.handler,
            loop_config: LoopConfig {
                retry,
                exit_on_panic: self.handler.exit_on_panic,
                max_invocations: self.max_invocations,
            },
        })
    }
}
