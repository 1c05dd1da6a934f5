use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use lambda_bootstrap::config::BootstrapArgs;
use lambda_bootstrap::{logging, InvocationLoop, LoopExit, RuntimeClient};

fn main() -> anyhow::Result<ExitCode> {
    logging::init()?;

    let config = BootstrapArgs::parse()
        .into_config()
        .context("invalid bootstrap configuration")?;
    let client = RuntimeClient::with_routes(config.routes.clone())
        .context("failed to build runtime api client")?;

    tracing::info!(
        component = "bootstrap",
        event = "runtime_started",
        endpoint = %config.routes.base_url(),
        handler = ?config.handler,
        max_poll_retries = config.loop_config.retry.max_retries,
        exit_on_panic = config.loop_config.exit_on_panic,
        "runtime started"
    );

    let mut invocation_loop =
        InvocationLoop::new(client, config.handler.build(), config.loop_config);
    match invocation_loop.run()? {
        LoopExit::InvocationLimitReached { .. } => Ok(ExitCode::SUCCESS),
        LoopExit::HandlerRequestedExit { .. } => Ok(ExitCode::FAILURE),
    }
}
