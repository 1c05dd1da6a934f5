use std::io;
use std::process::ExitCode;

use clap::Parser;
use lambda_bootstrap::config::LocalArgs;
use lambda_bootstrap::local::{LocalServer, ServeExit};
use lambda_bootstrap::logging;

fn main() -> anyhow::Result<ExitCode> {
    logging::init()?;
    let args = LocalArgs::parse();

    tracing::info!(
        component = "local_runtime",
        event = "runtime_started",
        handler = ?args.handler.handler,
        exit_on_panic = args.handler.exit_on_panic,
        "local runtime serving stdin/stdout"
    );

    let mut server = LocalServer::new(args.handler.handler.build(), args.handler.exit_on_panic);
    let exit = server.serve(io::stdin().lock(), io::stdout().lock())?;

    tracing::info!(
        component = "local_runtime",
        event = "runtime_stopped",
        reason = ?exit,
        "local runtime stopped"
    );

    match exit {
        ServeExit::EndOfInput => Ok(ExitCode::SUCCESS),
        ServeExit::HandlerRequestedExit { .. } => Ok(ExitCode::FAILURE),
    }
}
