mod arg_parser;
mod job_cli;

use arg_parser::{ArgParser, SubCommand};
use job_cli::JobCli;

use anyhow::Result;
use clap::Parser;
use joblib::{Config, JobCoordinator};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = ArgParser::parse();
    init_tracing(args.verbose);

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(root) = args.root {
        config.root = root;
    }
    tracing::debug!("using job store at {}", config.root.display());

    let cli = JobCli::new(JobCoordinator::spawn(config));
    match args.sub_command {
        SubCommand::Launch {
            name,
            command,
            detach: true,
        } => cli.launch_detached(&name, &command).await?,
        SubCommand::Launch { name, command, .. } => {
            let code = cli.launch(&name, &command).await?;
            return Ok(job_exit_code(code));
        }
        SubCommand::List => cli.list().await?,
        SubCommand::Status { job_id } => cli.status(job_id).await?,
        SubCommand::Tail { job_id } => cli.tail(job_id).await?,
        SubCommand::Stop { job_id } => cli.stop(job_id).await?,
        SubCommand::Wait { job_id } => {
            let code = cli.wait(job_id).await?;
            return Ok(job_exit_code(code));
        }
        SubCommand::Export => cli.export().await?,
    }

    Ok(ExitCode::SUCCESS)
}

/// RUST_LOG wins; otherwise -v raises the level from the default of warnings.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

// negative sentinels and out-of-range codes collapse to a generic failure
fn job_exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}
