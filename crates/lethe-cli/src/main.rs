mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { max_in_flight } => commands::run(max_in_flight).await,
        Command::Process { request_id } => commands::process(request_id).await,
        Command::Status { request_id } => commands::status(request_id).await,
        Command::List { status } => commands::list(status).await,
        Command::Submit {
            patient_id_hash,
            requester,
        } => commands::submit(patient_id_hash, requester).await,
        Command::Approve { request_id } => commands::approve(request_id).await,
        Command::Demo => commands::demo().await,
    }
}
