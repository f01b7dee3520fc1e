use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use tftp_client::{bootstrap, cli::Cli, engine};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tftp-client: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let direction = cli.direction()?;
    let port = cli.resolve_port()?;
    let (remote_file, local_file) = cli.endpoints(direction);

    let req = bootstrap::Request {
        host: &cli.host,
        port,
        direction,
        remote_file: &remote_file,
        local_file: &local_file,
        mode: "octet",
        verbose: cli.verbose,
    };

    let mut session = bootstrap::bootstrap(&req).await?;
    engine::run(&mut session).await
    // `session` drops here, closing the socket and file exactly once
    // regardless of whether `engine::run` returned `Ok` or `Err`.
}
