mod cli;

use anyhow::Result;
use cli::{Cli, Command};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // RUST_LOG wins over -v
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::List => cli::list(),
        Command::Validate(args) => cli::validate(&args)?,
        Command::Run(args) => {
            let cancel = Arc::new(AtomicBool::new(false));
            let flag = cancel.clone();
            tokio::spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    if cli::interrupt(&flag) {
                        warn!("second interrupt, exiting");
                        std::process::exit(130);
                    }
                    warn!("interrupt received, cancelling (press Ctrl-C again to exit now)");
                }
            });
            cli::run(args, cancel).await?;
        }
    }

    Ok(())
}
