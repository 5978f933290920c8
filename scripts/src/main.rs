use clap::Parser;
use tracing::error;
use vault_scripts::{cli::Cli, errors::ScriptError, events::TracingSink};

/// Parse the CLI and run the selected command
async fn run() -> Result<(), ScriptError> {
    Cli::parse().run(&TracingSink).await
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().pretty().init();

    if let Err(e) = run().await {
        error!("{e}");
        eprintln!("{e}");
        std::process::exit(1);
    }
}
