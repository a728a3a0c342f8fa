//! atlas - command-line client for JIRA and Confluence

use clap::Parser;

use atlas_cli::cli::Cli;
use atlas_cli::{commands, logging};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("Warning: could not initialize logging: {}", e);
    }

    if let Err(e) = commands::run(cli).await {
        eprintln!("Error: {}", e.user_message());
        std::process::exit(e.exit_code());
    }
}
