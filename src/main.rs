mod app;
mod checker;
mod config;
mod email;
mod error;
mod extractor;
mod fetcher;
mod logger;
mod models;
mod notifier;
mod sync;
mod tracking;
mod url_info;
mod utils;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

#[derive(Parser)]
#[command(name = "showtime-alert")]
#[command(about = "Check booking pages for a movie once and email when tickets open")]
struct Cli {
    /// Use this config file instead of the XDG default
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only check availability, send nothing
    #[arg(long)]
    no_email: bool,

    /// Notify every available theatre, ignoring and not updating the tracking file
    #[arg(long)]
    no_tracking: bool,

    /// Log debug output to the log file and info to the console
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    app::run_once(app::RunOptions {
        config_path: cli.config.as_deref(),
        no_email: cli.no_email,
        no_tracking: cli.no_tracking,
        verbose: cli.verbose,
    })
    .await
}
