// sesh - terminal session manager for AWS IAM Identity Center

mod auth;
mod aws;
mod browser;
mod catalog;
mod cli;
mod error;
mod models;
mod session;
mod store;
mod ui;

use clap::Parser;
use std::fs::OpenOptions;
use tracing_subscriber::fmt::writer::MakeWriterExt;

#[tokio::main]
async fn main() {
    let args = cli::Cli::parse();

    // TUI mode must keep the terminal clean, so logs go to a file there;
    // everything else logs to stderr.
    let is_tui_mode = args.args.is_empty() && !args.browser && !args.version;
    init_tracing(is_tui_mode);

    if let Err(e) = cli::execute(args).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(to_file: bool) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    if to_file {
        let log_dir = dirs::cache_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("/tmp"))
            .join("sesh");
        let _ = std::fs::create_dir_all(&log_dir);

        let file = match OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join("sesh.log"))
        {
            Ok(file) => file,
            Err(_) => {
                // Fall back to stderr rather than refusing to start.
                tracing_subscriber::fmt().with_env_filter(filter).init();
                return;
            }
        };

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(file.with_max_level(tracing::Level::TRACE))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
