use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use skillvet::cli::{self, Cli};

fn main() -> Result<()> {
    // Keep the report as the only stdout output; engine diagnostics go to
    // stderr at warn level and below.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();
    let code = cli::run(cli)?;
    std::process::exit(code);
}
