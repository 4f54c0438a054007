use clap::{Parser, Subcommand};

mod commands;

use commands::{PaperSessionArgs, ScanArgs, ShowConfigArgs};

#[derive(Parser)]
#[command(name = "zdte")]
#[command(about = "Preview, confirm and paper-execute same-day-expiry option trades", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded chain, preview a strategy, mint and optionally confirm it
    Paper(PaperSessionArgs),
    /// Rank straddle candidates in a recorded chain
    Scan(ScanArgs),
    /// Print the resolved configuration as JSON
    Config(ShowConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Paper(args) => commands::paper_session::run(args).await?,
        Commands::Scan(args) => commands::paper_session::run_scan(args).await?,
        Commands::Config(args) => commands::show_config::run(&args)?,
    }

    Ok(())
}
