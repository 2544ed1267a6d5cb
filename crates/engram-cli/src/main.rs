//! engram-cli - management tool for a running engram daemon

use clap::{Parser, Subcommand};

mod client;
mod commands;
mod error;
mod output;

use client::ApiClient;
use commands::{CharactersCommand, ExportCommand, HealthCommand, ImportCommand, MemoryCommand};
use error::CliResult;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "engram-cli")]
#[command(about = "Engram CLI - Management tool for the engram daemon")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(
        long,
        short,
        global = true,
        default_value = "http://127.0.0.1:8123",
        help = "Base URL of the engram daemon"
    )]
    pub server: String,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "List characters with per-tier memory counts")]
    Characters(CharactersCommand),

    #[clap(about = "Memory management commands")]
    Memory(MemoryCommand),

    #[clap(about = "Export a character's memories as a JSON bundle")]
    Export(ExportCommand),

    #[clap(about = "Bulk import memories from a JSON bundle")]
    Import(ImportCommand),

    #[clap(about = "Show daemon component health")]
    Health(HealthCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let client = ApiClient::new(cli.server.clone());

    match &cli.command {
        Command::Characters(cmd) => cmd.execute(&client, format).await,
        Command::Memory(cmd) => cmd.execute(&client, format).await,
        Command::Export(cmd) => cmd.execute(&client, format).await,
        Command::Import(cmd) => cmd.execute(&client, format).await,
        Command::Health(cmd) => cmd.execute(&client, format).await,
    }
}
