//! AutoMock command-line interface

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

mod generate_commands;
mod inspect_commands;
mod progress;
mod prompts;
mod store;

#[derive(Parser)]
#[command(name = "automock")]
#[command(about = "AutoMock - generate MockServer expectations from API collections")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Set log level (error, warn, info, debug, trace)
    #[arg(short = 'v', long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a collection against its real endpoints and generate a
    /// MockServer expectation set
    Generate(generate_commands::GenerateArgs),

    /// Parse a collection and show the execution plan without running it
    Inspect(inspect_commands::InspectArgs),

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&cli.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    match cli.command {
        Commands::Generate(args) => generate_commands::run(args).await,
        Commands::Inspect(args) => inspect_commands::run(args),
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            let name = command.get_name().to_string();
            generate(shell, &mut command, name, &mut std::io::stdout());
            Ok(())
        }
    }
}
