mod cmd;
mod output;

use clap::{Parser, Subcommand};
use mt5d_core::types::StepId;

#[derive(Parser)]
#[command(
    name = "mt5d",
    about = "Provision, monitor and supervise MetaTrader 5 running under Wine",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the Wine prefix and start the health monitor (default)
    Start,

    /// Run a single provisioning step
    Step {
        /// Step id, e.g. install-terminal
        id: StepId,
    },

    /// List provisioning steps in execution order
    Steps,

    /// Show the startup signal, pending restarts and recorded steps
    Status,

    /// Forget completed steps so they run again
    Reset {
        /// Step id to reset
        step: Option<StepId>,

        /// Reset every step and clear the startup signal
        #[arg(long, conflicts_with = "step")]
        all: bool,
    },

    /// Print the resolved configuration
    Config,

    /// Watch the terminal and bridge and request restarts
    Monitor,

    /// Run the terminal and bridge and service restart requests
    Supervise,

    /// Download installers into the staging directory (image build)
    Prefetch,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let result = match cli.command.unwrap_or(Commands::Start) {
        Commands::Start => cmd::start::run(cli.json),
        Commands::Step { id } => cmd::step::run(id, cli.json),
        Commands::Steps => cmd::steps::run(cli.json),
        Commands::Status => cmd::status::run(cli.json),
        Commands::Reset { step, all } => cmd::reset::run(step, all),
        Commands::Config => cmd::config::run(cli.json),
        Commands::Monitor => cmd::monitor::run(),
        Commands::Supervise => cmd::supervise::run(),
        Commands::Prefetch => cmd::prefetch::run(cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
