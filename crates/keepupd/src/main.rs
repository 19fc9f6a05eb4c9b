//! keepupd — the keepup daemon.
//!
//! Single binary that assembles the keepup subsystems:
//! - Prober (target set + periodic check cycle)
//! - REST API
//!
//! # Usage
//!
//! ```text
//! keepupd serve --config keepup.toml --port 5000
//! keepupd default-config > keepup.toml
//! ```

mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use keepup_core::KeepupConfig;

#[derive(Parser)]
#[command(name = "keepupd", about = "keepup uptime daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "plain", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the prober and the REST API.
    Serve {
        /// Path to keepup.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on. Overrides `[server] port`.
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },
    /// Print a config file with every default spelled out.
    DefaultConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Serve { config, port } => {
            let config = match &config {
                Some(path) => KeepupConfig::from_file(path)?,
                None => KeepupConfig::default(),
            };
            serve::run_serve(config, port).await
        }
        Command::DefaultConfig => {
            print!("{}", KeepupConfig::scaffold().to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,keepupd=debug,keepup_health=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Plain => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
