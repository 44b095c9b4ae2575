//! Service harness binary.
//!
//! # Lifecycle
//!
//! ```text
//!   config.toml ──▶ ConfigStore ──▶ LogSink (JSON lines, rotating file)
//!                       │
//!                       ▼
//!                  StorePools (MySQL, Redis)
//!                       │
//!                       ▼
//!   client ──▶ Listener ──▶ HttpServer ──▶ request id ──▶ access log ──▶ recovery ──▶ routes
//!                       │
//!   SIGINT/SIGTERM ─────┘ stop accepting → drain (bounded) → close stores → flush logs
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use service_harness::lifecycle::{self, signals};

#[derive(Parser)]
#[command(name = "service-harness")]
#[command(about = "Web service harness with hot-reloaded config and graceful shutdown", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = service_harness::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match lifecycle::run(Some(&cli.config), signals::termination_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
