//! Record Export command-line tool
//!
//! Validates export requests against a JSON fixture store and writes CSV or
//! XLSX artifacts to a local storage directory.
//!
//! # Usage
//!
//! ```bash
//! record-export validate --store fixture.json --export request.json
//! record-export run --store fixture.json --export request.json --out-dir ./out
//! record-export config
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use record_export::cli::CliInterface;
use record_export::error::{ErrorResponse, Result};

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if e.as_validation().is_some()
            && let Ok(json) = ErrorResponse::from_error(&e).to_json_pretty()
        {
            println!("{}", json);
        }
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Run the selected subcommand
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;
    initialize_logging(&cli);
    cli.handle_command().await
}

/// Initialize logging from the configured level
///
/// `RUST_LOG` takes precedence when set.
fn initialize_logging(cli: &CliInterface) {
    let logging = &cli.config().logging;
    let default_level = LevelFilter::from_level(logging.level.to_tracing_level());
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
