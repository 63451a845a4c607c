#[macro_use]
extern crate log;

mod cli;
mod constants;
mod http;
mod kafka_types;
mod lag_collector;
mod logging;
mod prometheus_metrics;

use std::error::Error;
use std::process;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use cli::Cli;
use lag_collector::{run_lag_collection, CollectionConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = parse_cli_and_init_logging();

    let collection_config = match cli.collection_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{e}");
            process::exit(e.exit_code());
        },
    };

    if cli.once {
        process::exit(collect_once(collection_config).await);
    }

    let shutdown_token = build_shutdown_token();

    let metrics = Arc::new(prometheus_metrics::init(collection_config.credentials.group_id()));

    http::init(cli.listen_on(), cli.http_timeout, collection_config, shutdown_token, metrics)
        .await?;

    info!("Shutdown!");
    Ok(())
}

fn parse_cli_and_init_logging() -> Cli {
    // Parse command line input and initialize logging
    let cli = Cli::parse_and_validate();
    logging::init(cli.verbosity_level());

    trace!("Created:\n{:#?}", cli);

    cli
}

/// Runs a single lag collection and prints the report to standard output.
///
/// Returns the exit code the process should terminate with.
async fn collect_once(collection_config: CollectionConfig) -> i32 {
    let res = tokio::task::spawn_blocking(move || run_lag_collection(&collection_config)).await;

    match res {
        Ok(Ok(report)) => match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                println!("{json}");
                exit_code::SUCCESS
            },
            Err(e) => {
                error!("Failed to serialize lag report: {e}");
                exit_code::SOFTWARE_ERROR
            },
        },
        Ok(Err(e)) => {
            error!("Lag collection failed: {e}");
            e.exit_code()
        },
        Err(e) => {
            error!("Lag collection task failed: {e}");
            exit_code::SOFTWARE_ERROR
        },
    }
}

fn build_shutdown_token() -> CancellationToken {
    let shutdown_token = CancellationToken::new();

    // Setup shutdown signal handler:
    // when it's time to shutdown, cancels the token and all its clones.
    //
    // NOTE: This handler will be listening on its own dedicated thread.
    let handler_token = shutdown_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Shutting down...");
        handler_token.cancel();
    }) {
        error!("Failed to register signal handler: {e}");
    }

    // Return a token so we can notify other parts of the system.
    shutdown_token
}
