//! UPS imitator entry point: config loading, Modbus connection, tick and REST API.

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ups_imitator::config::ImitatorConfig;
use ups_imitator::imitator::{Imitator, ModbusTcpSink};

use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let config = match ImitatorConfig::load(&cli.config) {
        Ok(config) => config,
        Err(errors) => {
            for e in &errors {
                eprintln!("{e}");
            }
            return ExitCode::FAILURE;
        }
    };
    if cli.check {
        println!("{}: configuration is valid", cli.config.display());
        return ExitCode::SUCCESS;
    }
    info!(path = %cli.config.display(), "configuration loaded");

    let sink = match ModbusTcpSink::connect(config.ups_addr.as_str(), config.ups_unit_id).await {
        Ok(sink) => sink,
        Err(err) => {
            error!(addr = %config.ups_addr, error = %err, "cannot connect to modbus device");
            return ExitCode::FAILURE;
        }
    };

    let imitator = Arc::new(Imitator::from_config(Box::new(sink), &config));
    imitator.start();
    info!(
        sync_interval_s = config.ups_sync_interval,
        cycle_change_timeout_s = config.cycle_change_timeout,
        "imitator started in auto mode"
    );

    run(imitator, &config).await
}

#[cfg(feature = "api")]
async fn run(imitator: Arc<Imitator>, config: &ImitatorConfig) -> ExitCode {
    let addr = config.rest_api_bind_addr.as_str();
    match ups_imitator::api::serve(imitator, addr, shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(addr, error = %err, "REST API failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(feature = "api"))]
async fn run(_imitator: Arc<Imitator>, _config: &ImitatorConfig) -> ExitCode {
    shutdown_signal().await;
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
    }
    info!("shutting down");
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
