//! Binary entrypoint: parse CLI overrides, resolve configuration, initialize
//! logging, then hand off to [`weftgraph_server::run`].

use clap::Parser;
use tracing_subscriber::EnvFilter;
use weftgraph_server::cli::Cli;
use weftgraph_server::config::ServerConfig;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ServerConfig::load(&cli.config, &cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("fatal: failed to resolve configuration: {err}");
            std::process::exit(1);
        }
    };

    init_tracing(&config.log_level);

    tracing::info!(
        transport = ?config.transport,
        bind_address = %config.bind_address,
        default_namespace = %config.default_namespace,
        "weftgraph-server starting"
    );

    if let Err(err) = weftgraph_server::run(config).await {
        tracing::error!(error = %err, "weftgraph-server exited with a fatal error");
        std::process::exit(1);
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
