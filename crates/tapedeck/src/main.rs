use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Parser};
use tracing::{error, info};

use tapedeck::admin_api::AdminApiServer;
use tapedeck::catalog::{Catalog, CatalogOptions};
use tapedeck::config::Config;
use tapedeck::executor::HttpExecutor;
use tapedeck::logging::{init_logging, LogFormat};
use tapedeck::server::InterceptServer;

/// HTTP mock and record/replay server.
#[derive(Parser, Debug)]
#[command(name = "tapedeck", author, version, about)]
struct Args {
    /// YAML configuration file.
    #[arg(short, long, env = "TAPEDECK_CONFIG")]
    config: Option<PathBuf>,

    /// Intercept listener port.
    #[arg(short, long, env = "TAPEDECK_PORT")]
    port: Option<u16>,

    /// Admin API port.
    #[arg(long, env = "TAPEDECK_ADMIN_PORT")]
    admin_port: Option<u16>,

    /// Directory holding tape files.
    #[arg(long, env = "TAPEDECK_TAPE_ROOT")]
    tape_root: Option<PathBuf>,

    /// Upstream call timeout in milliseconds.
    #[arg(long, env = "TAPEDECK_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "TAPEDECK_LOG_FORMAT")]
    log_format: LogFormat,
}

impl Args {
    /// Load the config file (or defaults) and apply command-line overrides.
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(port) = self.port {
            config.listen.port = port;
        }
        if let Some(port) = self.admin_port {
            config.admin.port = port;
        }
        if let Some(root) = self.tape_root {
            config.storage.tape_root = root;
        }
        if let Some(timeout) = self.timeout_ms {
            config.upstream.timeout_ms = timeout;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_format, args.verbose);

    let config = args.into_config()?;
    let executor = HttpExecutor::new(config.upstream.connect_timeout())
        .context("Failed to build upstream client")?;
    let catalog = Arc::new(Catalog::load(
        CatalogOptions::from(&config),
        Arc::new(executor),
    ));
    info!(
        "Tapedeck started with {} tapes from {:?}",
        catalog.len(),
        config.storage.tape_root
    );

    let intercept = InterceptServer::new(config.listen.socket_addr()?, Arc::clone(&catalog));
    let intercept = tokio::spawn(async move {
        if let Err(e) = intercept.run().await {
            error!("Intercept server stopped: {}", e);
        }
    });

    let admin = if config.admin.enabled {
        let server = AdminApiServer::new(config.admin.socket_addr()?, Arc::clone(&catalog));
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Admin API stopped: {}", e);
            }
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");

    intercept.abort();
    if let Some(admin) = admin {
        admin.abort();
    }
    Ok(())
}
