//! reactor-proxy binary.
//!
//! ```text
//!     Client ──▶ listener ──▶ connection manager ──▶ backend
//!                                 │   ▲
//!                          framing│   │state machine
//!                                 ▼   │
//!     Client ◀──────────── response stream ◀────── backend
//! ```

use std::path::PathBuf;

use clap::Parser;

use reactor_proxy::config::{load_config, validate_config, ConfigError, ProxyConfig};
use reactor_proxy::lifecycle::signals;
use reactor_proxy::observability::{logging, metrics};
use reactor_proxy::{ProxyServer, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "reactor-proxy", version, about = "Single-threaded non-blocking reverse proxy")]
struct Cli {
    /// TOML configuration file. Defaults are used when omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address, overriding the file.
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Backend address, overriding the file.
    #[arg(long, value_name = "ADDR")]
    backend: Option<String>,

    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(backend) = &self.backend {
            config.backend.address = backend.clone();
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability)?;
    tracing::info!("reactor-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    signals::install(&shutdown)?;

    let mut server = ProxyServer::new(&config)?;
    server.run(&shutdown)?;

    tracing::info!("Shutdown complete");
    Ok(())
}
