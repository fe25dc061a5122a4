//! NoTracePDF service entry point.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ───────────────▶ no-cache guard ─▶ audit log ─▶ panic catcher ─▶ deadline
//!                                                                        │
//!                                                                        ▼
//!                      ┌──────────────┐    ┌────────────┐    ┌─────────────────────┐
//!                      │   boundary   │───▶│ dispatcher │───▶│ transforms (lopdf,  │
//!                      │  validator   │    │  + scope   │    │ image, soffice, ...) │
//!                      └──────────────┘    └─────┬──────┘    └─────────────────────┘
//!                                                │ register / release
//!                                                ▼
//!                                         ┌──────────────┐
//!     SIGTERM / SIGINT / exit ──────────▶ │   resource   │ ◀── sweep_all (once)
//!        (shutdown coordinator)           │   tracker    │
//!                                         └──────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use notrace_pdf::config::load_settings;
use notrace_pdf::http::HttpServer;
use notrace_pdf::lifecycle::{signals, ExitGuard, Services};
use notrace_pdf::observability::{logging, metrics};

/// Zero-trace PDF and document processing service.
#[derive(Debug, Parser)]
#[command(name = "notrace-pdf", version, about)]
struct Cli {
    /// Optional TOML file seeding the settings before environment overrides.
    #[arg(long, env = "NOTRACE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    logging::init(&settings)?;
    tracing::info!(
        app = %settings.app_name,
        version = env!("CARGO_PKG_VERSION"),
        debug = settings.debug,
        "Starting"
    );

    if let Some(address) = settings.observability.metrics_address.as_deref() {
        let addr = metrics::install_exporter(address)?;
        tracing::info!(address = %addr, "Metrics exporter listening");
    }

    let services = Services::new(settings)?;
    let _exit_guard = ExitGuard::new(services.coordinator.clone());
    signals::install(&services.coordinator);

    let listener = TcpListener::bind(&services.settings.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    HttpServer::new(&services).run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
