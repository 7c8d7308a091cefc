use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use receipt_sync::config::Config;
use receipt_sync::mail::ImapMailbox;
use receipt_sync::pipeline::PipelineOrchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().context("Invalid configuration")?;

    eprintln!("🧾 Receipt Sync v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   IMAP: {}:{}", config.imap.host, config.imap.port);
    eprintln!("   Ledger: {}", config.catalog.records_url);
    eprintln!("   User: {}", config.user_id);
    eprintln!("   Allowed senders: {}", config.allowed_senders);
    eprintln!("   Poll interval: {}s\n", config.poll_interval.as_secs());

    let mailbox = Arc::new(ImapMailbox::new(config.imap.clone()));
    let orchestrator = PipelineOrchestrator::new(config, mailbox)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl-C; running until killed");
            std::future::pending::<()>().await;
        }
    };
    orchestrator.run_until(shutdown).await;

    info!("Interrupted, shutting down");
    Ok(())
}
