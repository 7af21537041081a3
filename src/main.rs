use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use secure_form_relay::config::RelayConfig;
use secure_form_relay::relay::SubmissionService;
use secure_form_relay::web::{WebSettings, relay_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = RelayConfig::from_env().context("invalid relay configuration")?;
    let service = SubmissionService::from_config(&config).context("failed to build relay")?;

    let app = relay_routes(Arc::new(service), WebSettings::from(&config));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %config.bind_addr,
        version = env!("CARGO_PKG_VERSION"),
        max_body_bytes = config.max_body_bytes,
        trust_proxy_headers = config.trust_proxy_headers,
        recipients = ?config.recipients.allowed,
        "Secure form relay listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
