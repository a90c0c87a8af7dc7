use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use social_agent::config::ServiceConfig;
use social_agent::llm::{LlmConfig, create_provider};
use social_agent::pipeline::rate_limit::RateLimiter;
use social_agent::pipeline::responder::{AiResponder, ResponderConfig};
use social_agent::pipeline::{ProcessorDeps, WebhookProcessor};
use social_agent::server;
use social_agent::store::LibSqlBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServiceConfig::from_env().context("Failed to load configuration")?;

    eprintln!("💬 Social Agent v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.default_model);
    eprintln!("   LLM endpoint: {}", config.llm_base_url);
    eprintln!("   Inbound API: http://0.0.0.0:{}/api/inbound", config.port);
    eprintln!("   Drafts API: http://0.0.0.0:{}/api/drafts", config.port);

    // ── LLM ─────────────────────────────────────────────────────────────
    let llm = create_provider(&LlmConfig {
        api_key: config.llm_api_key.clone(),
        base_url: config.llm_base_url.clone(),
        model: config.default_model.clone(),
        http_timeout: config.request_timeout,
    })
    .context("Failed to create LLM provider")?;

    // ── Database ────────────────────────────────────────────────────────
    let db = Arc::new(
        LibSqlBackend::new_local(Path::new(&config.db_path))
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path))?,
    );
    eprintln!("   Database: {}", config.db_path);

    // ── Pipeline ────────────────────────────────────────────────────────
    let processor = Arc::new(WebhookProcessor::new(ProcessorDeps {
        store: db.clone(),
        rate_limiter: RateLimiter::new(db.clone(), config.rate_limit),
        responder: AiResponder::new(
            llm,
            ResponderConfig {
                request_timeout: config.request_timeout,
                confidence_timeout: config.confidence_timeout,
            },
        ),
        usage: db,
        default_model: config.default_model.clone(),
    }));

    // ── HTTP ────────────────────────────────────────────────────────────
    let app = server::routes(processor);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "Social agent listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
