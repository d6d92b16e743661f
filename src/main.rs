//! # Lecture Simplifier Backend - Main Application Entry Point
//!
//! HTTP service that turns lecture terms and passages into plain-language explanations
//! using an OpenAI-compatible text-generation API, with a bounded in-memory cache in front.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (defaults, `config.toml`, environment variables)
//! - **state**: shared application state and request metrics
//! - **simplifier**: the explanation pipeline (prompt, cache, upstream client, batching)
//! - **handlers**: HTTP request handlers and route registration
//! - **health**: health and metrics endpoints
//! - **middleware**: request logging with correlation ids, and request metrics
//! - **error**: HTTP-boundary error type and its JSON responses

mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod simplifier;
mod state;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use simplifier::{ExplanationClient, OpenAiCompatibleClient};
use state::AppState;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// ## What this function does:
/// 1. **Loads configuration** from `.env`, `config.toml` and environment variables
/// 2. **Builds the upstream client** and the explanation pipeline around it
/// 3. **Serves HTTP** until SIGINT/SIGTERM, then stops gracefully
/// 4. **Releases the cache** once the server has stopped
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting lecture-simplifier-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);
    info!(
        base_url = %config.upstream.base_url,
        model = %config.upstream.model,
        cache_capacity = config.cache.capacity,
        coalesce_in_flight = config.cache.coalesce_in_flight,
        "Explanation pipeline configured"
    );
    if !config.upstream.has_api_key() {
        warn!("No upstream API key configured; requests will be sent without authorization");
    }

    let client: Arc<dyn ExplanationClient> = Arc::new(OpenAiCompatibleClient::from_config(&config.upstream)?);
    let app_state = AppState::new(config.clone(), client);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let json_limit_bytes = config.server.json_limit_bytes;

    info!("Starting HTTP server on {}", bind_addr);

    let server_state = app_state.clone();
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(server_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .configure(|cfg| handlers::configure(cfg, json_limit_bytes))
    })
    .disable_signals()
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    let removed = app_state.shutdown();
    info!(removed, "Explanation cache released");
    info!("Server stopped gracefully");
    Ok(())
}

/// `RUST_LOG` controls verbosity; defaults to `lecture_simplifier_backend=debug,actix_web=info`.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lecture_simplifier_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or, on Unix, SIGTERM.
///
/// If a handler cannot be installed the error is logged and that signal is ignored;
/// the server then keeps running until the other one arrives.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install SIGINT handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received SIGINT");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
