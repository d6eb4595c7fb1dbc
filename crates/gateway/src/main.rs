use std::net::SocketAddr;

use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use cg_domain::config::Config;
use cg_gateway::{api, bootstrap};

#[derive(Parser)]
#[command(name = "concierge", about = "Multi-channel AI assistant server", version)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("concierge=info,cg_gateway=info,tower_http=info")),
        )
        .json()
        .init();

    tracing::info!("Concierge starting");

    // ── Config ─────────────────────────────────────────────────────
    let args = Args::parse();
    let config = Config::load_or_default(&args.config);

    let problems = config.validate();
    if !problems.is_empty() {
        eprintln!("configuration is not usable:");
        for p in &problems {
            eprintln!("  - {p}");
        }
        std::process::exit(1);
    }

    tracing::info!(
        providers = config.llm.providers.len(),
        default_provider = %config.llm.default_provider,
        port = config.server.port,
        "configuration loaded"
    );

    // ── Components ─────────────────────────────────────────────────
    // Skill crates plug in here; the bare server ships with none.
    let state = match bootstrap::build_state(config, Vec::new()).await {
        Ok(state) => state,
        Err(e) => {
            eprintln!("startup failed: {e}");
            std::process::exit(1);
        }
    };
    bootstrap::spawn_cleanup(&state);

    // ── Router & server ────────────────────────────────────────────
    let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid server address: {e}"))?;

    let app = api::router(state.clone())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    tracing::info!("shutdown complete");
    Ok(())
}
