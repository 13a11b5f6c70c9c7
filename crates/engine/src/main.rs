//! Hearthtalk Engine - Main entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hearthtalk_engine::api;
use hearthtalk_engine::infrastructure::{
    comfyui::ComfyUIClient, npc_roster::NpcRoster, ollama::OllamaClient,
    portrait_cache::PortraitCache, ports::ImageGenPort,
};
use hearthtalk_engine::{App, EngineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from repo root (the engine may be run from `crates/engine`).
    load_dotenv_from_repo_root();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hearthtalk_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Hearthtalk Engine");

    // Load configuration
    let config = EngineConfig::from_env().context("invalid configuration")?;

    let roster = NpcRoster::load(&config.roster_path)
        .await
        .with_context(|| format!("failed to load NPC roster from {}", config.roster_path.display()))?;

    PortraitCache::new(&config.portrait.dir, &config.portrait.url_prefix)
        .ensure_dir()
        .await?;

    // Create infrastructure clients
    let llm = Arc::new(
        OllamaClient::with_timeout(
            &config.dialogue.base_url,
            &config.dialogue.model,
            config.dialogue.timeout_secs,
        )
        .with_api_key(config.dialogue.api_key.clone()),
    );
    tracing::info!(
        base_url = %config.dialogue.base_url,
        model = %config.dialogue.model,
        max_retries = config.retry.max_retries,
        base_delay_ms = config.retry.base_delay_ms,
        "Dialogue client configured"
    );

    let image_gen = Arc::new(ComfyUIClient::with_checkpoint(
        &config.portrait.comfyui_url,
        &config.portrait.checkpoint,
    ));
    match image_gen.check_health().await {
        Ok(true) => tracing::info!(url = %config.portrait.comfyui_url, "ComfyUI reachable"),
        Ok(false) | Err(_) => tracing::warn!(
            url = %config.portrait.comfyui_url,
            "ComfyUI not reachable, portraits will be retried on demand"
        ),
    }

    // Create application
    let app = Arc::new(App::new(&config, roster, llm, image_gen));

    let mut router = api::http::routes()
        .with_state(app)
        .nest_service(
            &config.portrait.url_prefix,
            ServeDir::new(&config.portrait.dir),
        )
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = build_cors_layer(config.server.cors_allowed_origins.as_deref()) {
        router = router.layer(cors);
    }

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}

fn build_cors_layer(allowed_origins: Option<&str>) -> Option<CorsLayer> {
    let allowed_origins = allowed_origins.map(str::trim).filter(|s| !s.is_empty())?;

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    if allowed_origins == "*" {
        return Some(cors.allow_origin(Any));
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| HeaderValue::from_str(s).ok())
        .collect();

    if origins.is_empty() {
        return None;
    }
    Some(cors.allow_origin(origins))
}
