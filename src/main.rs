//! Version Trail Server - Binary Entry Point
//!
//! Serves the read-only audit API over the version log in `TRAIL_DATA_DIR`.

use std::sync::Arc;

use version_trail::api::{create_router, AppState};
use version_trail::audit::{AuditLog, StaticActorResolver};
use version_trail::entities::{EntitySource, MemoryEntityStore};
use version_trail::{EntityRegistry, TrailConfig, TrailResult, VersionStore};

#[tokio::main]
async fn main() -> TrailResult<()> {
    let config = TrailConfig::from_env()?;
    init_tracing(&config);

    let registry = match &config.registry_path {
        Some(path) => EntityRegistry::load(path)?,
        None => EntityRegistry::new(),
    };
    let entities = match &config.entities_path {
        Some(path) => MemoryEntityStore::load_jsonl(path)?,
        None => MemoryEntityStore::new(),
    };
    let actors = match &config.actors_path {
        Some(path) => StaticActorResolver::load(path)?,
        None => StaticActorResolver::new(),
    };
    let store = VersionStore::open(config.store_config())?;

    tracing::info!(
        types = registry.len(),
        entities = entities.len(),
        versions = store.len(),
        actors = actors.len(),
        "Loaded audit data"
    );

    let audit = AuditLog::new(
        Arc::new(store),
        Arc::new(registry),
        Arc::new(entities) as Arc<dyn EntitySource>,
    )
    .with_actor_resolver(Arc::new(actors))
    .with_max_depth(config.deep_max_depth);

    let app = create_router(Arc::new(AppState::new(Arc::new(audit))));
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Version trail API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(config: &TrailConfig) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("version_trail=debug,info"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
