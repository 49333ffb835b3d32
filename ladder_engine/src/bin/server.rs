//! Binary entry point: loads process configuration, wires the persistence
//! backend and LLM client, and serves the HTTP surface.

use std::sync::Arc;

use ladder_engine::config::EngineConfig;
use ladder_engine::http::{router, AppState};
use ladder_engine::llm::HttpLlmClient;
use ladder_engine::session::{SessionCache, SessionManager};
use ladder_engine::store::SqliteSessionStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = EngineConfig::from_env();

    let store = SqliteSessionStore::connect(&config.sqlite_url).await?;
    let cache = SessionCache::new(config.session_cache_capacity, config.session_cache_ttl);
    let manager = SessionManager::new(store, cache);
    let llm = HttpLlmClient::new(
        std::env::var("LADDER_LLM_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
        config.llm_api_key.clone(),
    );

    let state = Arc::new(AppState { manager, llm: Box::new(llm) });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "ladder-engine listening");
    axum::serve(listener, app).await?;

    Ok(())
}
