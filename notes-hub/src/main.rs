use anyhow::Context;
use axum::serve;
use clap::Parser;
use notes_hub::{api, config::Cli};
use notes_hub_core::analytics::AccessLogStore;
use notes_hub_core::NoteLibrary;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let store = AccessLogStore::open(cli.analytics_config())
        .with_context(|| format!("opening analytics database in {}", cli.data_dir.display()))?;
    let library = NoteLibrary::new(cli.notes_config());
    if !cli.notes_dir.is_dir() {
        tracing::warn!(notes_dir = %cli.notes_dir.display(), "notes directory does not exist, serving an empty tree");
    }
    let state = api::AppState::new(library, store, cli.search_timeout());

    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cli.cors_layer()?);

    let listener = TcpListener::bind(cli.addr)
        .await
        .with_context(|| format!("binding {}", cli.addr))?;
    info!(addr = %cli.addr, notes_dir = %cli.notes_dir.display(), "notes-hub listening");
    serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
