use tracing::info;

use duet_server::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duet=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let addr = config.addr()?;

    let db = duet_db::Database::open(&config.db_path)?;
    info!("Database ready at {}", config.db_path.display());

    // The reactor thread owns the registry and the store
    let (reactor, _reactor_thread) = duet_gateway::reactor::spawn(db)?;

    let app = duet_server::app(reactor);

    info!("Duet server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
