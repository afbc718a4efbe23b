use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use quota_ledger::{
    config::Config,
    create_router,
    database::Database,
    handlers::AppState,
    services::ExpirySweeper,
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quota_ledger=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(
        port = config.port,
        reservation_ttl_secs = config.reservation_ttl_secs,
        "Starting quota ledger"
    );

    let database = Database::new(&config.database_url, config.database_max_connections).await?;
    database.migrate().await?;
    info!("Database migrations applied");

    let prometheus = PrometheusBuilder::new().install_recorder()?;

    let state = AppState::new(database.clone(), config.clone(), prometheus);
    let shutdown = CancellationToken::new();

    let sweeper = config.sweep_interval().map(|interval| {
        ExpirySweeper::new(database.ledger(), state.reservations.clone(), interval)
            .spawn(shutdown.child_token())
    });

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
            signal.cancel();
        })
        .await?;

    if let Some(handle) = sweeper {
        handle.await?;
    }

    info!("Quota ledger shut down gracefully");
    Ok(())
}
