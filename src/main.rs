use clap::Parser;
use rollbook::{
    build_router,
    config::{CliArgs, Config},
    error::StartupError,
    store::{close_store, open_store},
    telemetry, AppState,
};

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();
    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "rollbook exited with an error");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: CliArgs) -> Result<(), StartupError> {
    let config = Config::load(&cli)?;
    telemetry::init_logging(&config.logging);

    let metrics = telemetry::install_metrics().map_err(StartupError::Metrics)?;

    let store_config = config.store.clone();
    let store = tokio::task::spawn_blocking(move || open_store(&store_config))
        .await
        .map_err(|e| StartupError::Server(e.to_string()))??;

    let state = AppState::new(store.clone())
        .with_unknown_fields(config.api.unknown_fields)
        .with_body_limit(config.server.body_limit_bytes)
        .with_metrics(metrics);
    let app = build_router(state);

    let addr = config.listen_addr()?;
    tracing::info!(%addr, backend = store.backend_name(), "Rollbook API listening");

    let served = axum::Server::try_bind(&addr)
        .map_err(|e| StartupError::Server(e.to_string()))?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| StartupError::Server(e.to_string()));

    close_store(store).await;
    tracing::info!("Rollbook API stopped");
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
