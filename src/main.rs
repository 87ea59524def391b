use configuration::{Configuration, ConfigurationError};
use database::{Database, InitializationError};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod configuration;
mod database;
mod id;
mod routes;
mod survey;

#[derive(Clone)]
pub(crate) struct AppState {
    database: Database,
}

#[derive(thiserror::Error, Debug)]
enum StartupError {
    #[error("Error loading configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Error initializing database: {0}")]
    Database(#[from] InitializationError),
    #[error("Error running server: {0}")]
    Server(#[from] std::io::Error),
}

/// Resolves on Ctrl+C or SIGTERM so in flight requests can finish
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("Error listening for Ctrl+C: {}", error);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!("Error listening for SIGTERM: {}", error);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutting down");
}

async fn run() -> Result<(), StartupError> {
    let configuration = Configuration::from_env()?;

    let database = Database::initialize(
        &configuration.database_url,
        configuration.database_auth_token,
    )
    .await?;

    let app = routes::create_router(AppState { database });

    let listener = tokio::net::TcpListener::bind(configuration.address).await?;
    tracing::info!("Survey API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    // Environment variables can also be set in a .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "survey_api=debug,tower_http=debug".into()),
        )
        .init();

    if let Err(error) = run().await {
        tracing::error!("{}", error);
        std::process::exit(1);
    }
}
