use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use tokengate_lib::{
    AuthSession, ConfigManager, CredentialStore, FileBackend, LoginCredentials,
    ReqwestHttpClient, SessionEventKind,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    let env_file_path = dotenvy::dotenv().ok();

    // Initialize the tracing subscriber for structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if cfg!(debug_assertions) {
                "tokengate=debug,tokengate_lib=debug,warn".into()
            } else {
                "tokengate=info,tokengate_lib=info,warn".into()
            }
        }))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    info!(version = tokengate_lib::VERSION, "tokengate starting");

    // Log environment loading after logger is initialized
    match env_file_path {
        Some(path) => info!("Loaded environment variables from {}", path.display()),
        None => debug!("No .env file found. Using existing environment variables."),
    };

    let config_manager = ConfigManager::new().await?;
    let config = config_manager.get_config().await;
    info!(
        base_url = %config.api.base_url,
        config = %config_manager.config_path().display(),
        "Configuration loaded"
    );

    let http = ReqwestHttpClient::with_timeout(config.api.timeout())
        .context("Failed to build HTTP client")?;
    let store = Arc::new(CredentialStore::open(
        Arc::new(FileBackend::new(&config.storage.path)),
        config.storage.key.clone(),
    ));
    let session = AuthSession::new(Arc::new(http), config.api.base_url.clone(), store);

    // Surface notices the way a UI notification area would
    let mut subscriber = session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = subscriber.recv().await {
            if let SessionEventKind::Notice { level, message } = event.kind {
                info!(?level, "{}", message);
            }
        }
    });

    match session.restore().await {
        Ok(Some(user)) => info!(user_id = %user.id, email = %user.email, "Session restored"),
        Ok(None) => debug!("No stored session"),
        Err(e) => warn!(error = %e, "Stored session could not be restored"),
    }

    if !session.snapshot().await.is_authenticated {
        if let (Ok(email), Ok(password)) = (
            std::env::var("TOKENGATE_EMAIL"),
            std::env::var("TOKENGATE_PASSWORD"),
        ) {
            if let Err(e) = session.login(&LoginCredentials { email, password }).await {
                error!(error = %e, "Login failed");
            }
        }
    }

    let snapshot = session.snapshot().await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
