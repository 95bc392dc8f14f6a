use std::sync::Arc;
use tracing::info;
use crate::api;
use crate::browser::PlaywrightLauncher;
use crate::cli::commands::ServeArgs;
use crate::config::AuditSettings;
use crate::errors::AuditError;

pub async fn handle_serve(args: ServeArgs, settings: AuditSettings) -> Result<(), AuditError> {
    info!(host = %args.host, port = args.port, "Starting API server");

    super::open_database(&settings)?;
    let state = api::create_app_state(settings, Arc::new(PlaywrightLauncher::new()), args.workers)?;
    let app = api::build_router(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| AuditError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
