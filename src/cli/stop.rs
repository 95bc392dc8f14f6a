use tracing::info;
use crate::cli::commands::StopArgs;
use crate::config::AuditSettings;
use crate::errors::AuditError;
use crate::pipeline;

pub async fn handle_stop(args: StopArgs, settings: AuditSettings) -> Result<(), AuditError> {
    info!(run_id = %args.run_id, "Stopping run");

    if let Some(server) = &args.server {
        let url = format!("{}/api/runs/{}/stop", server.trim_end_matches('/'), args.run_id);
        let response = reqwest::Client::new()
            .post(&url)
            .send()
            .await
            .map_err(|e| AuditError::Network(format!("Failed to stop run: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let message = body["error"].as_str().unwrap_or("request rejected").to_string();
            return Err(match status.as_u16() {
                404 => AuditError::NotFound(message),
                409 => AuditError::InvalidState(message),
                _ => AuditError::Network(format!("Server returned {}: {}", status, message)),
            });
        }
        println!("Stop signal sent for run {}", args.run_id);
        return Ok(());
    }

    // A run owned by another process notices at its next page boundary
    let db = super::open_database(&settings)?;
    let active = dashmap::DashMap::new();
    let run = pipeline::stop_run(&db, &active, &args.run_id)?;
    println!("Run {} marked {}", run.id, run.status);
    Ok(())
}
