use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use tracing::info;
use crate::errors::AuditError;

const FIGMA_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    err: Option<String>,
    #[serde(default)]
    images: std::collections::HashMap<String, Option<String>>,
}

/// A downloaded Figma frame.
#[derive(Debug, Clone)]
pub struct FigmaFrame {
    pub image_path: PathBuf,
    pub image_url: String,
    pub width: u32,
    pub height: u32,
}

/// Renders Figma frames to PNG through the images endpoint. The access token
/// is passed per call and never stored.
#[derive(Clone)]
pub struct FigmaClient {
    http: reqwest::Client,
    api_base: String,
}

fn file_name(file_key: &str, node_id: &str) -> String {
    let node: String = node_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("{}-{}-{}.png", file_key, node, chrono::Utc::now().timestamp_millis())
}

impl FigmaClient {
    pub fn new(http: reqwest::Client, api_base: &str) -> Self {
        Self { http, api_base: api_base.trim_end_matches('/').to_string() }
    }

    /// Ask Figma to render `node_id` at 2x and return the temporary image URL.
    pub async fn image_url(&self, file_key: &str, node_id: &str, token: &str) -> Result<String, AuditError> {
        let url = format!("{}/v1/images/{}", self.api_base, file_key);
        let response = self
            .http
            .get(&url)
            .query(&[("ids", node_id), ("format", "png"), ("scale", "2")])
            .header("X-Figma-Token", token)
            .timeout(FIGMA_TIMEOUT)
            .send()
            .await
            .map_err(|e| AuditError::Figma(format!("Figma request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuditError::Figma(format!("Figma API returned {} for file {}", status, file_key)));
        }
        let body: ImagesResponse = response
            .json()
            .await
            .map_err(|e| AuditError::Figma(format!("Unexpected Figma response: {}", e)))?;
        if let Some(err) = body.err {
            return Err(AuditError::Figma(err));
        }
        body.images
            .get(node_id)
            .cloned()
            .flatten()
            .ok_or_else(|| AuditError::Figma(format!("Failed to get image URL from Figma for node {}", node_id)))
    }

    pub async fn download(&self, image_url: &str) -> Result<Vec<u8>, AuditError> {
        let response = self
            .http
            .get(image_url)
            .timeout(FIGMA_TIMEOUT)
            .send()
            .await
            .map_err(|e| AuditError::Figma(format!("Figma image download failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(AuditError::Figma(format!("Figma image download returned {}", response.status())));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AuditError::Figma(format!("Figma image download failed: {}", e)))?;
        Ok(bytes.to_vec())
    }

    /// Render, download and store a frame as PNG under `dir`.
    pub async fn fetch_frame(
        &self,
        file_key: &str,
        node_id: &str,
        token: &str,
        dir: &Path,
    ) -> Result<FigmaFrame, AuditError> {
        let image_url = self.image_url(file_key, node_id, token).await?;
        let bytes = self.download(&image_url).await?;
        let img = image::load_from_memory(&bytes)?.to_rgba8();

        tokio::fs::create_dir_all(dir).await?;
        let image_path = dir.join(file_name(file_key, node_id));
        let (width, height) = img.dimensions();
        let path = image_path.clone();
        tokio::task::spawn_blocking(move || img.save(&path))
            .await
            .map_err(|e| AuditError::Internal(format!("Image save task failed: {}", e)))??;

        info!(file_key, node_id, path = %image_path.display(), "Downloaded Figma design");
        Ok(FigmaFrame { image_path, image_url, width, height })
    }
}
