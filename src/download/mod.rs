use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::ipc::mailbox::{publish_json, Mailbox, Slot};
use crate::models::{DaemonSettings, ProgressRecord};
use crate::utils::http_client::create_download_client;
use crate::utils::{AppError, AppResult};

const DEFAULT_EXTENSION: &str = "dmg";

/// File extension of the artifact behind `url`, lowercased. Falls back to
/// `dmg` when the path has none.
pub fn artifact_extension(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|last| Path::new(last).extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_lowercase())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// `<app name>.<ext>`, with path separators in the name neutralised.
pub fn artifact_file_name(app_name: &str, url: &Url) -> String {
    let stem = app_name.trim().replace('/', "-");
    let stem = if stem.is_empty() { "download".to_string() } else { stem };
    format!("{}.{}", stem, artifact_extension(url))
}

struct ActiveTransfer {
    generation: u64,
    token: CancellationToken,
}

/// Streams installer artifacts to disk and reports progress to the mailbox.
/// Transfers are keyed by URL so they can be cancelled from another request.
pub struct DownloadManager {
    client: Client,
    mailbox: Arc<dyn Mailbox>,
    download_dir: PathBuf,
    active: Mutex<HashMap<String, ActiveTransfer>>,
    next_generation: AtomicU64,
    progress_interval: Duration,
}

impl DownloadManager {
    pub fn new(settings: &DaemonSettings, mailbox: Arc<dyn Mailbox>) -> AppResult<Self> {
        Ok(Self::with_client(
            create_download_client()?,
            settings.download_dir.clone(),
            mailbox,
        ))
    }

    pub fn with_client(client: Client, download_dir: PathBuf, mailbox: Arc<dyn Mailbox>) -> Self {
        Self {
            client,
            mailbox,
            download_dir,
            active: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            progress_interval: Duration::from_millis(150),
        }
    }

    pub async fn is_active(&self, url: &str) -> bool {
        self.active.lock().await.contains_key(url)
    }

    /// Download `url` to `<download_dir>/<app_name>.<ext>` and return the path.
    pub async fn download(&self, url: &str, app_name: &str, request_id: &str) -> AppResult<PathBuf> {
        let parsed = Url::parse(url).map_err(|e| AppError::Http(format!("Invalid download URL {}: {}", url, e)))?;
        let file_name = artifact_file_name(app_name, &parsed);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        // One partial file per transfer; a replaced transfer never touches its successor's.
        let part = self.download_dir.join(format!("{}.{}.part", file_name, generation));
        let dest = self.download_dir.join(&file_name);

        let token = CancellationToken::new();
        {
            let mut active = self.active.lock().await;
            let current = ActiveTransfer { generation, token: token.clone() };
            if let Some(previous) = active.insert(url.to_string(), current) {
                log::warn!("Replacing in-flight download of {}", url);
                previous.token.cancel();
            }
        }

        log::info!("Starting download for {} from {}", app_name, url);
        let result = self.transfer(parsed, app_name, request_id, &part, &token).await;
        self.release(url, generation).await;

        if let Err(e) = result {
            if part.exists() {
                let _ = tokio::fs::remove_file(&part).await;
            }
            log::warn!("Download of {} failed: {}", app_name, e);
            return Err(e);
        }

        if dest.exists() {
            tokio::fs::remove_file(&dest).await?;
        }
        tokio::fs::rename(&part, &dest).await?;
        log::info!("Downloaded {} to {}", app_name, dest.display());
        Ok(dest)
    }

    /// Drop the registry entry for `url` unless a newer transfer has taken it over.
    async fn release(&self, url: &str, generation: u64) {
        let mut active = self.active.lock().await;
        if active.get(url).is_some_and(|t| t.generation == generation) {
            active.remove(url);
        }
    }

    async fn transfer(
        &self,
        url: Url,
        app_name: &str,
        request_id: &str,
        part: &Path,
        token: &CancellationToken,
    ) -> AppResult<()> {
        let response = tokio::select! {
            _ = token.cancelled() => return Err(AppError::Cancelled("Download".into())),
            response = self.client.get(url).send() => response?,
        };

        if !response.status().is_success() {
            return Err(AppError::Http(format!("Download failed with HTTP {}", response.status())));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        if content_type.contains("text/html") {
            return Err(AppError::Http(
                "Download URL returned HTML instead of an installer file".to_string(),
            ));
        }

        let total_bytes = response.content_length().filter(|t| *t > 0);
        let mut file = tokio::fs::File::create(part).await?;
        let mut downloaded: u64 = 0;
        let mut last_emit = Instant::now();
        let mut stream = response.bytes_stream();

        loop {
            let chunk = tokio::select! {
                _ = token.cancelled() => {
                    log::info!("Download of {} cancelled", app_name);
                    return Err(AppError::Cancelled("Download".into()));
                }
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if let Some(total) = total_bytes {
                if last_emit.elapsed() >= self.progress_interval {
                    last_emit = Instant::now();
                    self.report(request_id, app_name, downloaded as f64 / total as f64).await;
                }
            }
        }
        file.flush().await?;

        if total_bytes.is_some() {
            self.report(request_id, app_name, 1.0).await;
        }
        Ok(())
    }

    async fn report(&self, request_id: &str, app_name: &str, fraction: f64) {
        let record = ProgressRecord::new(request_id, app_name, fraction);
        if let Err(e) = publish_json(self.mailbox.as_ref(), Slot::Progress, request_id, &record).await {
            log::debug!("Could not publish progress for {}: {}", request_id, e);
        }
        log::debug!("{}: {}%", app_name, (record.progress * 100.0) as u32);
    }

    /// Cancel the transfer of `url`. Unknown URLs are ignored.
    pub async fn cancel(&self, url: &str) -> AppResult<()> {
        match self.active.lock().await.remove(url) {
            Some(transfer) => {
                transfer.token.cancel();
                log::info!("Cancelled download of {}", url);
            }
            None => log::debug!("No active download for {}", url),
        }
        Ok(())
    }
}
