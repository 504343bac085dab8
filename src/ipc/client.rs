use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::mailbox::{publish_json, Mailbox, Slot};
use super::protocol::{Request, RequestKind, Response};
use crate::models::{AppUpdate, DownloadOutcome, InstalledApp, ProgressRecord};
use crate::utils::{AppError, AppResult};

pub type ProgressSink<'a> = &'a (dyn Fn(f64) + Send + Sync);

/// Talks to the daemon through a [`Mailbox`].
pub struct RequestClient {
    mailbox: Arc<dyn Mailbox>,
    poll_interval: Duration,
    timeout_override: Option<Duration>,
}

impl RequestClient {
    pub fn new(mailbox: Arc<dyn Mailbox>) -> Self {
        Self {
            mailbox,
            poll_interval: Duration::from_millis(500),
            timeout_override: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Use one bound for every request type instead of the per-type defaults.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }

    fn bound_for(&self, kind: RequestKind) -> Duration {
        self.timeout_override
            .unwrap_or_else(|| Duration::from_secs(kind.timeout_secs()))
    }

    pub async fn send(&self, request: &Request) -> AppResult<Response> {
        self.exchange(request, None).await
    }

    /// Like [`send`](Self::send), forwarding the daemon's progress records to
    /// `sink` until the response arrives.
    pub async fn send_with_progress(&self, request: &Request, sink: ProgressSink<'_>) -> AppResult<Response> {
        self.exchange(request, Some(sink)).await
    }

    async fn exchange(&self, request: &Request, sink: Option<ProgressSink<'_>>) -> AppResult<Response> {
        let id = request.id.as_str();
        let mailbox = self.mailbox.as_ref();

        mailbox.remove(Slot::Requests, id).await?;
        mailbox.remove(Slot::Responses, id).await?;
        publish_json(mailbox, Slot::Requests, id, request).await?;
        log::debug!("Sent request {} ({})", id, request.kind.as_str());

        let bound = self.bound_for(request.kind);
        let deadline = Instant::now() + bound;
        let outcome = loop {
            match mailbox.read(Slot::Responses, id).await {
                Ok(Some(bytes)) => match serde_json::from_slice::<Response>(&bytes) {
                    Ok(response) => {
                        mailbox.remove(Slot::Responses, id).await?;
                        log::debug!("Received response for {}", id);
                        break Ok(response);
                    }
                    Err(e) => log::warn!("Unreadable response for {}: {}", id, e),
                },
                Ok(None) => {}
                Err(e) => log::warn!("Could not read response for {}: {}", id, e),
            }

            if let Some(sink) = sink {
                if let Ok(Some(bytes)) = mailbox.read(Slot::Progress, id).await {
                    if let Ok(record) = serde_json::from_slice::<ProgressRecord>(&bytes) {
                        sink(record.progress);
                    }
                }
            }

            if Instant::now() >= deadline {
                if let Err(e) = mailbox.remove(Slot::Requests, id).await {
                    log::debug!("Could not retract request {}: {}", id, e);
                }
                break Err(AppError::Timeout {
                    operation: request.kind.as_str().to_string(),
                    secs: bound.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        };

        if sink.is_some() {
            let _ = mailbox.remove(Slot::Progress, id).await;
        }
        outcome
    }

    pub async fn scan_apps(&self) -> AppResult<Vec<InstalledApp>> {
        self.send(&Request::new(RequestKind::ScanApps)).await?.decode()
    }

    pub async fn check_updates(&self) -> AppResult<Vec<AppUpdate>> {
        let updates: Vec<AppUpdate> = self.send(&Request::new(RequestKind::CheckUpdates)).await?.decode()?;
        log::info!("Update check completed: {} updates", updates.len());
        Ok(updates)
    }

    /// Download through the daemon; returns where the artifact was stored.
    pub async fn download(&self, url: &str, app_name: &str, sink: ProgressSink<'_>) -> AppResult<PathBuf> {
        let request = Request::new(RequestKind::DownloadApp)
            .with_field("downloadURL", url)
            .with_field("appName", app_name);
        let outcome: DownloadOutcome = self.send_with_progress(&request, sink).await?.decode()?;
        Ok(PathBuf::from(outcome.temp_file_url))
    }

    pub async fn install_app(&self, file: &Path, app_name: &str, bundle_id: Option<&str>) -> AppResult<()> {
        let mut request = Request::new(RequestKind::InstallApp)
            .with_field("fileURL", file.to_string_lossy())
            .with_field("appName", app_name);
        if let Some(bundle_id) = bundle_id {
            request = request.with_field("bundleId", bundle_id);
        }
        self.send(&request).await?.into_result().map(|_| ())
    }

    pub async fn cancel_download(&self, url: &str) -> AppResult<()> {
        let request = Request::new(RequestKind::CancelDownload).with_field("downloadURL", url);
        self.send(&request).await?.into_result().map(|_| ())
    }

    pub async fn install_native_app(&self, bundle_id: &str, app_name: &str) -> AppResult<()> {
        let request = Request::new(RequestKind::InstallNativeApp)
            .with_field("bundleId", bundle_id)
            .with_field("appName", app_name);
        self.send(&request).await?.into_result().map(|_| ())
    }

    /// Download then install, reporting overall progress: the transfer maps
    /// onto 0.05..0.80, 0.90 once downloaded, 1.0 when installed.
    pub async fn download_and_install(
        &self,
        url: &str,
        app_name: &str,
        bundle_id: Option<&str>,
        sink: ProgressSink<'_>,
    ) -> AppResult<()> {
        sink(0.05);
        let scaled = |p: f64| sink(0.05 + p * 0.75);
        let file = self.download(url, app_name, &scaled).await?;
        sink(0.90);
        self.install_app(&file, app_name, bundle_id).await?;
        sink(1.0);
        Ok(())
    }
}

/// What to tell the user about a failed update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorAdvice {
    pub message: String,
    pub retryable: bool,
}

/// Turns daemon error strings into user guidance and counts retries.
#[derive(Debug, Default)]
pub struct ErrorAdvisor {
    retries: u32,
}

impl ErrorAdvisor {
    pub const MAX_RETRIES: u32 = 2;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn record_retry(&mut self) {
        self.retries += 1;
    }

    pub fn reset(&mut self) {
        self.retries = 0;
    }

    pub fn advise(&self, error: &str, app_name: &str) -> ErrorAdvice {
        let lower = error.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        let advice = |message: String, retryable: bool| ErrorAdvice { message, retryable };

        if has(&["timeout"]) {
            return advice(
                format!(
                    "{} download timed out. This may be a large file - please check your internet connection and try again.",
                    app_name
                ),
                true,
            );
        }
        if has(&["network", "connection", "internet"]) {
            return advice(
                "Network connection issue. Please check your internet connection and try again.".into(),
                true,
            );
        }
        if has(&["authorization", "permission", "admin"]) {
            return advice(
                "Administrator permission required. Please ensure you have admin rights and try again.".into(),
                true,
            );
        }
        if has(&["install", "copy"]) {
            return advice(
                format!("Installation failed. Please ensure {} is not currently running and try again.", app_name),
                true,
            );
        }
        if has(&["space", "disk"]) {
            return advice("Insufficient disk space. Please free up some space and try again.".into(), true);
        }

        if self.retries < Self::MAX_RETRIES {
            advice(format!("Update failed: {}. Click retry to try again.", error), true)
        } else {
            advice(
                format!(
                    "Update failed after multiple attempts: {}. Please try updating {} manually.",
                    error, app_name
                ),
                false,
            )
        }
    }
}
