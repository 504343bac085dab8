use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::mailbox::{publish_json, Mailbox, Slot};
use super::protocol::{DaemonCommand, Request, Response};
use crate::detection::InventoryScanner;
use crate::download::DownloadManager;
use crate::executor::{Installer, InstallerConfig};
use crate::models::{DaemonSettings, DownloadOutcome};
use crate::updaters::{CatalogFetcher, UpdateDetectionEngine};
use crate::utils::command::CommandRunner;
use crate::utils::{AppError, AppResult};

const PRUNE_EVERY: u64 = 60;

/// Everything a request can be routed to.
pub struct Services {
    pub scanner: InventoryScanner,
    pub engine: UpdateDetectionEngine,
    pub downloads: DownloadManager,
    pub installer: Installer,
}

impl Services {
    pub fn from_settings(
        settings: &DaemonSettings,
        mailbox: Arc<dyn Mailbox>,
        runner: Arc<dyn CommandRunner>,
        fetcher: Arc<dyn CatalogFetcher>,
    ) -> AppResult<Self> {
        Ok(Self {
            scanner: InventoryScanner::new(settings, runner.clone()),
            engine: UpdateDetectionEngine::new(settings, fetcher, runner.clone()),
            downloads: DownloadManager::new(settings, mailbox)?,
            installer: Installer::new(InstallerConfig::from_settings(settings), runner),
        })
    }

    async fn execute(&self, command: DaemonCommand, request_id: &str) -> AppResult<Response> {
        match command {
            DaemonCommand::ScanApps => {
                let apps = self.scanner.scan().await;
                log::info!("Scan found {} apps", apps.len());
                Response::ok_json(&apps)
            }
            DaemonCommand::CheckUpdates => {
                let apps = self.scanner.scan().await;
                let updates = self.engine.detect(&apps).await?;
                Response::ok_json(&updates)
            }
            DaemonCommand::DownloadApp { url, app_name } => {
                let path = self.downloads.download(&url, &app_name, request_id).await?;
                Response::ok_json(&DownloadOutcome {
                    temp_file_url: path.to_string_lossy().to_string(),
                })
            }
            DaemonCommand::CancelDownload { url } => {
                self.downloads.cancel(&url).await?;
                Ok(Response::ok(None))
            }
            DaemonCommand::InstallApp { file, app_name, bundle_id } => {
                self.installer.install(&file, &app_name).await?;
                self.after_install(&file, &app_name, bundle_id.as_deref());
                Ok(Response::ok(None))
            }
            DaemonCommand::InstallNativeApp { bundle_id, app_name } => {
                self.engine.native().install(&bundle_id).await?;
                match self.scanner.collect().into_iter().find(|a| a.bundle_id == bundle_id) {
                    Some(app) => self.scanner.diagnose(&bundle_id, &app.name()),
                    None => log::info!(
                        "{} not found after native update",
                        app_name.as_deref().unwrap_or(&bundle_id)
                    ),
                }
                Ok(Response::ok(None))
            }
        }
    }

    fn after_install(&self, artifact: &Path, app_name: &str, bundle_id: Option<&str>) {
        match bundle_id {
            Some(id) => self.scanner.diagnose(id, app_name),
            None => match self.scanner.find_by_name(app_name) {
                Some(app) => {
                    log::info!("Matched {} to {}", app_name, app.bundle_id);
                    self.scanner.diagnose(&app.bundle_id, &app.name());
                }
                None => log::info!("No installed bundle matches {}", app_name),
            },
        }

        if let Err(e) = std::fs::remove_file(artifact) {
            log::debug!("Could not remove {}: {}", artifact.display(), e);
        }
    }
}

/// Drains the request slot and answers every request exactly once.
pub struct Dispatcher {
    mailbox: Arc<dyn Mailbox>,
    services: Arc<Services>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    poll_interval: Duration,
    error_backoff: Duration,
    slot_ttl: Duration,
}

impl Dispatcher {
    pub fn new(settings: &DaemonSettings, mailbox: Arc<dyn Mailbox>, services: Services) -> Self {
        Self {
            mailbox,
            services: Arc::new(services),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            error_backoff: Duration::from_secs(5),
            slot_ttl: Duration::from_secs(settings.slot_ttl_secs),
        }
    }

    /// Poll until `shutdown` fires.
    pub async fn serve(&self, shutdown: CancellationToken) {
        log::info!("Dispatcher polling every {:?}", self.poll_interval);
        let mut iteration: u64 = 0;

        loop {
            let pause = match self.tick().await {
                Ok(_) => self.poll_interval,
                Err(e) => {
                    log::error!("Error monitoring requests: {}", e);
                    self.error_backoff
                }
            };

            iteration += 1;
            if iteration % PRUNE_EVERY == 0 {
                self.prune().await;
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }
        log::info!("Dispatcher stopped");
    }

    async fn prune(&self) {
        for slot in [Slot::Responses, Slot::Progress] {
            if let Err(e) = self.mailbox.prune(slot, self.slot_ttl).await {
                log::warn!("Pruning {} failed: {}", slot.dir_name(), e);
            }
        }
    }

    /// One pass over the request slot; returns how many requests were taken.
    pub async fn tick(&self) -> AppResult<usize> {
        let ids = self.mailbox.list(Slot::Requests).await?;
        let mut taken = 0;
        for id in ids {
            if self.in_flight.lock().await.contains(&id) {
                continue;
            }
            if let Err(e) = self.process(&id).await {
                log::error!("Error processing request {}: {}", id, e);
                let _ = self.mailbox.remove(Slot::Requests, &id).await;
            }
            taken += 1;
        }
        Ok(taken)
    }

    async fn process(&self, id: &str) -> AppResult<()> {
        let Some(bytes) = self.mailbox.read(Slot::Requests, id).await? else {
            return Ok(());
        };
        let request: Request = match serde_json::from_slice(&bytes) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("Dropping malformed request {}: {}", id, e);
                self.mailbox.remove(Slot::Requests, id).await?;
                return Ok(());
            }
        };
        log::info!("Processing request: {} with ID: {}", request.kind.as_str(), id);

        let command = match DaemonCommand::decode(&request) {
            Ok(c) => c,
            Err(e) => {
                let message = match e {
                    AppError::Protocol(msg) => msg,
                    other => other.to_string(),
                };
                return finish(self.mailbox.as_ref(), id, Response::failure(message)).await;
            }
        };

        if matches!(command, DaemonCommand::DownloadApp { .. }) {
            self.in_flight.lock().await.insert(id.to_string());
            let mailbox = Arc::clone(&self.mailbox);
            let services = Arc::clone(&self.services);
            let in_flight = Arc::clone(&self.in_flight);
            let id = id.to_string();
            tokio::spawn(async move {
                let response = respond(&services, command, &id).await;
                if let Err(e) = finish(mailbox.as_ref(), &id, response).await {
                    log::error!("Could not answer request {}: {}", id, e);
                }
                in_flight.lock().await.remove(&id);
            });
            return Ok(());
        }

        let response = respond(&self.services, command, id).await;
        finish(self.mailbox.as_ref(), id, response).await
    }
}

async fn respond(services: &Services, command: DaemonCommand, id: &str) -> Response {
    match services.execute(command, id).await {
        Ok(response) => response,
        Err(e) => {
            log::error!("Request {} failed: {}", id, e);
            Response::failure(e.to_string())
        }
    }
}

/// Publish the response, then retire the request.
async fn finish(mailbox: &dyn Mailbox, id: &str, response: Response) -> AppResult<()> {
    publish_json(mailbox, Slot::Responses, id, &response).await?;
    mailbox.remove(Slot::Requests, id).await?;
    log::info!("Processed request {} - Success: {}", id, response.success);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::mailbox::{read_json, FsMailbox};
    use crate::ipc::protocol::RequestKind;
    use crate::models::{CaskEntry, HostedApp, HostedCatalogEntry, InstalledApp};
    use crate::utils::command::CommandOutput;
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct QuietRunner;

    #[async_trait]
    impl CommandRunner for QuietRunner {
        async fn run(&self, _program: &str, _args: &[&str], _timeout: u64) -> AppResult<CommandOutput> {
            Ok(CommandOutput { success: true, code: Some(0), combined: String::new() })
        }
    }

    struct EmptyCatalogs;

    #[async_trait]
    impl CatalogFetcher for EmptyCatalogs {
        async fn fetch_casks(&self) -> AppResult<Vec<CaskEntry>> {
            Ok(Vec::new())
        }
        async fn fetch_hosted_catalog(&self) -> AppResult<Vec<HostedCatalogEntry>> {
            Ok(Vec::new())
        }
        async fn fetch_hosted_manifest(&self, url: &str) -> AppResult<HostedApp> {
            Err(AppError::NotFound(url.to_string()))
        }
    }

    fn not_root() -> bool {
        false
    }

    /// A dispatcher over a scratch mailbox and applications folder.
    fn scratch_dispatcher(root: &Path) -> (Arc<FsMailbox>, Dispatcher) {
        let apps = root.join("Applications");
        std::fs::create_dir_all(&apps).unwrap();
        let settings = DaemonSettings {
            ipc_root: root.join("ipc"),
            scan_locations: vec![apps.to_string_lossy().to_string()],
            nested_scan_locations: Vec::new(),
            applications_dir: apps,
            download_dir: root.to_path_buf(),
            registration_settle_secs: 0,
            post_install_settle_secs: 0,
            teardown_settle_secs: 0,
            poll_interval_ms: 10,
            ..Default::default()
        };
        let mailbox = Arc::new(FsMailbox::new(&settings.ipc_root));
        mailbox.setup().unwrap();

        let mut services = Services::from_settings(
            &settings,
            mailbox.clone(),
            Arc::new(QuietRunner),
            Arc::new(EmptyCatalogs),
        )
        .unwrap();
        let mut config = InstallerConfig::from_settings(&settings);
        config.elevation_check = not_root;
        services.installer = Installer::new(config, Arc::new(QuietRunner));

        (mailbox.clone(), Dispatcher::new(&settings, mailbox, services))
    }

    async fn submit(mailbox: &FsMailbox, request: &Request) {
        publish_json(mailbox, Slot::Requests, &request.id, request).await.unwrap();
    }

    async fn answer(mailbox: &FsMailbox, id: &str) -> Response {
        read_json(mailbox, Slot::Responses, id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn malformed_request_is_dropped_silently() {
        let dir = tempfile::tempdir().unwrap();
        let (mailbox, dispatcher) = scratch_dispatcher(dir.path());
        mailbox.publish(Slot::Requests, "junk", b"{not json").await.unwrap();

        dispatcher.tick().await.unwrap();
        assert!(mailbox.list(Slot::Requests).await.unwrap().is_empty());
        assert!(mailbox.list(Slot::Responses).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_field_gets_error_response() {
        let dir = tempfile::tempdir().unwrap();
        let (mailbox, dispatcher) = scratch_dispatcher(dir.path());
        let request = Request::new(RequestKind::InstallApp).with_field("appName", "Acme");
        submit(&mailbox, &request).await;

        dispatcher.tick().await.unwrap();
        let response = answer(&mailbox, &request.id).await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Missing fileURL or appName"));
        assert!(mailbox.read(Slot::Requests, &request.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scan_lists_installed_bundles() {
        let dir = tempfile::tempdir().unwrap();
        let (mailbox, dispatcher) = scratch_dispatcher(dir.path());
        let app = dir.path().join("Applications/Acme.app/Contents");
        std::fs::create_dir_all(&app).unwrap();
        let mut dict = plist::Dictionary::new();
        dict.insert("CFBundleIdentifier".into(), "com.acme.app".into());
        dict.insert("CFBundleShortVersionString".into(), "1.2.0".into());
        plist::Value::Dictionary(dict).to_file_xml(app.join("Info.plist")).unwrap();

        let request = Request::new(RequestKind::ScanApps);
        submit(&mailbox, &request).await;
        dispatcher.tick().await.unwrap();

        let apps: Vec<InstalledApp> = answer(&mailbox, &request.id).await.decode().unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].bundle_id, "com.acme.app");
        assert_eq!(apps[0].version, "1.2.0");
    }

    #[tokio::test]
    async fn install_failure_becomes_error_response() {
        let dir = tempfile::tempdir().unwrap();
        let (mailbox, dispatcher) = scratch_dispatcher(dir.path());
        let artifact: PathBuf = dir.path().join("Acme.dmg");
        std::fs::write(&artifact, b"image").unwrap();
        let request = Request::new(RequestKind::InstallApp)
            .with_field("fileURL", artifact.to_string_lossy())
            .with_field("appName", "Acme");
        submit(&mailbox, &request).await;

        dispatcher.tick().await.unwrap();
        let response = answer(&mailbox, &request.id).await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Permission denied - daemon not running as root"));
        assert!(artifact.exists());
    }

    #[tokio::test]
    async fn check_updates_with_empty_catalogs() {
        let dir = tempfile::tempdir().unwrap();
        let (mailbox, dispatcher) = scratch_dispatcher(dir.path());
        let request = Request::new(RequestKind::CheckUpdates);
        submit(&mailbox, &request).await;

        dispatcher.tick().await.unwrap();
        let updates: Vec<crate::models::AppUpdate> = answer(&mailbox, &request.id).await.decode().unwrap();
        assert!(updates.is_empty());
    }

    #[tokio::test]
    async fn failed_download_is_answered_from_background_task() {
        let dir = tempfile::tempdir().unwrap();
        let (mailbox, dispatcher) = scratch_dispatcher(dir.path());
        let request = Request::new(RequestKind::DownloadApp)
            .with_field("downloadURL", "not a url")
            .with_field("appName", "Acme");
        submit(&mailbox, &request).await;

        dispatcher.tick().await.unwrap();
        let mut response = None;
        for _ in 0..100 {
            response = read_json::<Response>(mailbox.as_ref(), Slot::Responses, &request.id).await.unwrap();
            if response.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let response = response.unwrap();
        assert!(!response.success);
        assert!(response.error.unwrap().contains("Invalid download URL"));
    }
}
