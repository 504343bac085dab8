use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use updatebridge::executor::{Installer, InstallerConfig};
use updatebridge::ipc::{Dispatcher, FsMailbox, Mailbox, Request, RequestClient, RequestKind, Services, Slot};
use updatebridge::models::{CaskEntry, DaemonSettings, HostedApp, HostedCatalogEntry};
use updatebridge::updaters::CatalogFetcher;
use updatebridge::utils::command::{CommandOutput, CommandRunner};
use updatebridge::utils::{AppError, AppResult};

struct QuietRunner;

#[async_trait]
impl CommandRunner for QuietRunner {
    async fn run(&self, _program: &str, _args: &[&str], _timeout: u64) -> AppResult<CommandOutput> {
        Ok(CommandOutput { success: true, code: Some(0), combined: String::new() })
    }
}

struct OneCask;

#[async_trait]
impl CatalogFetcher for OneCask {
    async fn fetch_casks(&self) -> AppResult<Vec<CaskEntry>> {
        Ok(vec![CaskEntry {
            token: "acme".into(),
            names: vec!["Acme".into()],
            version: "1.3.0".into(),
            url: Some("https://example.com/Acme-1.3.0.dmg".into()),
            app_names: vec!["Acme".into()],
            bundle_ids: vec!["com.acme.app".into()],
            ..Default::default()
        }])
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

fn write_bundle(apps: &Path, name: &str, id: &str, version: &str) {
    let contents = apps.join(format!("{}.app", name)).join("Contents");
    std::fs::create_dir_all(&contents).unwrap();
    let mut dict = plist::Dictionary::new();
    dict.insert("CFBundleIdentifier".into(), id.into());
    dict.insert("CFBundleShortVersionString".into(), version.into());
    plist::Value::Dictionary(dict).to_file_xml(contents.join("Info.plist")).unwrap();
}

struct Harness {
    _dir: tempfile::TempDir,
    mailbox: Arc<FsMailbox>,
    client: RequestClient,
    shutdown: CancellationToken,
    daemon: tokio::task::JoinHandle<()>,
}

impl Harness {
    fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let apps = dir.path().join("Applications");
        std::fs::create_dir_all(&apps).unwrap();
        write_bundle(&apps, "Acme", "com.acme.app", "1.2.0");

        let settings = DaemonSettings {
            ipc_root: dir.path().join("ipc"),
            poll_interval_ms: 10,
            scan_locations: vec![apps.to_string_lossy().to_string()],
            nested_scan_locations: Vec::new(),
            applications_dir: apps,
            download_dir: dir.path().to_path_buf(),
            registration_settle_secs: 0,
            post_install_settle_secs: 0,
            teardown_settle_secs: 0,
            hosted_manifest_enabled: false,
            native_updaters: Vec::new(),
            ..Default::default()
        };

        let mailbox = Arc::new(FsMailbox::new(&settings.ipc_root));
        mailbox.setup().unwrap();

        let runner: Arc<dyn CommandRunner> = Arc::new(QuietRunner);
        let mut services =
            Services::from_settings(&settings, mailbox.clone(), runner.clone(), Arc::new(OneCask)).unwrap();
        let mut config = InstallerConfig::from_settings(&settings);
        config.elevation_check = not_root;
        services.installer = Installer::new(config, runner);

        let dispatcher = Dispatcher::new(&settings, mailbox.clone(), services);
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let daemon = tokio::spawn(async move { dispatcher.serve(token).await });

        let client = RequestClient::new(mailbox.clone()).with_poll_interval(Duration::from_millis(10));
        Self { _dir: dir, mailbox, client, shutdown, daemon }
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.daemon.await.unwrap();
    }
}

#[tokio::test]
async fn scan_and_check_over_the_mailbox() {
    let h = Harness::start();

    let apps = h.client.scan_apps().await.unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].bundle_id, "com.acme.app");

    let updates = h.client.check_updates().await.unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].current_version, "1.2.0");
    assert_eq!(updates[0].new_version, "1.3.0");
    assert_eq!(updates[0].installed_bundle_id, "com.acme.app");

    assert!(h.mailbox.list(Slot::Responses).await.unwrap().is_empty());
    assert!(h.mailbox.list(Slot::Requests).await.unwrap().is_empty());
    h.stop().await;
}

#[tokio::test]
async fn cancel_of_unknown_download_succeeds() {
    let h = Harness::start();
    h.client.cancel_download("https://example.com/never-started.dmg").await.unwrap();
    h.stop().await;
}

#[tokio::test]
async fn errors_come_back_as_failed_responses() {
    let h = Harness::start();

    let request = Request::new(RequestKind::DownloadApp).with_field("appName", "Acme");
    let response = h.client.send(&request).await.unwrap();
    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("Missing downloadURL or appName"));

    let err = h
        .client
        .install_app(Path::new("/tmp/Acme.dmg"), "Acme", None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Permission denied - daemon not running as root");
    h.stop().await;
}

#[tokio::test]
async fn malformed_request_never_gets_a_response() {
    let h = Harness::start();
    h.mailbox.publish(Slot::Requests, "garbage", b"[1, 2").await.unwrap();

    for _ in 0..200 {
        if h.mailbox.read(Slot::Requests, "garbage").await.unwrap().is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(h.mailbox.read(Slot::Requests, "garbage").await.unwrap().is_none());
    assert!(h.mailbox.read(Slot::Responses, "garbage").await.unwrap().is_none());
    h.stop().await;
}
