use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use updatebridge::ipc::{Dispatcher, FsMailbox, Services};
use updatebridge::models::DaemonSettings;
use updatebridge::updaters::HttpCatalogFetcher;
use updatebridge::utils::command::{CommandRunner, SystemCommandRunner};
use updatebridge::utils::{is_elevated, AppResult};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        log::error!("updatebridged failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> AppResult<()> {
    log::info!("updatebridged {} starting", env!("CARGO_PKG_VERSION"));
    let settings = DaemonSettings::load()?;
    if !is_elevated() {
        log::warn!("Not running as root; install requests will be refused");
    }

    let mailbox = Arc::new(FsMailbox::new(&settings.ipc_root));
    mailbox.setup()?;

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
    let fetcher = Arc::new(HttpCatalogFetcher::new(&settings)?);
    let services = Services::from_settings(&settings, mailbox.clone(), runner, fetcher)?;
    let dispatcher = Dispatcher::new(&settings, mailbox, services);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Shutdown requested");
            signal.cancel();
        }
    });

    dispatcher.serve(shutdown).await;
    Ok(())
}
