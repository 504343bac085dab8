use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use updatebridge::ipc::{ErrorAdvisor, FsMailbox, RequestClient};
use updatebridge::models::{DEFAULT_IPC_ROOT, IPC_DIR_ENV};
use updatebridge::utils::AppResult;

#[derive(Parser)]
#[command(name = "updatebridge")]
#[command(author, version, about = "Talk to the updatebridge daemon", long_about = None)]
struct Cli {
    /// Mailbox root shared with the daemon
    #[arg(long, global = true)]
    ipc_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List installed applications
    Scan,
    /// Check installed applications for updates
    Check,
    /// Download an installer through the daemon
    Download { url: String, app_name: String },
    /// Install a downloaded disk image or package
    Install {
        file: PathBuf,
        app_name: String,
        #[arg(long)]
        bundle_id: Option<String>,
    },
    /// Cancel an in-flight download
    Cancel { url: String },
    /// Run an app's own updater
    InstallNative {
        bundle_id: String,
        #[arg(long)]
        app_name: Option<String>,
    },
    /// Download and install in one go
    Update {
        url: String,
        app_name: String,
        #[arg(long)]
        bundle_id: Option<String>,
    },
}

impl Commands {
    fn subject(&self) -> &str {
        match self {
            Self::Scan | Self::Check => "updatebridge",
            Self::Download { app_name, .. } | Self::Install { app_name, .. } | Self::Update { app_name, .. } => {
                app_name
            }
            Self::Cancel { url } => url,
            Self::InstallNative { bundle_id, app_name } => app_name.as_deref().unwrap_or(bundle_id),
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let root = cli
        .ipc_dir
        .clone()
        .or_else(|| std::env::var_os(IPC_DIR_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_IPC_ROOT));
    let client = RequestClient::new(Arc::new(FsMailbox::new(root)));

    if let Err(e) = run(&client, &cli.command).await {
        let advice = ErrorAdvisor::new().advise(&e.to_string(), cli.command.subject());
        log::error!("{}", e);
        eprintln!("{}", advice.message);
        std::process::exit(1);
    }
}

fn print_progress(fraction: f64) {
    eprint!("\r{:>3}%", (fraction * 100.0).round() as u32);
}

async fn run(client: &RequestClient, command: &Commands) -> AppResult<()> {
    match command {
        Commands::Scan => {
            for app in client.scan_apps().await? {
                println!("{}\t{}\t{}", app.bundle_id, app.version, app.path);
            }
        }
        Commands::Check => {
            let updates = client.check_updates().await?;
            if updates.is_empty() {
                println!("Everything is up to date");
            }
            for u in updates {
                println!(
                    "{}\t{} -> {}\t{}\t{}",
                    u.app_name,
                    u.current_version,
                    u.new_version,
                    u.source.display_name(),
                    u.download_url.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Download { url, app_name } => {
            let path = client.download(url, app_name, &print_progress).await?;
            eprintln!();
            println!("{}", path.display());
        }
        Commands::Install { file, app_name, bundle_id } => {
            client.install_app(file, app_name, bundle_id.as_deref()).await?;
            println!("{} installed", app_name);
        }
        Commands::Cancel { url } => {
            client.cancel_download(url).await?;
            println!("Cancelled");
        }
        Commands::InstallNative { bundle_id, app_name } => {
            client
                .install_native_app(bundle_id, app_name.as_deref().unwrap_or(bundle_id))
                .await?;
            println!("{} updated", app_name.as_deref().unwrap_or(bundle_id));
        }
        Commands::Update { url, app_name, bundle_id } => {
            client
                .download_and_install(url, app_name, bundle_id.as_deref(), &print_progress)
                .await?;
            eprintln!();
            println!("{} updated", app_name);
        }
    }
    Ok(())
}
