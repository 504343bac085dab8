pub mod bundle;
pub mod disk_image;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use crate::models::DaemonSettings;
use crate::utils::app_lifecycle::force_kill_processes;
use crate::utils::command::CommandRunner;
use crate::utils::launch_services::refresh_registration;
use crate::utils::{is_elevated, AppError, AppResult};

use disk_image::Payload;

const ROSETTA_RUNTIME: &str = "/Library/Apple/usr/libexec/oah/libRosettaRuntime";

/// Steps of a privileged install, in the order they can be visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    CheckPrivilege,
    ClassifyArtifact,
    TerminateProcesses,
    Mount,
    LocatePayload,
    ReplaceBundle,
    RepairPermissions,
    RunPackageInstaller,
    Unmount,
    RefreshRegistry,
    Settle,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    DiskImage,
    Package,
}

impl ArtifactKind {
    pub fn classify(path: &Path) -> AppResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "dmg" => Ok(Self::DiskImage),
            "pkg" => Ok(Self::Package),
            "" => Err(AppError::UnsupportedArtifact(path.display().to_string())),
            other => Err(AppError::UnsupportedArtifact(format!(".{}", other))),
        }
    }
}

pub struct InstallerConfig {
    pub applications_dir: PathBuf,
    /// Parent directory for temporary mount points.
    pub mount_root: PathBuf,
    pub teardown_settle: Duration,
    pub post_install_settle: Duration,
    /// Pause between registration database commands.
    pub command_pause: Duration,
    pub elevation_check: fn() -> bool,
    pub intel_only_apps: Vec<String>,
    pub check_rosetta: bool,
    pub rosetta_runtime: PathBuf,
}

impl InstallerConfig {
    pub fn from_settings(settings: &DaemonSettings) -> Self {
        Self {
            applications_dir: settings.applications_dir.clone(),
            mount_root: std::env::temp_dir(),
            teardown_settle: Duration::from_secs(settings.teardown_settle_secs),
            post_install_settle: Duration::from_secs(settings.post_install_settle_secs),
            command_pause: Duration::from_millis(500),
            elevation_check: is_elevated,
            intel_only_apps: vec!["Jabra Direct".to_string()],
            check_rosetta: cfg!(target_arch = "aarch64"),
            rosetta_runtime: PathBuf::from(ROSETTA_RUNTIME),
        }
    }
}

/// Outcome of a completed install.
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Where the new bundle landed; `None` for package installs.
    pub installed_path: Option<PathBuf>,
    pub trace: Vec<InstallState>,
}

#[derive(Default)]
struct InstallContext {
    mount_point: Option<TempDir>,
    mounted: bool,
    payload: Option<Payload>,
    staging: Option<PathBuf>,
    installed_path: Option<PathBuf>,
}

impl InstallContext {
    fn mount_path(&self) -> AppResult<&Path> {
        self.mount_point
            .as_ref()
            .map(|d| d.path())
            .ok_or_else(|| AppError::Custom("Image is not mounted".into()))
    }
}

pub struct Installer {
    config: InstallerConfig,
    runner: Arc<dyn CommandRunner>,
}

impl Installer {
    pub fn new(config: InstallerConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    pub fn applications_dir(&self) -> &Path {
        &self.config.applications_dir
    }

    /// Install a downloaded disk image or package. Any failure runs the
    /// cleanup path before the error is returned.
    pub async fn install(&self, artifact: &Path, app_name: &str) -> AppResult<InstallReport> {
        log::info!("Installing {} from {}", app_name, artifact.display());

        let mut ctx = InstallContext::default();
        let mut trace = Vec::new();
        let mut state = InstallState::CheckPrivilege;

        loop {
            trace.push(state);
            if state == InstallState::Done {
                break;
            }
            match self.step(state, artifact, app_name, &mut ctx).await {
                Ok(next) => state = next,
                Err(e) => {
                    log::error!("Install of {} failed during {:?}: {}", app_name, state, e);
                    self.cleanup(&mut ctx).await;
                    return Err(e);
                }
            }
        }

        log::info!("{} installed", app_name);
        Ok(InstallReport {
            installed_path: ctx.installed_path,
            trace,
        })
    }

    async fn step(
        &self,
        state: InstallState,
        artifact: &Path,
        app_name: &str,
        ctx: &mut InstallContext,
    ) -> AppResult<InstallState> {
        use InstallState::*;

        match state {
            CheckPrivilege => {
                if !(self.config.elevation_check)() {
                    return Err(AppError::PrivilegeDenied);
                }
                self.check_architecture(app_name)?;
                Ok(ClassifyArtifact)
            }
            ClassifyArtifact => {
                Ok(match ArtifactKind::classify(artifact)? {
                    ArtifactKind::DiskImage => TerminateProcesses,
                    ArtifactKind::Package => {
                        ctx.payload = Some(Payload::Package(artifact.to_path_buf()));
                        RunPackageInstaller
                    }
                })
            }
            TerminateProcesses => {
                force_kill_processes(self.runner.as_ref(), app_name, self.config.teardown_settle).await;
                Ok(Mount)
            }
            Mount => {
                let dir = tempfile::Builder::new()
                    .prefix("updatebridge_mnt")
                    .tempdir_in(&self.config.mount_root)?;
                let path = dir.path().to_path_buf();
                ctx.mount_point = Some(dir);
                disk_image::attach(self.runner.as_ref(), artifact, &path).await?;
                ctx.mounted = true;
                Ok(LocatePayload)
            }
            LocatePayload => {
                let payload = disk_image::locate_payload(ctx.mount_path()?)?;
                log::info!("Payload: {:?}", payload);
                let next = match payload {
                    Payload::AppBundle(_) => ReplaceBundle,
                    Payload::Package(_) => RunPackageInstaller,
                };
                ctx.payload = Some(payload);
                Ok(next)
            }
            ReplaceBundle => {
                let source = match &ctx.payload {
                    Some(Payload::AppBundle(p)) => p.clone(),
                    _ => return Err(AppError::Custom("No app bundle to copy".into())),
                };
                let file_name = source
                    .file_name()
                    .ok_or_else(|| AppError::NoPayloadFound(source.display().to_string()))?;
                let dest = self.config.applications_dir.join(file_name);
                let staging = bundle::sibling(&dest, "staging");

                ctx.staging = Some(staging.clone());
                bundle::stage(self.runner.as_ref(), &source, &staging).await?;
                bundle::swap_into_place(&staging, &dest)?;
                ctx.staging = None;

                log::info!("Replaced {}", dest.display());
                ctx.installed_path = Some(dest);
                Ok(RepairPermissions)
            }
            RepairPermissions => {
                if let Some(path) = &ctx.installed_path {
                    bundle::repair_permissions(self.runner.as_ref(), path).await;
                }
                Ok(Unmount)
            }
            RunPackageInstaller => {
                let pkg = match &ctx.payload {
                    Some(Payload::Package(p)) => p.to_string_lossy().to_string(),
                    _ => return Err(AppError::Custom("No package to install".into())),
                };
                let output = self
                    .runner
                    .run("/usr/sbin/installer", &["-pkg", &pkg, "-target", "/"], 1800)
                    .await?;
                if !output.success {
                    return Err(AppError::InstallFailure(format!("PKG failed: {}", output.combined.trim())));
                }
                Ok(if ctx.mounted { Unmount } else { RefreshRegistry })
            }
            Unmount => {
                self.release_mount(ctx).await;
                Ok(RefreshRegistry)
            }
            RefreshRegistry => {
                refresh_registration(
                    self.runner.as_ref(),
                    &self.config.applications_dir,
                    false,
                    self.config.command_pause,
                )
                .await;
                Ok(Settle)
            }
            Settle => {
                if !self.config.post_install_settle.is_zero() {
                    tokio::time::sleep(self.config.post_install_settle).await;
                }
                Ok(Done)
            }
            Done => Ok(Done),
        }
    }

    fn check_architecture(&self, app_name: &str) -> AppResult<()> {
        if !self.config.check_rosetta {
            return Ok(());
        }
        let base = app_name.trim_end_matches(".app");
        let lowered = base.to_lowercase();
        let intel_only = self
            .config
            .intel_only_apps
            .iter()
            .any(|a| lowered.contains(&a.to_lowercase()));
        if intel_only && !self.config.rosetta_runtime.exists() {
            return Err(AppError::InstallFailure(format!(
                "{} requires Rosetta 2. Run: softwareupdate --install-rosetta --agree-to-license",
                base
            )));
        }
        if intel_only {
            log::warn!("{} is Intel-only and will run under Rosetta 2", base);
        }
        Ok(())
    }

    async fn release_mount(&self, ctx: &mut InstallContext) {
        if let Some(dir) = ctx.mount_point.take() {
            if ctx.mounted {
                disk_image::detach(self.runner.as_ref(), dir.path()).await;
                ctx.mounted = false;
            }
            if let Err(e) = dir.close() {
                log::warn!("Failed to remove mount point: {}", e);
            }
        }
    }

    async fn cleanup(&self, ctx: &mut InstallContext) {
        self.release_mount(ctx).await;
        if let Some(staging) = ctx.staging.take() {
            if staging.exists() {
                if let Err(e) = std::fs::remove_dir_all(&staging) {
                    log::warn!("Failed to remove staging copy {}: {}", staging.display(), e);
                }
            }
        }
    }
}
