use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use super::version_compare;
use crate::models::{AppUpdate, CommandSpec, InstalledApp, NativeUpdater, UpdateSource};
use crate::utils::command::{CommandOutput, CommandRunner};
use crate::utils::{AppError, AppResult};

static RE_VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+\.\d+\.\d+(?:-\d+)?)").unwrap());

const CHECK_TIMEOUT_SECS: u64 = 120;
const INSTALL_TIMEOUT_SECS: u64 = 1800;

/// Placeholder version when the updater reports an update without naming it.
pub const UNSPECIFIED_VERSION: &str = "Latest";

/// Interpret a vendor updater's check output.
pub fn parse_check_output(output: &str, current_version: &str) -> Option<String> {
    let lower = output.to_lowercase();

    let up_to_date = ["no updates", "up to date", "already installed", "latest version"];
    if up_to_date.iter().any(|p| lower.contains(p)) {
        return None;
    }

    let available = ["new version", "update available", "can be updated"];
    if !available.iter().any(|p| lower.contains(p)) {
        return None;
    }

    if let Some(m) = RE_VERSION.find(output) {
        let detected = m.as_str();
        if version_compare::is_newer(detected, current_version) {
            return Some(detected.to_string());
        }
    }
    Some(UNSPECIFIED_VERSION.to_string())
}

/// Apps updated through their vendor's own command-line tool.
pub struct NativeRegistry {
    updaters: HashMap<String, NativeUpdater>,
    runner: Arc<dyn CommandRunner>,
}

impl NativeRegistry {
    pub fn new(updaters: Vec<NativeUpdater>, runner: Arc<dyn CommandRunner>) -> Self {
        let updaters = updaters
            .into_iter()
            .map(|u| (u.bundle_id.clone(), u))
            .collect();
        Self { updaters, runner }
    }

    pub fn handles(&self, bundle_id: &str) -> bool {
        self.updaters.contains_key(bundle_id)
    }

    async fn run(&self, spec: &CommandSpec, timeout_secs: u64) -> AppResult<CommandOutput> {
        let args: Vec<&str> = spec.args.iter().map(String::as_str).collect();
        self.runner.run(&spec.program, &args, timeout_secs).await
    }

    /// Check one app. `Ok(None)` when it has no registered updater or is current.
    pub async fn check(&self, app: &InstalledApp) -> AppResult<Option<AppUpdate>> {
        let Some(updater) = self.updaters.get(&app.bundle_id) else {
            return Ok(None);
        };

        log::info!("Checking native updates for {} (installed {})", updater.app_name, app.version);
        let output = self.run(&updater.check, CHECK_TIMEOUT_SECS).await?;
        log::debug!("{} check output: {}", updater.app_name, output.combined.trim());

        Ok(parse_check_output(&output.combined, &app.version).map(|new_version| AppUpdate {
            app_name: updater.app_name.clone(),
            current_version: app.version.clone(),
            new_version,
            download_url: None,
            source: UpdateSource::Native,
            installed_bundle_id: app.bundle_id.clone(),
        }))
    }

    /// Check every app with a registered updater. Failures are logged and skipped.
    pub async fn check_all(&self, apps: &[InstalledApp]) -> Vec<AppUpdate> {
        let mut updates = Vec::new();
        for app in apps.iter().filter(|a| self.handles(&a.bundle_id)) {
            match self.check(app).await {
                Ok(Some(update)) => {
                    log::info!("Native update for {}: {}", update.app_name, update.new_version);
                    updates.push(update);
                }
                Ok(None) => log::info!("{} is up to date", app.bundle_id),
                Err(e) => log::warn!("Native update check failed for {}: {}", app.bundle_id, e),
            }
        }
        updates
    }

    /// Run the vendor install command for `bundle_id`.
    pub async fn install(&self, bundle_id: &str) -> AppResult<()> {
        let updater = self.updaters.get(bundle_id).ok_or_else(|| {
            AppError::NotFound(format!("No native update configuration found for {}", bundle_id))
        })?;

        log::info!("Installing native update for {}", updater.app_name);
        let output = self.run(&updater.install, INSTALL_TIMEOUT_SECS).await?;
        let lower = output.combined.to_lowercase();
        if lower.contains("error") || lower.contains("failed") {
            return Err(AppError::InstallFailure(format!(
                "Native update failed: {}",
                output.combined.trim()
            )));
        }

        log::info!("Native update completed for {}", updater.app_name);
        Ok(())
    }
}
