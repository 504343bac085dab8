pub mod bundle_reader;
pub mod deduplicator;
pub mod directory_scan;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::models::{DaemonSettings, InstalledApp};
use crate::utils::command::CommandRunner;
use crate::utils::launch_services::refresh_registration;
use crate::utils::plist_parser::{get_string, read_info_plist};
use crate::utils::expand_tilde;

/// Enumerates installed application bundles.
pub struct InventoryScanner {
    runner: Arc<dyn CommandRunner>,
    locations: Vec<PathBuf>,
    nested_locations: Vec<PathBuf>,
    applications_dir: PathBuf,
    prefer_short_ids: Vec<String>,
    registration_settle: Duration,
    command_pause: Duration,
}

impl InventoryScanner {
    pub fn new(settings: &DaemonSettings, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            locations: settings.scan_locations.iter().map(|l| expand_tilde(l)).collect(),
            nested_locations: settings.nested_scan_locations.iter().map(|l| expand_tilde(l)).collect(),
            applications_dir: settings.applications_dir.clone(),
            prefer_short_ids: settings.prefer_short_version_ids.clone(),
            registration_settle: Duration::from_secs(settings.registration_settle_secs),
            command_pause: if settings.registration_settle_secs == 0 {
                Duration::ZERO
            } else {
                Duration::from_secs(1)
            },
        }
    }

    /// Refresh the registration database so freshly replaced bundles report
    /// their new Info.plist, then walk the configured locations.
    pub async fn scan(&self) -> Vec<InstalledApp> {
        refresh_registration(self.runner.as_ref(), &self.applications_dir, true, self.command_pause).await;
        if !self.registration_settle.is_zero() {
            tokio::time::sleep(self.registration_settle).await;
        }
        self.collect()
    }

    /// Walk without touching the registration database.
    pub fn collect(&self) -> Vec<InstalledApp> {
        let paths = directory_scan::walk(&self.locations, &self.nested_locations);
        let apps: Vec<InstalledApp> = paths
            .iter()
            .filter_map(|p| bundle_reader::read_bundle(p))
            .map(|info| bundle_reader::to_installed_app(info, &self.prefer_short_ids))
            .inspect(|app| log::debug!("Found: {} v{} at {}", app.bundle_id, app.version, app.path))
            .collect();
        deduplicator::deduplicate(apps)
    }

    /// First collected app whose bundle name contains `app_name` or is
    /// contained by it (case-insensitive).
    pub fn find_by_name(&self, app_name: &str) -> Option<InstalledApp> {
        let wanted = app_name.trim_end_matches(".app").to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        self.collect().into_iter().find(|app| {
            let name = app.name().to_lowercase();
            name.contains(&wanted) || wanted.contains(&name)
        })
    }

    /// Log every version-related key for the app's likely locations, to
    /// confirm what a fresh scan will report after an install.
    pub fn diagnose(&self, bundle_id: &str, app_name: &str) {
        let name = app_name.trim_end_matches(".app");
        log::info!("Version diagnostic for {} [{}]", name, bundle_id);

        let mut candidates = vec![
            self.applications_dir.join(format!("{}.app", name)),
            self.applications_dir.join(name),
            self.applications_dir.join("Utilities").join(format!("{}.app", name)),
            PathBuf::from("/System/Applications").join(format!("{}.app", name)),
        ];
        if let Some(app) = self.collect().into_iter().find(|a| a.bundle_id == bundle_id) {
            let path = PathBuf::from(app.path);
            if !candidates.contains(&path) {
                candidates.push(path);
            }
        }

        let mut found = false;
        for path in candidates.iter().filter(|p| p.exists()) {
            found = true;
            log_version_keys(path);
        }
        if !found {
            log::info!("  no bundle found for {}", name);
        }
    }
}

fn log_version_keys(path: &Path) {
    log::info!("  found at {}", path.display());
    let dict = match read_info_plist(path) {
        Ok(d) => d,
        Err(e) => {
            log::info!("  unreadable Info.plist: {}", e);
            return;
        }
    };
    for key in ["CFBundleIdentifier", "CFBundleShortVersionString", "CFBundleVersion", "CFBundleGetInfoString"] {
        log::info!("  {}: {}", key, get_string(&dict, key).unwrap_or_else(|| "unknown".into()));
    }
    for (key, value) in dict.iter() {
        if key.to_lowercase().contains("version") {
            log::info!("  {}: {:?}", key, value);
        }
    }
}
