use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::NativeUpdater;
use crate::utils::AppResult;

pub const CONFIG_ENV: &str = "UPDATEBRIDGE_CONFIG";
pub const IPC_DIR_ENV: &str = "UPDATEBRIDGE_IPC_DIR";
pub const DEFAULT_CONFIG_PATH: &str = "/Library/Application Support/updatebridge/settings.json";
pub const DEFAULT_IPC_ROOT: &str = "/tmp/updatebridge-ipc";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DaemonSettings {
    pub ipc_root: PathBuf,
    pub poll_interval_ms: u64,
    pub scan_locations: Vec<String>,
    /// Roots whose vendor sub-folders are searched one level deep.
    pub nested_scan_locations: Vec<String>,
    pub applications_dir: PathBuf,
    pub download_dir: PathBuf,
    pub registration_settle_secs: u64,
    pub post_install_settle_secs: u64,
    pub teardown_settle_secs: u64,
    pub cask_index_url: String,
    pub hosted_catalog_url: String,
    pub catalog_ttl_secs: i64,
    pub hosted_manifest_enabled: bool,
    pub prefer_short_version_ids: Vec<String>,
    pub excluded_bundle_ids: Vec<String>,
    pub manual_name_overrides: HashMap<String, String>,
    pub native_updaters: Vec<NativeUpdater>,
    pub slot_ttl_secs: u64,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            ipc_root: PathBuf::from(DEFAULT_IPC_ROOT),
            poll_interval_ms: 1000,
            scan_locations: vec![
                "/Applications".into(),
                "/Applications/Utilities".into(),
                "/System/Applications".into(),
                "~/Applications".into(),
                "/Applications/Setapp".into(),
            ],
            nested_scan_locations: vec!["/Applications".into()],
            applications_dir: PathBuf::from("/Applications"),
            download_dir: std::env::temp_dir(),
            registration_settle_secs: 5,
            post_install_settle_secs: 8,
            teardown_settle_secs: 3,
            cask_index_url: "https://formulae.brew.sh/api/cask.json".into(),
            hosted_catalog_url:
                "https://raw.githubusercontent.com/ugurkocde/IntuneBrew/main/supported_apps.json".into(),
            catalog_ttl_secs: 300,
            hosted_manifest_enabled: true,
            prefer_short_version_ids: vec!["com.google.android.studio".into()],
            excluded_bundle_ids: vec![
                "com.apple.ScriptEditor.id.dockerquickstartterminalapp".into(),
                "com.electron.kitematic".into(),
                "com.jabra.directonline".into(),
                "com.jabra.JabraFirmwareUpdate".into(),
                "org.virtualbox.app.VirtualBox".into(),
                "com.docker.docker".into(),
            ],
            manual_name_overrides: HashMap::from([(
                "com.latenightsw.Script-Notary2".to_string(),
                "SD Notary 2".to_string(),
            )]),
            native_updaters: vec![NativeUpdater::parallels_desktop()],
            slot_ttl_secs: 3600,
        }
    }
}

impl DaemonSettings {
    /// Load from `path`. A missing file yields defaults; a malformed one is an error.
    pub fn load_from(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            log::info!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&raw)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Load from `UPDATEBRIDGE_CONFIG` (or the system default path), then
    /// apply the `UPDATEBRIDGE_IPC_DIR` override.
    pub fn load() -> AppResult<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut settings = Self::load_from(&path)?;
        if let Some(dir) = std::env::var_os(IPC_DIR_ENV) {
            settings.ipc_root = PathBuf::from(dir);
        }
        Ok(settings)
    }
}
