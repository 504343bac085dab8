use serde::{Deserialize, Serialize};

/// Raw version-related keys of a bundle's Info.plist.
#[derive(Debug, Clone, Default)]
pub struct BundleInfo {
    pub bundle_id: String,
    pub app_path: String,
    pub short_version: Option<String>,
    pub bundle_version: Option<String>,
    pub info_string: Option<String>,
    pub icon_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstalledApp {
    pub bundle_id: String,
    pub version: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_file: Option<String>,
}

impl InstalledApp {
    /// Bundle file name without the `.app` suffix, e.g. `Visual Studio Code`.
    pub fn name(&self) -> String {
        let file = self.path.rsplit('/').next().unwrap_or(&self.path);
        file.strip_suffix(".app").unwrap_or(file).to_string()
    }
}
