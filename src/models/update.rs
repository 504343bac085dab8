use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum UpdateSource {
    Native,
    PackageRegistry,
    HostedManifest,
}

impl UpdateSource {
    pub fn as_str(&self) -> &str {
        match self {
            UpdateSource::Native => "native",
            UpdateSource::PackageRegistry => "packageRegistry",
            UpdateSource::HostedManifest => "hostedManifest",
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            UpdateSource::Native => "Native",
            UpdateSource::PackageRegistry => "Package registry",
            UpdateSource::HostedManifest => "Hosted manifest",
        }
    }
}

/// One available update, as sent to the client in a `checkUpdates` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppUpdate {
    pub app_name: String,
    pub current_version: String,
    pub new_version: String,
    #[serde(rename = "downloadURL")]
    pub download_url: Option<String>,
    pub source: UpdateSource,
    pub installed_bundle_id: String,
}
