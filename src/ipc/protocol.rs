use std::collections::HashMap;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::utils::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    ScanApps,
    CheckUpdates,
    InstallApp,
    DownloadApp,
    CancelDownload,
    InstallNativeApp,
}

impl RequestKind {
    /// How long the client waits for a response before giving up.
    pub fn timeout_secs(self) -> u64 {
        match self {
            Self::ScanApps => 60,
            Self::CheckUpdates => 120,
            Self::InstallApp => 600,
            Self::DownloadApp => 900,
            Self::CancelDownload => 10,
            Self::InstallNativeApp => 300,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScanApps => "scanApps",
            Self::CheckUpdates => "checkUpdates",
            Self::InstallApp => "installApp",
            Self::DownloadApp => "downloadApp",
            Self::CancelDownload => "cancelDownload",
            Self::InstallNativeApp => "installNativeApp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RequestKind,
    pub data: Option<HashMap<String, String>>,
}

impl Request {
    pub fn new(kind: RequestKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string().to_uppercase(),
            kind,
            data: None,
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.data
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.get(key))
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// `data` travels as base64 text so any payload fits in the JSON envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(with = "base64_bytes", default)]
    pub data: Option<Vec<u8>>,
    pub error: Option<String>,
}

impl Response {
    pub fn ok(data: Option<Vec<u8>>) -> Self {
        Self { success: true, data, error: None }
    }

    pub fn ok_json<T: Serialize>(value: &T) -> AppResult<Self> {
        Ok(Self::ok(Some(serde_json::to_vec(value)?)))
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(message.into()) }
    }

    /// Decode the payload, or surface the daemon's error.
    pub fn decode<T: DeserializeOwned>(&self) -> AppResult<T> {
        if !self.success {
            return Err(AppError::Custom(self.error_message()));
        }
        let bytes = self
            .data
            .as_deref()
            .ok_or_else(|| AppError::Protocol("Response carries no data".into()))?;
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn error_message(&self) -> String {
        self.error.clone().unwrap_or_else(|| "Unknown error".to_string())
    }

    pub fn into_result(self) -> AppResult<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(AppError::Custom(self.error_message()))
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match data {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let text: Option<String> = Option::deserialize(deserializer)?;
        text.map(|t| STANDARD.decode(t.as_bytes()).map_err(<D::Error as serde::de::Error>::custom))
            .transpose()
    }
}

/// A request with its payload validated, decoded once at the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonCommand {
    ScanApps,
    CheckUpdates,
    InstallApp {
        file: PathBuf,
        app_name: String,
        bundle_id: Option<String>,
    },
    DownloadApp {
        url: String,
        app_name: String,
    },
    CancelDownload {
        url: String,
    },
    InstallNativeApp {
        bundle_id: String,
        app_name: Option<String>,
    },
}

impl DaemonCommand {
    pub fn decode(request: &Request) -> AppResult<Self> {
        let missing = |msg: &str| AppError::Protocol(msg.to_string());

        Ok(match request.kind {
            RequestKind::ScanApps => Self::ScanApps,
            RequestKind::CheckUpdates => Self::CheckUpdates,
            RequestKind::InstallApp => match (request.field("fileURL"), request.field("appName")) {
                (Some(file), Some(app_name)) => Self::InstallApp {
                    file: PathBuf::from(file.strip_prefix("file://").unwrap_or(file)),
                    app_name: app_name.to_string(),
                    bundle_id: request.field("bundleId").map(str::to_string),
                },
                _ => return Err(missing("Missing fileURL or appName")),
            },
            RequestKind::DownloadApp => match (request.field("downloadURL"), request.field("appName")) {
                (Some(url), Some(app_name)) => Self::DownloadApp {
                    url: url.to_string(),
                    app_name: app_name.to_string(),
                },
                _ => return Err(missing("Missing downloadURL or appName")),
            },
            RequestKind::CancelDownload => match request.field("downloadURL") {
                Some(url) => Self::CancelDownload { url: url.to_string() },
                None => return Err(missing("Missing downloadURL")),
            },
            RequestKind::InstallNativeApp => match request.field("bundleId") {
                Some(bundle_id) => Self::InstallNativeApp {
                    bundle_id: bundle_id.to_string(),
                    app_name: request.field("appName").map(str::to_string),
                },
                None => return Err(missing("Missing bundleId for native app installation")),
            },
        })
    }
}
