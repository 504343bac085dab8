use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest progress of a running download, overwritten in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub request_id: String,
    pub app_name: String,
    pub progress: f64,
    pub timestamp: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn new(request_id: &str, app_name: &str, progress: f64) -> Self {
        Self {
            request_id: request_id.to_string(),
            app_name: app_name.to_string(),
            progress: progress.clamp(0.0, 1.0),
            timestamp: Utc::now(),
        }
    }
}

/// Payload of a successful `downloadApp` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadOutcome {
    #[serde(rename = "tempFileURL")]
    pub temp_file_url: String,
}
