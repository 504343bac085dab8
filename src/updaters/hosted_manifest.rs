use std::collections::BTreeMap;

use crate::models::{HostedApp, HostedCatalogEntry, InstalledApp};
use crate::utils::{AppError, AppResult};

/// Catalog keys handled by the suite's own updater.
const EXCLUDED_KEYS: &[&str] = &[
    "microsoft_office",
    "microsoft_teams",
    "company_portal",
    "microsoft_word",
    "microsoft_excel",
    "microsoft_powerpoint",
    "microsoft_outlook",
    "microsoft_onenote",
];

/// Apps from the suite vendor are never checked against the hosted catalog,
/// whatever their bundle ID or file name looks like.
pub fn is_excluded(app: &InstalledApp) -> bool {
    let name = app.name().to_lowercase();
    app.bundle_id.starts_with("com.microsoft.")
        || app.bundle_id.to_lowercase().contains("microsoft")
        || name.contains("microsoft")
        || EXCLUDED_KEYS.contains(&name.replace(' ', "_").as_str())
}

/// Parse the catalog object `{ "app_key": "https://…/app_key.json", … }`.
pub fn parse_catalog(body: &str) -> AppResult<Vec<HostedCatalogEntry>> {
    let map: BTreeMap<String, String> = serde_json::from_str(body)?;
    Ok(map
        .into_iter()
        .filter(|(key, _)| !EXCLUDED_KEYS.contains(&key.as_str()))
        .map(|(key, manifest_url)| HostedCatalogEntry { key, manifest_url })
        .collect())
}

async fn get_text(client: &reqwest::Client, url: &str) -> AppResult<String> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(AppError::Http(format!("{} returned status {}", url, status)));
    }
    Ok(resp.text().await?)
}

pub async fn fetch_catalog(client: &reqwest::Client, url: &str) -> AppResult<Vec<HostedCatalogEntry>> {
    log::info!("Fetching hosted manifest catalog from {}", url);
    let body = get_text(client, url).await?;
    let entries = parse_catalog(&body)?;
    log::info!("Hosted manifest catalog: {} apps", entries.len());
    Ok(entries)
}

pub async fn fetch_manifest(client: &reqwest::Client, url: &str) -> AppResult<HostedApp> {
    let body = get_text(client, url).await?;
    Ok(serde_json::from_str(&body)?)
}
