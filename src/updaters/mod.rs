pub mod catalog_cache;
pub mod fuzzy;
pub mod homebrew_api;
pub mod hosted_manifest;
pub mod matcher;
pub mod native;
pub mod version_compare;

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::{AppUpdate, CaskEntry, DaemonSettings, HostedApp, HostedCatalogEntry, InstalledApp, UpdateSource};
use crate::utils::command::CommandRunner;
use crate::utils::http_client::create_http_client;
use crate::utils::{is_suite_managed, AppResult};
use catalog_cache::{needs_refresh, settle, CatalogCache};
use matcher::{CatalogEntry, CatalogMatcher, MatchOutcome};
use native::NativeRegistry;

/// Network access for the catalogs the engine consults.
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    async fn fetch_casks(&self) -> AppResult<Vec<CaskEntry>>;
    async fn fetch_hosted_catalog(&self) -> AppResult<Vec<HostedCatalogEntry>>;
    async fn fetch_hosted_manifest(&self, url: &str) -> AppResult<HostedApp>;
}

pub struct HttpCatalogFetcher {
    client: reqwest::Client,
    cask_index_url: String,
    hosted_catalog_url: String,
}

impl HttpCatalogFetcher {
    pub fn new(settings: &DaemonSettings) -> AppResult<Self> {
        Ok(Self {
            client: create_http_client()?,
            cask_index_url: settings.cask_index_url.clone(),
            hosted_catalog_url: settings.hosted_catalog_url.clone(),
        })
    }
}

#[async_trait]
impl CatalogFetcher for HttpCatalogFetcher {
    async fn fetch_casks(&self) -> AppResult<Vec<CaskEntry>> {
        homebrew_api::fetch_casks(&self.client, &self.cask_index_url).await
    }

    async fn fetch_hosted_catalog(&self) -> AppResult<Vec<HostedCatalogEntry>> {
        hosted_manifest::fetch_catalog(&self.client, &self.hosted_catalog_url).await
    }

    async fn fetch_hosted_manifest(&self, url: &str) -> AppResult<HostedApp> {
        hosted_manifest::fetch_manifest(&self.client, url).await
    }
}

type CacheSlot<E> = RwLock<Option<CatalogCache<CatalogMatcher<E>>>>;

/// Return the cached matcher if fresh, otherwise fetch and rebuild it.
async fn cached_matcher<E, F>(
    slot: &CacheSlot<E>,
    ttl: chrono::Duration,
    fetch: F,
) -> AppResult<Arc<CatalogMatcher<E>>>
where
    E: CatalogEntry,
    F: Future<Output = AppResult<CatalogMatcher<E>>>,
{
    let now = Utc::now();
    {
        let guard = slot.read().await;
        if let Some(cache) = guard.as_ref().filter(|c| !needs_refresh(Some(*c), now, ttl)) {
            log::info!("Catalog cache hit ({} entries, age {}s)", cache.entries.len(), cache.age(now).num_seconds());
            return Ok(Arc::clone(&cache.entries));
        }
    }

    let fetched = fetch.await;
    let mut guard = slot.write().await;
    let cache = settle(guard.take(), fetched, now)?;
    let entries = Arc::clone(&cache.entries);
    *guard = Some(cache);
    Ok(entries)
}

/// Keep only genuine updates, one per installed bundle.
pub fn finalize(updates: Vec<AppUpdate>) -> Vec<AppUpdate> {
    let mut seen = HashSet::new();
    updates
        .into_iter()
        .filter(|u| {
            let newer = version_compare::is_newer(&u.new_version, &u.current_version);
            if !newer {
                log::info!("Skipping {}: {} >= {}", u.app_name, u.current_version, u.new_version);
            }
            newer
        })
        .filter(|u| seen.insert(u.installed_bundle_id.clone()))
        .collect()
}

/// Native registry first, then the package registry, then hosted manifests
/// for whatever is still unmatched.
pub struct UpdateDetectionEngine {
    fetcher: Arc<dyn CatalogFetcher>,
    native: NativeRegistry,
    settings: DaemonSettings,
    casks: CacheSlot<CaskEntry>,
    hosted: CacheSlot<HostedCatalogEntry>,
}

impl UpdateDetectionEngine {
    pub fn new(settings: &DaemonSettings, fetcher: Arc<dyn CatalogFetcher>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            fetcher,
            native: NativeRegistry::new(settings.native_updaters.clone(), runner),
            settings: settings.clone(),
            casks: RwLock::new(None),
            hosted: RwLock::new(None),
        }
    }

    pub fn native(&self) -> &NativeRegistry {
        &self.native
    }

    fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.settings.catalog_ttl_secs)
    }

    pub fn is_eligible(&self, app: &InstalledApp) -> bool {
        if app.bundle_id.starts_with("com.apple.") {
            return false;
        }
        if is_suite_managed(&app.bundle_id) {
            log::info!("Skipping {}: handled by the suite's own updater", app.bundle_id);
            return false;
        }
        if self.settings.excluded_bundle_ids.contains(&app.bundle_id) {
            log::info!("Skipping {}: excluded from update checks", app.bundle_id);
            return false;
        }
        true
    }

    async fn cask_matcher(&self) -> AppResult<Arc<CatalogMatcher<CaskEntry>>> {
        let overrides = self.settings.manual_name_overrides.clone();
        cached_matcher(&self.casks, self.ttl(), async {
            self.fetcher
                .fetch_casks()
                .await
                .map(|entries| CatalogMatcher::new(entries, overrides))
        })
        .await
    }

    async fn hosted_matcher(&self) -> AppResult<Arc<CatalogMatcher<HostedCatalogEntry>>> {
        let overrides = self.settings.manual_name_overrides.clone();
        cached_matcher(&self.hosted, self.ttl(), async {
            self.fetcher
                .fetch_hosted_catalog()
                .await
                .map(|entries| CatalogMatcher::new(entries, overrides))
        })
        .await
    }

    pub async fn detect(&self, apps: &[InstalledApp]) -> AppResult<Vec<AppUpdate>> {
        let eligible: Vec<&InstalledApp> = apps.iter().filter(|a| self.is_eligible(a)).collect();
        log::info!(
            "Checking {} apps for updates ({} filtered out)",
            eligible.len(),
            apps.len() - eligible.len()
        );

        let native_candidates: Vec<InstalledApp> = eligible
            .iter()
            .filter(|a| self.native.handles(&a.bundle_id))
            .map(|a| (*a).clone())
            .collect();
        let mut updates = self.native.check_all(&native_candidates).await;
        let resolved: HashSet<String> = updates.iter().map(|u| u.installed_bundle_id.clone()).collect();

        let remaining: Vec<&InstalledApp> = eligible
            .into_iter()
            .filter(|a| !resolved.contains(&a.bundle_id))
            .collect();

        let unmatched = self.check_registry(&remaining, &mut updates).await?;

        if self.settings.hosted_manifest_enabled && !unmatched.is_empty() {
            self.check_hosted(&unmatched, &mut updates).await;
        }

        let updates = finalize(updates);
        log::info!("Update detection complete: {} updates", updates.len());
        Ok(updates)
    }

    /// Returns the apps the package registry could not match.
    async fn check_registry<'a>(
        &self,
        apps: &[&'a InstalledApp],
        updates: &mut Vec<AppUpdate>,
    ) -> AppResult<Vec<&'a InstalledApp>> {
        let casks = self.cask_matcher().await?;
        let mut unmatched = Vec::new();
        let mut found = 0usize;

        for &app in apps {
            match casks.lookup(app) {
                MatchOutcome::Matched { entry, strategy, display_name } => {
                    found += 1;
                    log::info!(
                        "Registry: {} -> {} via {} (installed {}, catalog {})",
                        app.name(),
                        entry.token,
                        strategy.as_str(),
                        app.version,
                        entry.version
                    );
                    if version_compare::is_newer(&entry.version, &app.version) {
                        updates.push(AppUpdate {
                            app_name: display_name.unwrap_or(entry.display_name()).to_string(),
                            current_version: app.version.clone(),
                            new_version: entry.version.clone(),
                            download_url: entry.url.clone(),
                            source: UpdateSource::PackageRegistry,
                            installed_bundle_id: app.bundle_id.clone(),
                        });
                    }
                }
                MatchOutcome::Suppressed => found += 1,
                MatchOutcome::Unmatched => unmatched.push(app),
            }
        }

        log::info!("Registry matched {}/{} apps", found, apps.len());
        Ok(unmatched)
    }

    async fn check_hosted(&self, apps: &[&InstalledApp], updates: &mut Vec<AppUpdate>) {
        let hosted = match self.hosted_matcher().await {
            Ok(m) => m,
            Err(e) => {
                log::warn!("Hosted manifest catalog unavailable: {}", e);
                return;
            }
        };

        for &app in apps {
            if hosted_manifest::is_excluded(app) {
                continue;
            }
            let MatchOutcome::Matched { entry, strategy, .. } = hosted.lookup(app) else {
                continue;
            };

            let manifest = match self.fetcher.fetch_hosted_manifest(&entry.manifest_url).await {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("Failed to fetch manifest for {}: {}", entry.key, e);
                    continue;
                }
            };

            if !manifest.bundle_id.is_empty() && manifest.bundle_id != app.bundle_id {
                log::info!(
                    "Hosted manifest {} declares {} but installed app is {}",
                    entry.key,
                    manifest.bundle_id,
                    app.bundle_id
                );
            }
            log::info!(
                "Hosted: {} -> {} via {} (installed {}, manifest {})",
                app.name(),
                entry.key,
                strategy.as_str(),
                app.version,
                manifest.version
            );

            if version_compare::is_newer(&manifest.version, &app.version) {
                updates.push(AppUpdate {
                    app_name: manifest.name,
                    current_version: app.version.clone(),
                    new_version: manifest.version,
                    download_url: Some(manifest.url),
                    source: UpdateSource::HostedManifest,
                    installed_bundle_id: app.bundle_id.clone(),
                });
            }
        }
    }
}
