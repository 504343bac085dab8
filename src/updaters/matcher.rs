use std::collections::HashMap;

use super::fuzzy;
use crate::models::{CaskEntry, HostedCatalogEntry, InstalledApp};
use crate::utils::is_suite_managed;

/// What a catalog exposes to the matcher.
pub trait CatalogEntry: Send + Sync {
    /// Primary key used for fuzzy scoring (cask token, hosted app key).
    fn key(&self) -> &str;
    /// Human-readable names, also scored during fuzzy matching.
    fn display_names(&self) -> &[String];
    /// Every name worth indexing by its variations.
    fn indexed_names(&self) -> Vec<&str>;
    /// Bundle IDs this entry is known to install.
    fn identities(&self) -> &[String];
}

impl CatalogEntry for CaskEntry {
    fn key(&self) -> &str {
        &self.token
    }

    fn display_names(&self) -> &[String] {
        &self.names
    }

    fn indexed_names(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.names.iter().map(String::as_str).collect();
        out.push(&self.token);
        out.extend(self.app_names.iter().map(String::as_str));
        out
    }

    fn identities(&self) -> &[String] {
        &self.bundle_ids
    }
}

impl CatalogEntry for HostedCatalogEntry {
    fn key(&self) -> &str {
        &self.key
    }

    fn display_names(&self) -> &[String] {
        &[]
    }

    fn indexed_names(&self) -> Vec<&str> {
        vec![&self.key]
    }

    fn identities(&self) -> &[String] {
        &[]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    ManualOverride,
    Identity,
    ExactName,
    NameVariation,
    Fuzzy,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &str {
        match self {
            MatchStrategy::ManualOverride => "manual-override",
            MatchStrategy::Identity => "bundle-id",
            MatchStrategy::ExactName => "app-name-exact",
            MatchStrategy::NameVariation => "app-name-variation",
            MatchStrategy::Fuzzy => "fuzzy",
        }
    }
}

#[derive(Debug)]
pub enum MatchOutcome<'a, E> {
    Matched {
        entry: &'a E,
        strategy: MatchStrategy,
        /// Forced display name from the override table.
        display_name: Option<&'a str>,
    },
    /// Handled by the override table but nothing in this catalog backs it.
    Suppressed,
    Unmatched,
}

/// Lowercase name plus the separator variants catalogs tend to use.
/// `"Visual Studio Code"` → `visual studio code`, `visual-studio-code`,
/// `visual_studio_code`, `visualstudiocode`, …, `visual`.
pub fn name_variations(name: &str) -> Vec<String> {
    let base = name.to_lowercase();
    let first_word = base.split(' ').next().unwrap_or(&base).to_string();
    vec![
        base.clone(),
        base.replace(' ', "-"),
        base.replace(' ', "_"),
        base.replace(' ', ""),
        base.replace('-', "_"),
        base.replace('_', "-"),
        first_word,
    ]
}

/// Lookup indexes over one catalog. Later entries overwrite earlier ones on key collisions.
pub struct CatalogMatcher<E> {
    entries: Vec<E>,
    by_identity: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
    overrides: HashMap<String, String>,
}

impl<E: CatalogEntry> CatalogMatcher<E> {
    pub fn new(entries: Vec<E>, overrides: HashMap<String, String>) -> Self {
        let mut by_identity = HashMap::new();
        let mut by_name = HashMap::new();

        for (i, entry) in entries.iter().enumerate() {
            for id in entry.identities() {
                by_identity.insert(id.to_lowercase(), i);
            }
            for name in entry.indexed_names() {
                for variation in name_variations(name.trim_end_matches(".app")) {
                    if !variation.is_empty() {
                        by_name.insert(variation, i);
                    }
                }
            }
        }

        log::info!(
            "Catalog index: {} entries, {} identity keys, {} name keys",
            entries.len(),
            by_identity.len(),
            by_name.len()
        );

        Self { entries, by_identity, by_name, overrides }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[E] {
        &self.entries
    }

    pub fn by_identity(&self, bundle_id: &str) -> Option<&E> {
        self.by_identity
            .get(&bundle_id.to_lowercase())
            .map(|&i| &self.entries[i])
    }

    pub fn lookup(&self, app: &InstalledApp) -> MatchOutcome<'_, E> {
        if is_suite_managed(&app.bundle_id) {
            return MatchOutcome::Unmatched;
        }

        if let Some(forced) = self.overrides.get(&app.bundle_id) {
            log::info!("Manual mapping for {}: {}", app.bundle_id, forced);
            return match self.by_identity(&app.bundle_id) {
                Some(entry) => MatchOutcome::Matched {
                    entry,
                    strategy: MatchStrategy::ManualOverride,
                    display_name: Some(forced.as_str()),
                },
                None => MatchOutcome::Suppressed,
            };
        }

        if let Some(entry) = self.by_identity(&app.bundle_id) {
            return self.matched(entry, MatchStrategy::Identity);
        }

        let app_name = app.name();
        let lowered = app_name.to_lowercase();
        if let Some(&i) = self.by_name.get(&lowered) {
            return self.matched(&self.entries[i], MatchStrategy::ExactName);
        }

        for variation in name_variations(&app_name) {
            if let Some(&i) = self.by_name.get(&variation) {
                return self.matched(&self.entries[i], MatchStrategy::NameVariation);
            }
        }

        let candidates = self.entries.iter().map(|e| (e.key(), e.display_names()));
        if let Some((i, score)) = fuzzy::best_match(&app_name, candidates) {
            log::warn!(
                "Fuzzy match used for {} -> {} (score {:.2})",
                app_name,
                self.entries[i].key(),
                score
            );
            return self.matched(&self.entries[i], MatchStrategy::Fuzzy);
        }

        MatchOutcome::Unmatched
    }

    fn matched<'a>(&'a self, entry: &'a E, strategy: MatchStrategy) -> MatchOutcome<'a, E> {
        MatchOutcome::Matched { entry, strategy, display_name: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cask(token: &str, name: &str, version: &str, bundle_ids: &[&str]) -> CaskEntry {
        CaskEntry {
            token: token.into(),
            names: vec![name.into()],
            version: version.into(),
            url: Some(format!("https://example.com/{token}.dmg")),
            bundle_ids: bundle_ids.iter().map(|b| b.to_lowercase()).collect(),
            ..Default::default()
        }
    }

    fn app(bundle_id: &str, file: &str) -> InstalledApp {
        InstalledApp {
            bundle_id: bundle_id.into(),
            version: "1.0".into(),
            path: format!("/Applications/{file}.app"),
            icon_file: None,
        }
    }

    fn strategy_of<E>(outcome: MatchOutcome<'_, E>) -> Option<(MatchStrategy, &E)> {
        match outcome {
            MatchOutcome::Matched { entry, strategy, .. } => Some((strategy, entry)),
            _ => None,
        }
    }

    #[test]
    fn variations_cover_separators() {
        let v = name_variations("Visual Studio Code");
        assert_eq!(v[0], "visual studio code");
        for expected in ["visual-studio-code", "visual_studio_code", "visualstudiocode", "visual"] {
            assert!(v.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn identity_beats_fuzzy() {
        let matcher = CatalogMatcher::new(
            vec![
                cask("notabilitx", "Notabilitx", "9.9", &[]),
                cask("ginger-notes", "Ginger Notes", "4.0", &["com.gingerlabs.Notability"]),
            ],
            HashMap::new(),
        );

        // Without the identity the name alone fuzzy-matches the wrong cask.
        let (strategy, entry) = strategy_of(matcher.lookup(&app("com.example.other", "Notability"))).unwrap();
        assert_eq!(strategy, MatchStrategy::Fuzzy);
        assert_eq!(entry.token, "notabilitx");

        let (strategy, entry) = strategy_of(matcher.lookup(&app("com.gingerlabs.Notability", "Notability"))).unwrap();
        assert_eq!(strategy, MatchStrategy::Identity);
        assert_eq!(entry.token, "ginger-notes");
    }

    #[test]
    fn identity_lookup_is_case_insensitive() {
        let matcher = CatalogMatcher::new(vec![cask("vscode", "VS Code", "1.2", &["com.microsoft.VSCode"])], HashMap::new());
        assert!(matcher.by_identity("com.microsoft.vscode").is_some());
    }

    #[test]
    fn exact_and_variation_names() {
        let matcher = CatalogMatcher::new(
            vec![cask("visual-studio-code", "Microsoft Visual Studio Code", "1.90", &[])],
            HashMap::new(),
        );
        let (strategy, _) = strategy_of(matcher.lookup(&app("com.example.code", "visual-studio-code"))).unwrap();
        assert_eq!(strategy, MatchStrategy::ExactName);

        let (strategy, _) = strategy_of(matcher.lookup(&app("com.example.code", "Visual Studio Code"))).unwrap();
        assert_eq!(strategy, MatchStrategy::NameVariation);
    }

    #[test]
    fn last_insertion_wins_on_name_collision() {
        let matcher = CatalogMatcher::new(
            vec![cask("firefox", "Firefox", "127.0", &[]), cask("firefox-esr", "Firefox", "115.0", &[])],
            HashMap::new(),
        );
        let (_, entry) = strategy_of(matcher.lookup(&app("org.example.ff", "Firefox"))).unwrap();
        assert_eq!(entry.token, "firefox-esr");
    }

    #[test]
    fn last_insertion_wins_on_identity_collision() {
        let matcher = CatalogMatcher::new(
            vec![
                cask("zoom", "Zoom", "6.0.0", &["us.zoom.xos"]),
                cask("zoom-for-it-admins", "Zoom for IT Admins", "6.1.0", &["us.zoom.xos"]),
            ],
            HashMap::new(),
        );
        let (strategy, entry) = strategy_of(matcher.lookup(&app("us.zoom.xos", "zoom.us"))).unwrap();
        assert_eq!(strategy, MatchStrategy::Identity);
        assert_eq!(entry.token, "zoom-for-it-admins");
    }

    #[test]
    fn override_without_entry_suppresses() {
        let mut overrides = HashMap::new();
        overrides.insert("com.latenightsw.Script-Notary2".to_string(), "SD Notary 2".to_string());
        let matcher = CatalogMatcher::new(vec![cask("sd-notary", "SD Notary", "2.5", &[])], overrides);
        assert!(matches!(
            matcher.lookup(&app("com.latenightsw.Script-Notary2", "SD Notary 2")),
            MatchOutcome::Suppressed
        ));
    }

    #[test]
    fn override_with_entry_uses_forced_name() {
        let mut overrides = HashMap::new();
        overrides.insert("com.latenightsw.Script-Notary2".to_string(), "SD Notary 2".to_string());
        let matcher = CatalogMatcher::new(
            vec![cask("sd-notary", "SD Notary", "2.5", &["com.latenightsw.Script-Notary2"])],
            overrides,
        );
        match matcher.lookup(&app("com.latenightsw.Script-Notary2", "SD Notary 2")) {
            MatchOutcome::Matched { strategy, display_name, .. } => {
                assert_eq!(strategy, MatchStrategy::ManualOverride);
                assert_eq!(display_name, Some("SD Notary 2"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn suite_managed_apps_never_match() {
        let matcher = CatalogMatcher::new(
            vec![cask("microsoft-word", "Microsoft Word", "16.0", &["com.microsoft.Word"])],
            HashMap::new(),
        );
        assert!(matches!(matcher.lookup(&app("com.microsoft.Word", "Microsoft Word")), MatchOutcome::Unmatched));
    }

    #[test]
    fn hosted_keys_match_by_underscore_variation() {
        let matcher = CatalogMatcher::new(
            vec![HostedCatalogEntry {
                key: "google_chrome".into(),
                manifest_url: "https://example.com/google_chrome.json".into(),
            }],
            HashMap::new(),
        );
        let (strategy, entry) = strategy_of(matcher.lookup(&app("com.google.Chrome", "Google Chrome"))).unwrap();
        assert_eq!(strategy, MatchStrategy::NameVariation);
        assert_eq!(entry.key, "google_chrome");
    }
}
