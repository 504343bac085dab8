use std::collections::HashSet;

use crate::models::InstalledApp;

/// Drop later copies of the same bundle ID, keeping scan order.
pub fn deduplicate(apps: Vec<InstalledApp>) -> Vec<InstalledApp> {
    let total = apps.len();
    let mut seen = HashSet::new();
    let unique: Vec<InstalledApp> = apps
        .into_iter()
        .filter(|app| !app.bundle_id.is_empty() && seen.insert(app.bundle_id.clone()))
        .collect();
    log::info!("Found {} total apps, {} unique after deduplication", total, unique.len());
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(id: &str, path: &str) -> InstalledApp {
        InstalledApp { bundle_id: id.into(), version: "1".into(), path: path.into(), icon_file: None }
    }

    #[test]
    fn first_occurrence_wins() {
        let out = deduplicate(vec![
            app("com.a", "/Applications/A.app"),
            app("com.b", "/Applications/B.app"),
            app("com.a", "/Users/me/Applications/A.app"),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].path, "/Applications/A.app");
    }
}
