use std::fs;
use std::path::{Path, PathBuf};

fn is_app_bundle(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "app")
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(rd) => rd.flatten().map(|e| e.path()).collect(),
        Err(_) => return Vec::new(),
    };
    entries.sort();
    entries
}

/// `.app` bundles directly inside `dir`.
pub fn apps_in(dir: &Path) -> Vec<PathBuf> {
    sorted_entries(dir).into_iter().filter(|p| is_app_bundle(p)).collect()
}

/// Bundles inside `root` plus those one level down in vendor folders
/// (e.g. `/Applications/Adobe Photoshop 2024/Adobe Photoshop 2024.app`).
/// Hidden folders are skipped.
pub fn apps_nested(root: &Path) -> Vec<PathBuf> {
    let mut apps = Vec::new();
    for path in sorted_entries(root) {
        if !path.is_dir() {
            continue;
        }
        if is_app_bundle(&path) {
            apps.push(path);
            continue;
        }
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(true, |n| n.starts_with('.'));
        if !hidden {
            apps.extend(apps_in(&path));
        }
    }
    apps
}

/// Walk flat locations first, then nested roots, in configuration order.
pub fn walk(locations: &[PathBuf], nested: &[PathBuf]) -> Vec<PathBuf> {
    let mut apps = Vec::new();
    for dir in locations {
        let found = apps_in(dir);
        log::debug!("DirectoryScan: {} apps in {}", found.len(), dir.display());
        apps.extend(found);
    }
    for root in nested {
        apps.extend(apps_nested(root));
    }
    apps
}
