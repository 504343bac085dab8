use std::path::Path;

use crate::models::{BundleInfo, InstalledApp};
use crate::utils::plist_parser::{get_primary_icon_file, get_string, read_info_plist};

pub fn read_bundle(app_path: &Path) -> Option<BundleInfo> {
    let dict = read_info_plist(app_path).ok()?;

    let bundle_id = get_string(&dict, "CFBundleIdentifier")?;

    Some(BundleInfo {
        bundle_id,
        app_path: app_path.to_string_lossy().to_string(),
        short_version: get_string(&dict, "CFBundleShortVersionString"),
        bundle_version: get_string(&dict, "CFBundleVersion"),
        info_string: get_string(&dict, "CFBundleGetInfoString"),
        icon_file: get_string(&dict, "CFBundleIconFile").or_else(|| get_primary_icon_file(&dict)),
    })
}

fn dot_components(v: &str) -> usize {
    v.split('.').filter(|s| !s.is_empty()).count()
}

/// Pick the version string that best identifies the installed release.
///
/// Some vendors put the marketing version in the short string and the full
/// dotted release in the build version, others do the opposite; prefer the
/// more specific one unless the bundle is known to misreport.
pub fn resolve_version(info: &BundleInfo, prefer_short_ids: &[String]) -> String {
    let short = info.short_version.as_deref();
    let build = info.bundle_version.as_deref();

    let raw = match (short, build) {
        (Some(s), _) if prefer_short_ids.contains(&info.bundle_id) => s.to_string(),
        (Some(s), Some(b)) => {
            if dot_components(b) > dot_components(s) {
                b.to_string()
            } else {
                s.to_string()
            }
        }
        (Some(s), None) => s.to_string(),
        (None, Some(b)) => b.to_string(),
        (None, None) => info
            .info_string
            .as_deref()
            .and_then(|s| s.split(' ').next())
            .filter(|s| !s.is_empty())
            .unwrap_or("0.0.0")
            .to_string(),
    };

    clean_version(&raw)
}

/// Strip leading `Build ` and `v`/`V` markers, e.g. `"v 2.3"` → `"2.3"`.
pub fn clean_version(raw: &str) -> String {
    let mut s = raw.trim();
    loop {
        if let Some(rest) = s.strip_prefix("Build ") {
            s = rest.trim_start();
        } else if s.starts_with(['v', 'V'])
            && s[1..].trim_start().starts_with(|c: char| c.is_ascii_digit())
        {
            s = s[1..].trim_start();
        } else {
            break;
        }
    }
    s.trim().to_string()
}

pub fn to_installed_app(info: BundleInfo, prefer_short_ids: &[String]) -> InstalledApp {
    let version = resolve_version(&info, prefer_short_ids);
    InstalledApp {
        bundle_id: info.bundle_id,
        version,
        path: info.app_path,
        icon_file: info.icon_file,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str, short: Option<&str>, build: Option<&str>, get_info: Option<&str>) -> BundleInfo {
        BundleInfo {
            bundle_id: id.into(),
            app_path: "/Applications/X.app".into(),
            short_version: short.map(String::from),
            bundle_version: build.map(String::from),
            info_string: get_info.map(String::from),
            icon_file: None,
        }
    }

    #[test]
    fn more_specific_version_wins() {
        let none: Vec<String> = Vec::new();
        assert_eq!(resolve_version(&info("a", Some("2024.2"), Some("2024.2.1.11"), None), &none), "2024.2.1.11");
        assert_eq!(resolve_version(&info("a", Some("6.5.3"), Some("58803"), None), &none), "6.5.3");
        // equal component counts keep the short version
        assert_eq!(resolve_version(&info("a", Some("1.2"), Some("1.3"), None), &none), "1.2");
    }

    #[test]
    fn prefer_short_list_is_honored() {
        let prefer = vec!["com.google.android.studio".to_string()];
        let i = info("com.google.android.studio", Some("2024.2"), Some("AI-242.23339.11.2421"), None);
        assert_eq!(resolve_version(&i, &prefer), "2024.2");
    }

    #[test]
    fn fallbacks() {
        let none: Vec<String> = Vec::new();
        assert_eq!(resolve_version(&info("a", None, Some("812"), None), &none), "812");
        assert_eq!(resolve_version(&info("a", None, None, Some("3.1.4 Copyright Acme")), &none), "3.1.4");
        assert_eq!(resolve_version(&info("a", None, None, None), &none), "0.0.0");
    }

    #[test]
    fn cleans_markers() {
        assert_eq!(clean_version("v1.2.3"), "1.2.3");
        assert_eq!(clean_version(" Build 456 "), "456");
        assert_eq!(clean_version("V 7.0"), "7.0");
        assert_eq!(clean_version("1.0"), "1.0");
    }

    #[test]
    fn reads_real_plist() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("Demo.app");
        std::fs::create_dir_all(app.join("Contents")).unwrap();
        let mut dict = plist::Dictionary::new();
        dict.insert("CFBundleIdentifier".into(), "com.example.demo".into());
        dict.insert("CFBundleShortVersionString".into(), "v2.0".into());
        dict.insert("CFBundleIconFile".into(), "AppIcon".into());
        plist::Value::Dictionary(dict).to_file_xml(app.join("Contents/Info.plist")).unwrap();

        let bundle = read_bundle(&app).unwrap();
        let installed = to_installed_app(bundle, &[]);
        assert_eq!(installed.bundle_id, "com.example.demo");
        assert_eq!(installed.version, "2.0");
        assert_eq!(installed.icon_file.as_deref(), Some("AppIcon"));
    }
}
