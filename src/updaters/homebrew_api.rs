use std::collections::HashMap;

use super::version_compare;
use crate::models::CaskEntry;
use crate::utils::{AppError, AppResult};

/// Bundle IDs for popular casks whose JSON carries no usable quit stanza.
const KNOWN_BUNDLE_IDS: &[(&str, &[&str])] = &[
    // Development
    ("visual-studio-code", &["com.microsoft.VSCode"]),
    ("cursor", &["com.todesktop.230313mzl4w4u92"]),
    ("sublime-text", &["com.sublimetext.4"]),
    ("intellij-idea", &["com.jetbrains.intellij", "com.jetbrains.intellij.ce"]),
    ("pycharm", &["com.jetbrains.pycharm", "com.jetbrains.pycharm.ce"]),
    ("webstorm", &["com.jetbrains.webstorm"]),
    ("android-studio", &["com.google.android.studio"]),
    ("github", &["com.github.GitHubClient"]),
    ("sourcetree", &["com.torusknot.SourceTreeNotMAS"]),
    ("docker-desktop", &["com.docker.docker"]),
    ("postman", &["com.postmanlabs.mac"]),
    // Browsers
    ("google-chrome", &["com.google.Chrome"]),
    ("firefox", &["org.mozilla.firefox"]),
    ("brave-browser", &["com.brave.Browser"]),
    ("microsoft-edge", &["com.microsoft.edgemac"]),
    ("arc", &["company.thebrowser.Browser"]),
    ("opera", &["com.operasoftware.Opera"]),
    ("vivaldi", &["com.vivaldi.Vivaldi"]),
    // Communication
    ("slack", &["com.tinyspeck.slackmacgap"]),
    ("discord", &["com.hnc.Discord"]),
    ("zoom", &["us.zoom.xos"]),
    ("telegram", &["ru.keepcoder.Telegram"]),
    ("whatsapp", &["net.whatsapp.WhatsApp"]),
    ("signal", &["org.whispersystems.signal-desktop"]),
    // Productivity
    ("notion", &["notion.id"]),
    ("obsidian", &["md.obsidian"]),
    ("1password", &["com.1password.1password", "com.agilebits.onepassword7"]),
    ("alfred", &["com.runningwithcrayons.Alfred"]),
    ("raycast", &["com.raycast.macos"]),
    ("rectangle", &["com.knollsoft.Rectangle"]),
    ("magnet", &["com.crowdcafe.Magnet"]),
    // Media
    ("spotify", &["com.spotify.client"]),
    ("vlc", &["org.videolan.vlc"]),
    ("iina", &["com.colliderli.iina"]),
    ("handbrake", &["fr.handbrake.HandBrake"]),
    // Design
    ("figma", &["com.figma.Desktop"]),
    ("sketch", &["com.bohemiancoding.sketch3"]),
    ("pixelmator-pro", &["com.pixelmatorteam.pixelmator.x"]),
    // Utilities
    ("cleanmymac", &["com.macpaw.CleanMyMac4", "com.macpaw.CleanMyMac-X"]),
    ("bartender", &["com.surteesstudios.Bartender-4"]),
    ("the-unarchiver", &["cx.c3.theunarchiver"]),
    ("istat-menus", &["com.bjango.istatmenus"]),
    ("little-snitch", &["at.obdev.LittleSnitch"]),
    ("iterm2", &["com.googlecode.iterm2"]),
    ("warp", &["dev.warp.Warp"]),
    ("dropbox", &["com.getdropbox.dropbox"]),
    ("google-drive", &["com.google.GoogleDrive"]),
    // Virtualization
    ("parallels", &["com.parallels.desktop.console"]),
    ("vmware-fusion", &["com.vmware.fusion"]),
    ("virtualbox", &["org.virtualbox.app.VirtualBox"]),
    // Assistants
    ("chatgpt", &["com.openai.chat"]),
    ("claude", &["com.anthropic.claudefordesktop"]),
];

/// Normalize an app artifact name: trim and strip the ".app" suffix.
fn normalize_app_name(name: &str) -> String {
    let s = name.trim();
    s.strip_suffix(".app").unwrap_or(s).to_string()
}

/// App artifact entries are either plain file names or `{"target": ...}` objects.
fn app_artifact_name(value: &serde_json::Value) -> Option<&str> {
    value.as_str().or_else(|| {
        value
            .get("target")
            .or_else(|| value.get("name"))
            .and_then(|v| v.as_str())
    })
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !value.is_empty() && !list.contains(&value) {
        list.push(value);
    }
}

/// Collect `quit` bundle IDs from an `uninstall`/`zap` stanza list.
fn collect_quit_ids(stanzas: &serde_json::Value, out: &mut Vec<String>) {
    let Some(stanzas) = stanzas.as_array() else {
        return;
    };
    for stanza in stanzas {
        match stanza.get("quit") {
            Some(serde_json::Value::Array(quits)) => {
                for bid in quits.iter().filter_map(|q| q.as_str()) {
                    push_unique(out, bid.to_lowercase());
                }
            }
            Some(serde_json::Value::String(bid)) => push_unique(out, bid.to_lowercase()),
            _ => {}
        }
    }
}

/// Build cask entries from the parsed cask array. Casks versioned "latest"
/// are skipped since they cannot be compared.
pub fn build_index(json: &[serde_json::Value]) -> Vec<CaskEntry> {
    let known: HashMap<&str, &[&str]> = KNOWN_BUNDLE_IDS.iter().copied().collect();
    let mut entries = Vec::with_capacity(json.len());
    let mut skipped_latest = 0usize;

    for cask in json {
        let token = match cask.get("token").and_then(|v| v.as_str()) {
            Some(t) => t,
            None => continue,
        };
        let raw_version = match cask.get("version").and_then(|v| v.as_str()) {
            Some(v) => v,
            None => continue,
        };
        let version = version_compare::strip_brew_version_token(raw_version);
        if version == "latest" {
            skipped_latest += 1;
            continue;
        }

        let names = cask
            .get("name")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|n| n.as_str()).map(String::from).collect())
            .unwrap_or_default();

        let mut app_names = Vec::new();
        let mut bundle_ids = Vec::new();

        if let Some(artifacts) = cask.get("artifacts").and_then(|v| v.as_array()) {
            for artifact in artifacts {
                if let Some(apps) = artifact.get("app").and_then(|v| v.as_array()) {
                    for name in apps.iter().filter_map(app_artifact_name) {
                        push_unique(&mut app_names, normalize_app_name(name));
                    }
                }
                if let Some(uninstall) = artifact.get("uninstall") {
                    collect_quit_ids(uninstall, &mut bundle_ids);
                }
                if let Some(zap) = artifact.get("zap") {
                    collect_quit_ids(zap, &mut bundle_ids);
                }
            }
        }

        if let Some(ids) = known.get(token) {
            for id in ids.iter() {
                push_unique(&mut bundle_ids, id.to_lowercase());
            }
        }

        entries.push(CaskEntry {
            token: token.to_string(),
            names,
            version: version.to_string(),
            url: cask.get("url").and_then(|v| v.as_str()).map(String::from),
            homepage: cask.get("homepage").and_then(|v| v.as_str()).map(String::from),
            desc: cask.get("desc").and_then(|v| v.as_str()).map(String::from),
            app_names,
            bundle_ids,
        });
    }

    log::info!(
        "Package registry index: {} casks, {} usable, {} skipped as \"latest\"",
        json.len(),
        entries.len(),
        skipped_latest
    );
    entries
}

/// Fetch and index the full cask catalog.
pub async fn fetch_casks(client: &reqwest::Client, url: &str) -> AppResult<Vec<CaskEntry>> {
    log::info!("Fetching package registry catalog from {}", url);
    let resp = client.get(url).send().await?;

    let status = resp.status();
    if !status.is_success() {
        return Err(AppError::Http(format!("{} returned status {}", url, status)));
    }

    let json: Vec<serde_json::Value> = resp.json().await?;
    Ok(build_index(&json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_entries_from_artifacts() {
        let casks = vec![json!({
            "token": "iterm2",
            "name": ["iTerm2"],
            "version": "3.5.2,abcdef",
            "url": "https://iterm2.com/downloads/stable/iTerm2-3_5_2.zip",
            "homepage": "https://iterm2.com/",
            "desc": "Terminal emulator",
            "artifacts": [
                {"app": ["iTerm.app", {"target": "iTerm Nightly.app"}]},
                {"uninstall": [{"quit": ["com.googlecode.iterm2"]}]},
                {"zap": [{"quit": "com.googlecode.iterm2.helper"}]}
            ]
        })];

        let entries = build_index(&casks);
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.version, "3.5.2");
        assert_eq!(e.app_names, vec!["iTerm", "iTerm Nightly"]);
        assert_eq!(e.bundle_ids, vec!["com.googlecode.iterm2", "com.googlecode.iterm2.helper"]);
        assert_eq!(e.desc.as_deref(), Some("Terminal emulator"));
    }

    #[test]
    fn known_mapping_adds_bundle_ids() {
        let casks = vec![json!({
            "token": "visual-studio-code",
            "name": ["Microsoft Visual Studio Code"],
            "version": "1.90.2",
            "artifacts": [{"app": ["Visual Studio Code.app"]}]
        })];
        let entries = build_index(&casks);
        assert_eq!(entries[0].bundle_ids, vec!["com.microsoft.vscode"]);
    }

    #[test]
    fn latest_and_malformed_casks_are_skipped() {
        let casks = vec![
            json!({"token": "some-tool", "name": ["Some Tool"], "version": "latest"}),
            json!({"name": ["No Token"], "version": "1.0"}),
            json!({"token": "no-version"}),
        ];
        assert!(build_index(&casks).is_empty());
    }
}
