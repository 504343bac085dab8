use serde::{Deserialize, Serialize};

/// One cask from the package-registry index, reduced to what matching needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaskEntry {
    pub token: String,
    pub names: Vec<String>,
    pub version: String,
    pub url: Option<String>,
    pub homepage: Option<String>,
    pub desc: Option<String>,
    /// App artifact file names without the `.app` suffix.
    pub app_names: Vec<String>,
    /// Bundle IDs from quit stanzas and the known-mapping table, lowercased.
    pub bundle_ids: Vec<String>,
}

impl CaskEntry {
    pub fn display_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.token)
    }
}

/// Hosted catalog row: app key (e.g. `google_chrome`) → manifest URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedCatalogEntry {
    pub key: String,
    pub manifest_url: String,
}

/// Per-app manifest served by the hosted catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostedApp {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
    pub url: String,
    #[serde(default)]
    pub bundle_id: String,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// An app that ships its own command-line updater.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NativeUpdater {
    pub bundle_id: String,
    pub app_name: String,
    pub check: CommandSpec,
    pub install: CommandSpec,
}

impl NativeUpdater {
    pub fn parallels_desktop() -> Self {
        const PRLCTL: &str = "/Applications/Parallels Desktop.app/Contents/MacOS/prlctl";
        Self {
            bundle_id: "com.parallels.desktop.console".into(),
            app_name: "Parallels Desktop".into(),
            check: CommandSpec::new(PRLCTL, &["update"]),
            install: CommandSpec::new(PRLCTL, &["update", "--install"]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosted_manifest_parses_with_missing_optionals() {
        let json = r#"{"name":"Google Chrome","version":"126.0.6478.127","url":"https://dl.google.com/chrome.dmg","bundleId":"com.google.Chrome"}"#;
        let app: HostedApp = serde_json::from_str(json).unwrap();
        assert_eq!(app.bundle_id, "com.google.Chrome");
        assert!(app.file_name.is_empty());
    }

    #[test]
    fn cask_display_name_falls_back_to_token() {
        let cask = CaskEntry { token: "iterm2".into(), ..Default::default() };
        assert_eq!(cask.display_name(), "iterm2");
    }
}
