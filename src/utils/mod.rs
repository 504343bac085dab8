pub mod app_lifecycle;
pub mod command;
pub mod error;
pub mod http_client;
pub mod launch_services;
pub mod plist_parser;

pub use error::{AppError, AppResult};

/// Products of the first-party productivity suite. These ship their own
/// updater and must never be matched against third-party catalogs.
const SUITE_BUNDLE_IDS: &[&str] = &[
    "com.microsoft.Word",
    "com.microsoft.Excel",
    "com.microsoft.Powerpoint",
    "com.microsoft.PowerPoint",
    "com.microsoft.Outlook",
    "com.microsoft.OneNote",
    "com.microsoft.onenote.mac",
    "com.microsoft.Office365ServiceV2",
    "com.microsoft.office",
    "com.microsoft.Office",
    "com.microsoft.Office365",
    "com.microsoft.package.Microsoft_Office_16",
    "com.microsoft.package.DFU",
    "com.microsoft.autoupdate",
    "com.microsoft.autoupdate2",
    "com.microsoft.update.agent",
    "com.microsoft.teams",
    "com.microsoft.teams2",
];

const SUITE_PRODUCT_TOKENS: &[&str] = &["word", "excel", "powerpoint", "outlook", "onenote", "office"];

/// Returns true if the bundle ID belongs to the suite's own update channel.
pub fn is_suite_managed(bundle_id: &str) -> bool {
    if SUITE_BUNDLE_IDS.contains(&bundle_id) {
        return true;
    }
    let lower = bundle_id.to_lowercase();
    lower.contains("microsoft") && SUITE_PRODUCT_TOKENS.iter().any(|t| lower.contains(t))
}

/// True when the current process runs with an effective uid of 0.
pub fn is_elevated() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Expand `~` prefix to the user's home directory.
pub fn expand_tilde(path: &str) -> std::path::PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    std::path::PathBuf::from(path)
}
