use plist::Value;
use std::path::Path;

use crate::utils::{AppError, AppResult};

pub fn read_info_plist(app_path: &Path) -> AppResult<plist::Dictionary> {
    let plist_path = app_path.join("Contents/Info.plist");
    let val = Value::from_file(&plist_path)?;
    val.into_dictionary()
        .ok_or_else(|| AppError::Custom("Info.plist is not a dictionary".into()))
}

pub fn get_string(dict: &plist::Dictionary, key: &str) -> Option<String> {
    dict.get(key)?.as_string().map(String::from)
}

/// Nested lookup, e.g. `CFBundleIcons` → `CFBundlePrimaryIcon` → `CFBundleIconFiles[0]`.
pub fn get_primary_icon_file(dict: &plist::Dictionary) -> Option<String> {
    dict.get("CFBundleIcons")?
        .as_dictionary()?
        .get("CFBundlePrimaryIcon")?
        .as_dictionary()?
        .get("CFBundleIconFiles")?
        .as_array()?
        .first()?
        .as_string()
        .map(String::from)
}
