use regex::Regex;
use std::cmp::Ordering;
use std::sync::LazyLock;

static RE_WORD_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(?:build |version )").unwrap());

/// Strip package-registry version tokens (comma-separated hash/qualifier).
/// e.g. "1.1.3363,ee424797ca4d37a06f6b4a1e48dc944838ac3b18" → "1.1.3363"
pub fn strip_brew_version_token(version: &str) -> &str {
    version.split(',').next().unwrap_or(version)
}

/// Reduce a vendor version string to its dotted base.
///
/// `"v6.5.3 (58803)"` → `"6.5.3.58803"`, `"3.5.0-3d21337d"` → `"3.5.0"`,
/// `"2024.2.1 Patch 2"` → `"2024.2.1.2"`.
pub fn normalize(version: &str) -> String {
    let mut clean = version;
    if clean.starts_with(['v', 'V']) {
        clean = &clean[1..];
    }

    let mut clean = RE_WORD_PREFIX.replace_all(clean, "").into_owned();
    clean = clean.replace(" Patch ", ".");
    clean = clean.replace(" (", ".").replace(')', "");

    if let Some(dash) = clean.find('-') {
        clean.truncate(dash);
    }

    clean.trim_end_matches('.').trim().to_string()
}

/// True when `candidate` is strictly newer than `current`.
///
/// A current version that is a dot-aligned prefix of the candidate counts as
/// the same release (`"6.5.3"` vs `"6.5.3.58803"`), since catalogs often
/// append a build number the bundle does not carry.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    let new = normalize(candidate);
    let cur = normalize(current);

    if new == cur {
        return false;
    }
    if let Some(rest) = new.strip_prefix(cur.as_str()) {
        if rest.is_empty() || rest.starts_with('.') {
            return false;
        }
    }

    let result = compare_components(&new, &cur) == Ordering::Greater;
    log::debug!(
        "Version comparison: '{}' vs '{}' (normalized '{}' vs '{}') -> {}",
        candidate,
        current,
        new,
        cur,
        if result { "newer" } else { "not newer" }
    );
    result
}

/// Pairwise integer comparison. Components that are not integers are skipped
/// before alignment and missing components count as zero.
fn compare_components(a: &str, b: &str) -> Ordering {
    let pa: Vec<u64> = a.split('.').filter_map(|p| p.parse().ok()).collect();
    let pb: Vec<u64> = b.split('.').filter_map(|p| p.parse().ok()).collect();

    let max_len = pa.len().max(pb.len());
    for i in 0..max_len {
        let na = pa.get(i).copied().unwrap_or(0);
        let nb = pb.get(i).copied().unwrap_or(0);
        match na.cmp(&nb) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}
