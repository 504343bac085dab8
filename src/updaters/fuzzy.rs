//! Similarity scoring used as the last-resort catalog match.

const MIN_SCORE: f64 = 0.85;
const SHORT_NAME_MIN_SCORE: f64 = 0.95;
const SHORT_NAME_LEN: usize = 4;
const MIN_FUZZY_NAME_LEN: usize = 4;

pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Similarity in [0, 1] with a length-difference penalty.
pub fn string_score(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }

    let len_a = a.chars().count();
    let len_b = b.chars().count();
    let max_len = len_a.max(len_b) as f64;
    let penalty = len_a.abs_diff(len_b) as f64 / max_len;

    if penalty > 0.5 {
        return 0.0;
    }

    if a.contains(b) || b.contains(a) {
        return 0.8 - penalty * 0.3;
    }

    let similarity = 1.0 - levenshtein(a, b) as f64 / max_len;
    (similarity - penalty).max(0.0)
}

/// Score of one catalog candidate against a lowercased app name: the best of
/// its key and its display names. Short app names must be near-exact.
pub fn candidate_score(app_name: &str, key: &str, display_names: &[String]) -> f64 {
    let mut score = string_score(app_name, key);
    for name in display_names {
        score = score.max(string_score(app_name, &name.to_lowercase()));
    }

    if app_name.chars().count() <= SHORT_NAME_LEN && score < SHORT_NAME_MIN_SCORE {
        return 0.0;
    }
    score
}

/// Index of the single best candidate above threshold. Ties keep the first.
pub fn best_match<'a, I>(app_name: &str, candidates: I) -> Option<(usize, f64)>
where
    I: IntoIterator<Item = (&'a str, &'a [String])>,
{
    let name = app_name.to_lowercase();
    if name.chars().count() < MIN_FUZZY_NAME_LEN {
        return None;
    }

    let mut best: Option<(usize, f64)> = None;
    for (i, (key, display_names)) in candidates.into_iter().enumerate() {
        let score = candidate_score(&name, key, display_names);
        if score >= MIN_SCORE && best.map_or(true, |(_, b)| score > b) {
            best = Some((i, score));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn score_rules() {
        assert_eq!(string_score("slack", "slack"), 1.0);
        assert_eq!(string_score("ab", "abcdef"), 0.0);
        // containment: "iterm" in "iterm2", penalty 1/6
        let s = string_score("iterm", "iterm2");
        assert!((s - (0.8 - 0.3 / 6.0)).abs() < 1e-9);
    }

    #[test]
    fn three_letter_names_never_match() {
        let key = names(&["vlc"]);
        assert!(best_match("vlc", [("vlc", &key[..])]).is_none());
    }

    #[test]
    fn four_letter_names_need_near_exact() {
        let empty: Vec<String> = Vec::new();
        assert!(best_match("zoom", [("zoom", &empty[..])]).is_some());
        // "zoomx" vs "zoom": containment scores 0.74, below the short-name bar
        assert!(best_match("zoom", [("zoomx", &empty[..])]).is_none());
    }

    #[test]
    fn best_candidate_wins_first_on_ties() {
        let empty: Vec<String> = Vec::new();
        let display = names(&["Obsidian"]);
        let candidates = [
            ("obsidian-beta", &empty[..]),
            ("obsidian-app", &display[..]),
            ("obsidian", &empty[..]),
        ];
        assert_eq!(best_match("Obsidian", candidates), Some((1, 1.0)));
    }

    #[test]
    fn below_threshold_is_rejected() {
        let empty: Vec<String> = Vec::new();
        assert!(best_match("Telegram", [("instagram", &empty[..])]).is_none());
    }
}
