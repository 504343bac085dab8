use std::time::Duration;

use crate::utils::command::CommandRunner;

/// Helper processes that survive their app quitting and hold bundle files open.
const ALWAYS_TEARDOWN: &[&str] = &["Android Studio", "AndroidStudio"];

/// Process names to tear down before replacing a bundle: the app name without
/// its `.app` suffix, the same with spaces removed, then [`ALWAYS_TEARDOWN`].
pub fn teardown_targets(app_name: &str) -> Vec<String> {
    let base = app_name.trim().trim_end_matches(".app").to_string();
    let mut targets = Vec::new();
    let candidates = [base.clone(), base.replace(' ', "")]
        .into_iter()
        .chain(ALWAYS_TEARDOWN.iter().map(|s| s.to_string()));
    for candidate in candidates {
        if !candidate.is_empty() && !targets.contains(&candidate) {
            targets.push(candidate);
        }
    }
    targets
}

/// Force-kill every process of the app (by full command line and by name),
/// then wait `settle` for the kernel to reap them. Failures are ignored:
/// `pkill` exits 1 when nothing matched, which is the common case.
pub async fn force_kill_processes(runner: &dyn CommandRunner, app_name: &str, settle: Duration) {
    let targets = teardown_targets(app_name);
    log::info!("Killing processes: {:?}", targets);

    for name in &targets {
        let _ = runner.run("/usr/bin/pkill", &["-9", "-f", name], 10).await;
        let _ = runner.run("/usr/bin/pkill", &["-9", name], 10).await;
    }

    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_strip_suffix_and_spaces() {
        assert_eq!(
            teardown_targets("Visual Studio Code.app"),
            vec!["Visual Studio Code", "VisualStudioCode", "Android Studio", "AndroidStudio"]
        );
    }

    #[test]
    fn targets_dedupe_single_word() {
        assert_eq!(teardown_targets("Firefox"), vec!["Firefox", "Android Studio", "AndroidStudio"]);
    }

    #[test]
    fn android_studio_is_not_listed_twice() {
        assert_eq!(teardown_targets("Android Studio.app"), vec!["Android Studio", "AndroidStudio"]);
    }
}
