use std::path::Path;
use std::time::Duration;

use crate::utils::command::CommandRunner;

const LSREGISTER: &str = "/System/Library/Frameworks/CoreServices.framework/Frameworks/LaunchServices.framework/Support/lsregister";

const DOMAINS: [&str; 6] = ["-domain", "local", "-domain", "system", "-domain", "user"];

/// Rebuild the Launch Services registration database and touch the
/// applications directory so Finder and `NSWorkspace` pick up new bundles.
///
/// When `restart_prefs` is set the preferences daemon is restarted first so
/// stale cached Info.plist values are dropped too.
pub async fn refresh_registration(
    runner: &dyn CommandRunner,
    applications_dir: &Path,
    restart_prefs: bool,
    pause: Duration,
) {
    log::info!("Refreshing application registration database...");

    let apps_dir = applications_dir.to_string_lossy().to_string();
    let mut kill_args = vec!["-kill", "-r"];
    kill_args.extend(DOMAINS);
    let mut rebuild_args = vec!["-r"];
    rebuild_args.extend(DOMAINS);

    let mut commands: Vec<(&str, Vec<&str>)> = Vec::new();
    if restart_prefs {
        commands.push(("/usr/bin/killall", vec!["cfprefsd"]));
    }
    commands.push((LSREGISTER, kill_args));
    commands.push((LSREGISTER, rebuild_args));
    commands.push(("/usr/bin/touch", vec![apps_dir.as_str()]));

    for (program, args) in commands {
        match runner.run(program, &args, 120).await {
            Ok(out) if !out.success => {
                log::debug!("{} exited with {:?}: {}", program, out.code, out.combined.trim());
            }
            Ok(_) => {}
            Err(e) => log::debug!("{} could not run: {}", program, e),
        }
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    log::info!("Registration database refresh complete");
}
