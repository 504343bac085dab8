use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::command::CommandRunner;
use crate::utils::{AppError, AppResult};

/// Hidden sibling used while a replacement is in flight, e.g.
/// `/Applications/.Acme.app.updatebridge-staging`.
pub fn sibling(dest: &Path, suffix: &str) -> PathBuf {
    let name = dest.file_name().and_then(|n| n.to_str()).unwrap_or("bundle");
    dest.with_file_name(format!(".{}.updatebridge-{}", name, suffix))
}

/// Copy `source` into `staging` with `cp -R`.
pub async fn stage(runner: &dyn CommandRunner, source: &Path, staging: &Path) -> AppResult<()> {
    if staging.exists() {
        fs::remove_dir_all(staging)?;
    }
    let src = source.to_string_lossy();
    let dst = staging.to_string_lossy();
    let output = runner.run("/bin/cp", &["-R", src.as_ref(), dst.as_ref()], 600).await?;
    if !output.success {
        return Err(AppError::InstallFailure(format!("Copy failed: {}", output.combined.trim())));
    }
    Ok(())
}

/// Swap `staging` into `dest`. The previous bundle is moved aside first and
/// put back if the final rename fails.
pub fn swap_into_place(staging: &Path, dest: &Path) -> AppResult<()> {
    let aside = sibling(dest, "old");
    let had_previous = dest.exists();

    if had_previous {
        if aside.exists() {
            fs::remove_dir_all(&aside)?;
        }
        fs::rename(dest, &aside)
            .map_err(|e| AppError::InstallFailure(format!("Could not move {} aside: {}", dest.display(), e)))?;
    }

    if let Err(e) = fs::rename(staging, dest) {
        if had_previous {
            if let Err(restore) = fs::rename(&aside, dest) {
                log::error!("Failed to restore {}: {}", dest.display(), restore);
            }
        }
        return Err(AppError::InstallFailure(format!("Could not move new bundle into place: {}", e)));
    }

    if had_previous {
        if let Err(e) = fs::remove_dir_all(&aside) {
            log::warn!("Failed to remove previous bundle {}: {}", aside.display(), e);
        }
    }
    Ok(())
}

/// Root-owned, world-readable, no quarantine flag. Best effort.
pub async fn repair_permissions(runner: &dyn CommandRunner, app_path: &Path) {
    let path = app_path.to_string_lossy();
    let commands: [(&str, Vec<&str>); 3] = [
        ("/usr/sbin/chown", vec!["-R", "root:admin", path.as_ref()]),
        ("/bin/chmod", vec!["-R", "755", path.as_ref()]),
        ("/usr/bin/xattr", vec!["-dr", "com.apple.quarantine", path.as_ref()]),
    ];
    for (program, args) in commands {
        match runner.run(program, &args, 300).await {
            Ok(out) if !out.success => log::warn!("{} failed: {}", program, out.combined.trim()),
            Err(e) => log::warn!("{} failed: {}", program, e),
            Ok(_) => {}
        }
    }
    log::info!("Permissions repaired for {}", path);
}
