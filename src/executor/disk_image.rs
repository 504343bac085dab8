use std::path::{Path, PathBuf};

use crate::utils::command::CommandRunner;
use crate::utils::{AppError, AppResult};

const HDIUTIL: &str = "/usr/bin/hdiutil";

/// What a mounted image offers to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    AppBundle(PathBuf),
    Package(PathBuf),
}

/// Attach `image` read-only at `mount_point`, hidden from Finder.
pub async fn attach(runner: &dyn CommandRunner, image: &Path, mount_point: &Path) -> AppResult<()> {
    let image = image.to_string_lossy();
    let mount = mount_point.to_string_lossy();
    let args = [
        "attach",
        image.as_ref(),
        "-mountpoint",
        mount.as_ref(),
        "-nobrowse",
        "-readonly",
        "-quiet",
        "-noautoopen",
    ];

    let output = runner.run(HDIUTIL, &args, 300).await?;
    if !output.success {
        let detail = match output.combined.trim() {
            "" => format!("hdiutil exit: {}", output.code.unwrap_or(-1)),
            text => text.to_string(),
        };
        return Err(AppError::MountFailure(detail));
    }
    log::info!("Mounted {} at {}", image, mount);
    Ok(())
}

/// Force-detach. Failures are logged only; the caller is already cleaning up.
pub async fn detach(runner: &dyn CommandRunner, mount_point: &Path) {
    let mount = mount_point.to_string_lossy();
    match runner.run(HDIUTIL, &["detach", mount.as_ref(), "-quiet", "-force"], 60).await {
        Ok(out) if out.success => log::info!("Detached {}", mount),
        Ok(out) => log::warn!("hdiutil detach {} failed: {}", mount, out.combined.trim()),
        Err(e) => log::warn!("hdiutil detach {} failed: {}", mount, e),
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case(ext))
}

/// First top-level app bundle that is not an installer or uninstaller helper,
/// otherwise the first package.
pub fn locate_payload(mount_point: &Path) -> AppResult<Payload> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(mount_point)?
        .flatten()
        .map(|e| e.path())
        .collect();
    entries.sort();
    log::info!(
        "Image contents: {:?}",
        entries
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect::<Vec<_>>()
    );

    let app = entries.iter().find(|p| {
        let name = p
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_lowercase();
        has_extension(p, "app") && !name.contains("install")
    });
    if let Some(app) = app {
        return Ok(Payload::AppBundle(app.clone()));
    }

    if let Some(pkg) = entries.iter().find(|p| has_extension(p, "pkg")) {
        return Ok(Payload::Package(pkg.clone()));
    }

    Err(AppError::NoPayloadFound(mount_point.display().to_string()))
}
