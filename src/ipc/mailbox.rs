use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::utils::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Requests,
    Responses,
    Progress,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::Requests, Slot::Responses, Slot::Progress];

    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Requests => "requests",
            Self::Responses => "responses",
            Self::Progress => "progress",
        }
    }
}

/// Key-value store shared by the client and the daemon. Each slot holds at
/// most one entry per id; `publish` replaces atomically.
#[async_trait]
pub trait Mailbox: Send + Sync {
    async fn publish(&self, slot: Slot, id: &str, bytes: &[u8]) -> AppResult<()>;

    /// `Ok(None)` when nothing is published under `id`.
    async fn read(&self, slot: Slot, id: &str) -> AppResult<Option<Vec<u8>>>;

    /// Removing an absent entry is not an error.
    async fn remove(&self, slot: Slot, id: &str) -> AppResult<()>;

    /// Ids currently published in `slot`, sorted.
    async fn list(&self, slot: Slot) -> AppResult<Vec<String>>;

    /// Drop entries older than `ttl`; returns how many were removed.
    async fn prune(&self, slot: Slot, ttl: Duration) -> AppResult<usize>;
}

pub async fn publish_json<T: Serialize + Sync>(
    mailbox: &dyn Mailbox,
    slot: Slot,
    id: &str,
    value: &T,
) -> AppResult<()> {
    let bytes = serde_json::to_vec(value)?;
    mailbox.publish(slot, id, &bytes).await
}

pub async fn read_json<T: DeserializeOwned>(mailbox: &dyn Mailbox, slot: Slot, id: &str) -> AppResult<Option<T>> {
    match mailbox.read(slot, id).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Directory-backed mailbox: `<root>/{requests,responses,progress}/<id>.json`.
pub struct FsMailbox {
    root: PathBuf,
}

impl FsMailbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the slot directories world-writable so an unprivileged client
    /// can talk to a root daemon.
    pub fn setup(&self) -> AppResult<()> {
        let mut dirs = vec![self.root.clone()];
        dirs.extend(Slot::ALL.iter().map(|s| self.root.join(s.dir_name())));
        for dir in dirs {
            std::fs::create_dir_all(&dir)?;
            if let Err(e) = std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o777)) {
                log::warn!("Could not open up {}: {}", dir.display(), e);
            }
        }
        log::info!("Mailbox ready at {}", self.root.display());
        Ok(())
    }

    pub fn slot_dir(&self, slot: Slot) -> PathBuf {
        self.root.join(slot.dir_name())
    }

    pub fn entry_path(&self, slot: Slot, id: &str) -> AppResult<PathBuf> {
        if id.is_empty() || id.contains('/') || id.contains("..") {
            return Err(AppError::Protocol(format!("Invalid request id: {:?}", id)));
        }
        Ok(self.slot_dir(slot).join(format!("{}.json", id)))
    }
}

#[async_trait]
impl Mailbox for FsMailbox {
    async fn publish(&self, slot: Slot, id: &str, bytes: &[u8]) -> AppResult<()> {
        let path = self.entry_path(slot, id)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn read(&self, slot: Slot, id: &str) -> AppResult<Option<Vec<u8>>> {
        let path = self.entry_path(slot, id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, slot: Slot, id: &str) -> AppResult<()> {
        let path = self.entry_path(slot, id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, slot: Slot) -> AppResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(self.slot_dir(slot)).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(|n| n.strip_suffix(".json")) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn prune(&self, slot: Slot, ttl: Duration) -> AppResult<usize> {
        let now = SystemTime::now();
        let mut entries = tokio::fs::read_dir(self.slot_dir(slot)).await?;
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(m) => m,
                Err(_) => continue,
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age >= ttl && tokio::fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            log::info!("Pruned {} stale {} entries", removed, slot.dir_name());
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mailbox() -> (tempfile::TempDir, FsMailbox) {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = FsMailbox::new(dir.path().join("ipc"));
        mailbox.setup().unwrap();
        (dir, mailbox)
    }

    #[tokio::test]
    async fn setup_opens_permissions() {
        let (_dir, mailbox) = mailbox();
        for slot in Slot::ALL {
            let mode = std::fs::metadata(mailbox.slot_dir(slot)).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o777);
        }
    }

    #[tokio::test]
    async fn publish_read_remove() {
        let (_dir, mailbox) = mailbox();
        mailbox.publish(Slot::Responses, "abc", b"{}").await.unwrap();
        assert_eq!(mailbox.read(Slot::Responses, "abc").await.unwrap(), Some(b"{}".to_vec()));
        assert!(!mailbox.slot_dir(Slot::Responses).join("abc.json.tmp").exists());

        mailbox.remove(Slot::Responses, "abc").await.unwrap();
        assert_eq!(mailbox.read(Slot::Responses, "abc").await.unwrap(), None);
        mailbox.remove(Slot::Responses, "abc").await.unwrap();
    }

    #[tokio::test]
    async fn publish_replaces_existing_entry() {
        let (_dir, mailbox) = mailbox();
        mailbox.publish(Slot::Progress, "p", b"1").await.unwrap();
        mailbox.publish(Slot::Progress, "p", b"2").await.unwrap();
        assert_eq!(mailbox.read(Slot::Progress, "p").await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(mailbox.list(Slot::Progress).await.unwrap(), vec!["p".to_string()]);
    }

    #[tokio::test]
    async fn list_ignores_partial_writes() {
        let (_dir, mailbox) = mailbox();
        mailbox.publish(Slot::Requests, "b", b"{}").await.unwrap();
        mailbox.publish(Slot::Requests, "a", b"{}").await.unwrap();
        std::fs::write(mailbox.slot_dir(Slot::Requests).join("c.json.tmp"), b"{").unwrap();
        assert_eq!(mailbox.list(Slot::Requests).await.unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn prune_removes_old_entries() {
        let (_dir, mailbox) = mailbox();
        mailbox.publish(Slot::Responses, "old", b"{}").await.unwrap();
        assert_eq!(mailbox.prune(Slot::Responses, Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(mailbox.prune(Slot::Responses, Duration::ZERO).await.unwrap(), 1);
        assert!(mailbox.list(Slot::Responses).await.unwrap().is_empty());
    }

    #[test]
    fn rejects_path_like_ids() {
        let mailbox = FsMailbox::new("/tmp/x");
        assert!(mailbox.entry_path(Slot::Requests, "../etc/passwd").is_err());
        assert!(mailbox.entry_path(Slot::Requests, "").is_err());
    }
}
