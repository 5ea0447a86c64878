use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, instrument, warn};

use davrepo_core::{
    check_path, is_within, join, normalize, Item, Lock, LockAcquireResult, LockRequest, LockScope,
    LockTable, RepositoryError, RepositorySession,
};

/// One authenticated session over a directory tree.
///
/// Repository paths map directly under the session root; the lock tables
/// are owned by the session and die with it.
#[derive(Debug)]
pub struct LocalSession {
    root: PathBuf,
    user: String,
    locks: LockTable,
}

impl LocalSession {
    pub fn new(root: impl Into<PathBuf>, user: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            user: user.into(),
            locks: LockTable::new(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Backing-store location of a normalized repository path.
    fn fs_path(&self, normalized: &str) -> PathBuf {
        self.root.join(normalized.trim_start_matches('/'))
    }

    async fn stat(&self, path: &Path) -> Result<Option<std::fs::Metadata>, RepositoryError> {
        match fs::metadata(path).await {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RepositoryError::Io(format!(
                "failed to stat {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Immediate child names in enumeration order, unsorted.
    async fn child_names(&self, dir: &Path) -> Result<Vec<String>, RepositoryError> {
        let mut entries = fs::read_dir(dir).await.map_err(|e| {
            RepositoryError::Io(format!("failed to read dir {}: {}", dir.display(), e))
        })?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RepositoryError::Io(format!("failed to read dir entry: {}", e)))?
        {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        Ok(names)
    }

    /// Write a leaf atomically via temp file + rename. A missing parent
    /// collection surfaces as `ItemNotFound`; everything else is `Io`.
    async fn write_leaf(&self, path: &str, content: &[u8]) -> Result<(), RepositoryError> {
        let fs_path = self.fs_path(path);
        let name = match fs_path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => {
                return Err(RepositoryError::InvalidPath(
                    "cannot write to the repository root".to_string(),
                ))
            }
        };
        let temp_path = fs_path.with_file_name(format!("{}.tmp", name));

        if let Err(e) = fs::write(&temp_path, content).await {
            return Err(match e.kind() {
                ErrorKind::NotFound => {
                    RepositoryError::ItemNotFound(format!("parent collection of {}", path))
                }
                _ => RepositoryError::Io(format!("failed to write {}: {}", path, e)),
            });
        }

        if let Err(e) = fs::rename(&temp_path, &fs_path).await {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                warn!(
                    "failed to remove temp file {}: {}",
                    temp_path.display(),
                    cleanup
                );
            }
            return Err(RepositoryError::Io(format!(
                "failed to finalize {}: {}",
                path, e
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RepositorySession for LocalSession {
    #[instrument(skip(self), level = "debug")]
    async fn exists(&self, path: &str) -> Result<bool, RepositoryError> {
        let path = normalize(path)?;
        check_path(&path)?;
        Ok(self.stat(&self.fs_path(&path)).await?.is_some())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_item(&self, path: &str) -> Result<Item, RepositoryError> {
        let path = normalize(path)?;
        check_path(&path)?;

        let fs_path = self.fs_path(&path);
        let Some(meta) = self.stat(&fs_path).await? else {
            return Err(RepositoryError::ItemNotFound(path));
        };

        let is_collection = meta.is_dir();
        let content = if is_collection {
            None
        } else {
            Some(fs::read(&fs_path).await.map_err(|e| {
                RepositoryError::Io(format!("failed to read {}: {}", path, e))
            })?)
        };
        let size = content.as_ref().map(|c| c.len() as u64).unwrap_or(0);
        let last_modified = meta
            .modified()
            .map(chrono::DateTime::from)
            .unwrap_or_else(|_| chrono::Utc::now());

        debug!("loaded {} ({} bytes)", path, size);
        Ok(Item {
            path,
            is_collection,
            content,
            size,
            last_modified,
        })
    }

    #[instrument(skip(self), level = "debug")]
    async fn list(&self, path: &str) -> Result<Vec<String>, RepositoryError> {
        let path = normalize(path)?;
        check_path(&path)?;

        let fs_path = self.fs_path(&path);
        if self.stat(&fs_path).await?.is_none() {
            return Err(RepositoryError::ItemNotFound(path));
        }
        let names = self.child_names(&fs_path).await?;
        debug!("listed {} children of {}", names.len(), path);
        Ok(names)
    }

    #[instrument(skip(self), level = "debug")]
    async fn create_collection(&self, path: &str) -> Result<(), RepositoryError> {
        let path = normalize(path)?;
        check_path(&path)?;

        let fs_path = self.fs_path(&path);
        if self.stat(&fs_path).await?.is_some() {
            return Err(RepositoryError::ItemAlreadyExists(path));
        }

        // Single-level mkdir: missing ancestors are the caller's problem.
        fs::create_dir(&fs_path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                RepositoryError::ItemNotFound(format!("parent collection of {}", path))
            }
            ErrorKind::AlreadyExists => RepositoryError::ItemAlreadyExists(path.clone()),
            _ => RepositoryError::Io(format!("failed to create {}: {}", path, e)),
        })?;

        debug!("created collection {}", path);
        Ok(())
    }

    #[instrument(skip(self, content), level = "debug", fields(content_len = content.len()))]
    async fn save_item(
        &self,
        path: &str,
        content: &[u8],
        overwrite: bool,
    ) -> Result<(), RepositoryError> {
        let path = normalize(path)?;
        check_path(&path)?;

        if self.stat(&self.fs_path(&path)).await?.is_some() && !overwrite {
            return Err(RepositoryError::ItemAlreadyExists(path));
        }

        self.write_leaf(&path, content).await?;
        debug!("saved {} ({} bytes)", path, content.len());
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, path: &str) -> Result<(), RepositoryError> {
        let path = normalize(path)?;
        check_path(&path)?;

        let fs_path = self.fs_path(&path);
        let Some(meta) = self.stat(&fs_path).await? else {
            return Err(RepositoryError::ItemNotFound(path));
        };

        if !meta.is_dir() {
            fs::remove_file(&fs_path)
                .await
                .map_err(|e| RepositoryError::Io(format!("failed to delete {}: {}", path, e)))?;
            debug!("deleted leaf {}", path);
            return Ok(());
        }

        // Depth-first worklist: leaves go as encountered, collections only
        // after all their children. The first error aborts the remaining
        // traversal. Locks are left alone; one held on a deleted path
        // lingers until it expires or is unlocked.
        let mut stack = vec![path.clone()];
        let mut collections = Vec::new();
        while let Some(current) = stack.pop() {
            let fs_current = self.fs_path(&current);
            for name in self.child_names(&fs_current).await? {
                let child = join(&current, &name);
                let fs_child = self.fs_path(&child);
                let Some(child_meta) = self.stat(&fs_child).await? else {
                    return Err(RepositoryError::ItemNotFound(child));
                };
                if child_meta.is_dir() {
                    stack.push(child);
                } else {
                    fs::remove_file(&fs_child).await.map_err(|e| {
                        RepositoryError::Io(format!("failed to delete {}: {}", child, e))
                    })?;
                }
            }
            collections.push(current);
        }
        for collection in collections.iter().rev() {
            fs::remove_dir(self.fs_path(collection)).await.map_err(|e| {
                RepositoryError::Io(format!("failed to delete {}: {}", collection, e))
            })?;
        }

        debug!("deleted collection {}", path);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn copy_item(
        &self,
        src: &str,
        dest: &str,
        overwrite: bool,
    ) -> Result<(), RepositoryError> {
        let src = normalize(src)?;
        let dest = normalize(dest)?;
        check_path(&src)?;
        check_path(&dest)?;

        // A collection copied into its own subtree would never terminate.
        if is_within(&src, &dest) {
            return Err(RepositoryError::InvalidPath(format!(
                "cannot copy {} into itself",
                src
            )));
        }

        if self.stat(&self.fs_path(&src)).await?.is_none() {
            return Err(RepositoryError::ItemNotFound(src));
        }
        if self.stat(&self.fs_path(&dest)).await?.is_some() {
            if overwrite {
                self.delete(&dest).await?;
            } else {
                return Err(RepositoryError::ItemAlreadyExists(dest));
            }
        }

        let mut work = vec![(src.clone(), dest.clone())];
        while let Some((from, to)) = work.pop() {
            let fs_from = self.fs_path(&from);
            let Some(meta) = self.stat(&fs_from).await? else {
                return Err(RepositoryError::ItemNotFound(from));
            };

            if meta.is_dir() {
                let fs_to = self.fs_path(&to);
                fs::create_dir(&fs_to).await.map_err(|e| match e.kind() {
                    ErrorKind::NotFound => {
                        RepositoryError::ItemNotFound(format!("parent collection of {}", to))
                    }
                    _ => RepositoryError::Io(format!("failed to create {}: {}", to, e)),
                })?;
                for name in self.child_names(&fs_from).await? {
                    work.push((join(&from, &name), join(&to, &name)));
                }
            } else {
                let content = fs::read(&fs_from).await.map_err(|e| {
                    RepositoryError::Io(format!("failed to read {}: {}", from, e))
                })?;
                self.write_leaf(&to, &content).await?;
            }
        }

        debug!("copied {} to {}", src, dest);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn move_item(
        &self,
        src: &str,
        dest: &str,
        overwrite: bool,
    ) -> Result<(), RepositoryError> {
        // Copy-then-delete, not atomic: a failure partway through leaves
        // the source and any partial destination in place.
        self.copy_item(src, dest, overwrite).await?;
        self.delete(src).await?;
        debug!("moved {} to {}", src, dest);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn lock(
        &self,
        path: &str,
        request: LockRequest,
    ) -> Result<LockAcquireResult, RepositoryError> {
        let path = normalize(path)?;
        check_path(&path)?;

        if self.stat(&self.fs_path(&path)).await?.is_none() {
            return Err(RepositoryError::ItemNotFound(path));
        }

        // Subtree compatibility: an enclosing or exact lock blocks the
        // request unless both sides are shared. The table's exact-path and
        // descendant checks handle the rest.
        if let Some(held) = self.locks.get_lock(&path) {
            if held.scope == LockScope::Exclusive || request.scope == LockScope::Exclusive {
                debug!("lock on {} refused, covered by lock on {}", path, held.path);
                return Ok(LockAcquireResult::held_by(&held));
            }
        }

        let lock = Lock::new(path.clone(), &request);
        if self.locks.try_lock(lock.clone()) {
            debug!("locked {} for {}", path, lock.owner);
            Ok(LockAcquireResult::acquired(lock))
        } else {
            debug!("lock on {} refused", path);
            Ok(LockAcquireResult::not_acquired())
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn unlock(&self, path: &str) -> Result<(), RepositoryError> {
        let path = normalize(path)?;
        check_path(&path)?;
        self.locks.unlock(&path);
        debug!("unlocked {}", path);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_lock(&self, path: &str) -> Result<Option<Lock>, RepositoryError> {
        let path = normalize(path)?;
        check_path(&path)?;
        Ok(self.locks.get_lock(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use davrepo_core::LockDepth;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup() -> (LocalSession, TempDir) {
        let temp = TempDir::new().unwrap();
        let session = LocalSession::new(temp.path(), "tester");
        (session, temp)
    }

    fn request(scope: LockScope, depth: LockDepth) -> LockRequest {
        LockRequest {
            scope,
            depth,
            owner: "client-1".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn leaf_roundtrip() {
        let (session, _temp) = setup();

        assert!(!session.exists("/note.txt").await.unwrap());
        session.save_item("/note.txt", b"hello", false).await.unwrap();
        assert!(session.exists("/note.txt").await.unwrap());

        let item = session.get_item("/note.txt").await.unwrap();
        assert!(!item.is_collection);
        assert_eq!(item.content.as_deref(), Some(b"hello".as_slice()));
        assert_eq!(item.size, 5);
        assert_eq!(item.name(), "note.txt");
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let (session, _temp) = setup();
        assert!(matches!(
            session.get_item("/missing").await,
            Err(RepositoryError::ItemNotFound(_))
        ));
        assert!(matches!(
            session.list("/missing").await,
            Err(RepositoryError::ItemNotFound(_))
        ));
        assert!(matches!(
            session.delete("/missing").await,
            Err(RepositoryError::ItemNotFound(_))
        ));
    }

    #[tokio::test]
    async fn reserved_path_is_denied_before_existence() {
        let (session, _temp) = setup();
        // Nothing exists under /.admin, yet the failure is denial.
        assert!(matches!(
            session.get_item("/.admin/users").await,
            Err(RepositoryError::PermissionDenied(_))
        ));
        assert!(matches!(
            session.exists("/.SYSTEM").await,
            Err(RepositoryError::PermissionDenied(_))
        ));
        assert!(matches!(
            session.save_item("/.admin/x", b"x", true).await,
            Err(RepositoryError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let (session, _temp) = setup();
        assert!(matches!(
            session.get_item("/a/../../etc/passwd").await,
            Err(RepositoryError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn collections_list_in_enumeration_order() {
        let (session, _temp) = setup();
        session.create_collection("/docs").await.unwrap();
        session.create_collection("/docs/sub").await.unwrap();
        session.save_item("/docs/a.txt", b"a", false).await.unwrap();

        let mut names = session.list("/docs").await.unwrap();
        names.sort();
        assert_eq!(names, ["a.txt", "sub"]);

        let root_item = session.get_item("/docs").await.unwrap();
        assert!(root_item.is_collection);
        assert!(root_item.content.is_none());
    }

    #[tokio::test]
    async fn create_collection_is_single_level() {
        let (session, _temp) = setup();
        assert!(matches!(
            session.create_collection("/a/b/c").await,
            Err(RepositoryError::ItemNotFound(_))
        ));

        session.create_collection("/a").await.unwrap();
        assert!(matches!(
            session.create_collection("/a").await,
            Err(RepositoryError::ItemAlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn save_respects_overwrite_flag() {
        let (session, _temp) = setup();
        session.save_item("/f.txt", b"one", false).await.unwrap();

        assert!(matches!(
            session.save_item("/f.txt", b"two", false).await,
            Err(RepositoryError::ItemAlreadyExists(_))
        ));
        let unchanged = session.get_item("/f.txt").await.unwrap();
        assert_eq!(unchanged.content.as_deref(), Some(b"one".as_slice()));

        session.save_item("/f.txt", b"two", true).await.unwrap();
        let replaced = session.get_item("/f.txt").await.unwrap();
        assert_eq!(replaced.content.as_deref(), Some(b"two".as_slice()));
    }

    #[tokio::test]
    async fn save_requires_parent_collection() {
        let (session, _temp) = setup();
        assert!(matches!(
            session.save_item("/no-dir/f.txt", b"x", false).await,
            Err(RepositoryError::ItemNotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_is_recursive() {
        let (session, _temp) = setup();
        session.create_collection("/a").await.unwrap();
        session.create_collection("/a/b").await.unwrap();
        session.save_item("/a/b/deep.txt", b"x", false).await.unwrap();
        session.save_item("/a/top.txt", b"y", false).await.unwrap();

        session.delete("/a").await.unwrap();
        assert!(!session.exists("/a").await.unwrap());
    }

    #[tokio::test]
    async fn copy_refuses_existing_destination() {
        let (session, _temp) = setup();
        session.save_item("/src.txt", b"new", false).await.unwrap();
        session.save_item("/dest.txt", b"old", false).await.unwrap();

        assert!(matches!(
            session.copy_item("/src.txt", "/dest.txt", false).await,
            Err(RepositoryError::ItemAlreadyExists(_))
        ));
        let untouched = session.get_item("/dest.txt").await.unwrap();
        assert_eq!(untouched.content.as_deref(), Some(b"old".as_slice()));
    }

    #[tokio::test]
    async fn copy_into_own_subtree_is_rejected() {
        let (session, _temp) = setup();
        session.create_collection("/a").await.unwrap();
        assert!(matches!(
            session.copy_item("/a", "/a/b", false).await,
            Err(RepositoryError::InvalidPath(_))
        ));
        assert!(matches!(
            session.copy_item("/a", "/a", true).await,
            Err(RepositoryError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn lock_requires_existing_item() {
        let (session, _temp) = setup();
        assert!(matches!(
            session
                .lock("/missing", request(LockScope::Exclusive, LockDepth::Item))
                .await,
            Err(RepositoryError::ItemNotFound(_))
        ));
    }

    #[tokio::test]
    async fn lock_unlock_cycle() {
        let (session, _temp) = setup();
        session.save_item("/f.txt", b"x", false).await.unwrap();

        let first = session
            .lock("/f.txt", request(LockScope::Exclusive, LockDepth::Item))
            .await
            .unwrap();
        assert!(first.acquired);
        let token = first.lock.unwrap().token;
        assert!(token.starts_with("opaquelocktoken:"));

        // Relocking the same path always fails, whatever the request.
        let second = session
            .lock("/f.txt", request(LockScope::Shared, LockDepth::Item))
            .await
            .unwrap();
        assert!(!second.acquired);
        assert_eq!(second.current_holder.as_deref(), Some("client-1"));

        session.unlock("/f.txt").await.unwrap();
        assert!(session.get_lock("/f.txt").await.unwrap().is_none());

        let third = session
            .lock("/f.txt", request(LockScope::Exclusive, LockDepth::Item))
            .await
            .unwrap();
        assert!(third.acquired);
    }

    #[tokio::test]
    async fn exclusive_subtree_lock_blocks_child_locks() {
        let (session, _temp) = setup();
        session.create_collection("/a").await.unwrap();
        session.save_item("/a/b.txt", b"x", false).await.unwrap();

        let subtree = session
            .lock("/a", request(LockScope::Exclusive, LockDepth::Infinity))
            .await
            .unwrap();
        assert!(subtree.acquired);

        let child = session
            .lock("/a/b.txt", request(LockScope::Shared, LockDepth::Item))
            .await
            .unwrap();
        assert!(!child.acquired);
        assert_eq!(child.current_holder.as_deref(), Some("client-1"));
    }

    #[tokio::test]
    async fn shared_subtree_lock_admits_shared_child_locks() {
        let (session, _temp) = setup();
        session.create_collection("/a").await.unwrap();
        session.save_item("/a/b.txt", b"x", false).await.unwrap();

        assert!(session
            .lock("/a", request(LockScope::Shared, LockDepth::Infinity))
            .await
            .unwrap()
            .acquired);
        assert!(session
            .lock("/a/b.txt", request(LockScope::Shared, LockDepth::Item))
            .await
            .unwrap()
            .acquired);
        assert!(!session
            .lock("/a/b.txt", request(LockScope::Exclusive, LockDepth::Item))
            .await
            .unwrap()
            .acquired);
    }

    #[tokio::test]
    async fn delete_leaves_lock_orphaned() {
        let (session, _temp) = setup();
        session.save_item("/f.txt", b"x", false).await.unwrap();
        assert!(session
            .lock("/f.txt", request(LockScope::Exclusive, LockDepth::Item))
            .await
            .unwrap()
            .acquired);

        session.delete("/f.txt").await.unwrap();

        // Deletion does not clear locks; the entry stays until unlocked
        // or expired.
        assert!(session.get_lock("/f.txt").await.unwrap().is_some());
        session.unlock("/f.txt").await.unwrap();
        assert!(session.get_lock("/f.txt").await.unwrap().is_none());
    }
}
