use async_trait::async_trait;

use crate::error::RepositoryError;
use crate::item::Item;
use crate::lock::{Lock, LockAcquireResult, LockRequest};

/// Factory for repository sessions.
///
/// A protocol-adaptation layer calls [`login`](Repository::login) once per
/// client session and then issues one [`RepositorySession`] operation per
/// protocol request.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Returns the backend identifier (e.g., "local").
    fn backend_name(&self) -> &'static str;

    /// Authenticate and open a session bound to the repository root.
    ///
    /// Backends without real authentication accept any credentials; others
    /// fail with [`RepositoryError::Authorization`].
    async fn login(
        &self,
        user: &str,
        password: &str,
    ) -> Result<Box<dyn RepositorySession>, RepositoryError>;
}

/// One authenticated client session over a path-addressed item store.
///
/// All paths are absolute '/'-separated repository paths; every operation
/// normalizes its input and applies the reserved-subtree policy before any
/// existence check or backing-store access, so reserved paths always fail
/// with [`RepositoryError::PermissionDenied`] rather than not-found.
///
/// The session owns its lock tables exclusively; they are discarded when
/// the session ends.
#[async_trait]
pub trait RepositorySession: Send + Sync {
    /// Whether the backing store has an entry at `path`.
    async fn exists(&self, path: &str) -> Result<bool, RepositoryError>;

    /// Read the item at `path`, content included for leaves.
    async fn get_item(&self, path: &str) -> Result<Item, RepositoryError>;

    /// Names of the immediate children of the collection at `path`, in
    /// backing-store enumeration order.
    async fn list(&self, path: &str) -> Result<Vec<String>, RepositoryError>;

    /// Create a new collection at `path`. Single-level: missing ancestors
    /// are not created.
    async fn create_collection(&self, path: &str) -> Result<(), RepositoryError>;

    /// Create or overwrite the leaf at `path`. Fails with
    /// [`RepositoryError::ItemAlreadyExists`] when an entry is present and
    /// `overwrite` is false. The write is all-or-nothing.
    async fn save_item(
        &self,
        path: &str,
        content: &[u8],
        overwrite: bool,
    ) -> Result<(), RepositoryError>;

    /// Delete the item at `path`; collections are deleted depth-first.
    ///
    /// Locks are not consulted or cleared: a lock on a deleted path lingers
    /// until it expires or is explicitly unlocked.
    async fn delete(&self, path: &str) -> Result<(), RepositoryError>;

    /// Copy `src` to `dest`. An existing destination is deleted first when
    /// `overwrite` is set, otherwise the call fails with
    /// [`RepositoryError::ItemAlreadyExists`].
    async fn copy_item(
        &self,
        src: &str,
        dest: &str,
        overwrite: bool,
    ) -> Result<(), RepositoryError>;

    /// Move `src` to `dest` as copy-then-delete. Not atomic: a failure
    /// partway through can leave both source and partial destination data.
    async fn move_item(
        &self,
        src: &str,
        dest: &str,
        overwrite: bool,
    ) -> Result<(), RepositoryError>;

    /// Try to lock the existing item at `path`. Contention is reported in
    /// the result, not as an error.
    async fn lock(
        &self,
        path: &str,
        request: LockRequest,
    ) -> Result<LockAcquireResult, RepositoryError>;

    /// Release any lock registered at exactly `path`. A no-op when nothing
    /// is held.
    async fn unlock(&self, path: &str) -> Result<(), RepositoryError>;

    /// The most specific live lock applicable to `path`, if any.
    async fn get_lock(&self, path: &str) -> Result<Option<Lock>, RepositoryError>;
}
