use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use davrepo_core::{Repository, RepositoryError, RepositorySession};

use crate::config::Config;
use crate::session::LocalSession;

/// File-backed repository factory.
///
/// Binds every session to one preconfigured root directory. Credentials
/// are accepted unchecked; authentication belongs to backends that have it.
#[derive(Debug, Clone)]
pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    /// Bind to a backing-store root. Fails when the root is missing or not
    /// a directory, so a misconfigured deployment dies at startup rather
    /// than on the first request.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let root = root.as_ref().to_path_buf();
        let meta = std::fs::metadata(&root).map_err(|e| {
            RepositoryError::Config(format!("repository root {}: {}", root.display(), e))
        })?;
        if !meta.is_dir() {
            return Err(RepositoryError::Config(format!(
                "repository root {} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn from_config(config: &Config) -> Result<Self, RepositoryError> {
        Self::new(&config.root)
    }
}

#[async_trait]
impl Repository for LocalRepository {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn login(
        &self,
        user: &str,
        _password: &str,
    ) -> Result<Box<dyn RepositorySession>, RepositoryError> {
        debug!("opening session for {} at {}", user, self.root.display());
        Ok(Box::new(LocalSession::new(self.root.clone(), user)))
    }
}
