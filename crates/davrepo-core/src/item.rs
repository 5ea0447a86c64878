use serde::{Deserialize, Serialize};

/// One addressable entity in a repository: a collection or a leaf.
///
/// Items are constructed on demand by reading the backing store and are
/// not cached; `content` is populated only for leaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Normalized absolute path, '/'-separated.
    pub path: String,
    pub is_collection: bool,
    pub content: Option<Vec<u8>>,
    /// Byte length; equals `content.len()` for leaves.
    pub size: u64,
    pub last_modified: chrono::DateTime<chrono::Utc>,
}

impl Item {
    /// Name of the last path segment, or `""` for the root collection.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }
}
