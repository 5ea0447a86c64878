use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::path::is_within;

/// Whether a lock excludes other holders or can be shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockScope {
    Exclusive,
    Shared,
}

/// Reach of a lock: the path alone, or the path and all descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockDepth {
    Item,
    Infinity,
}

/// Caller-supplied half of a lock: everything except the path, the token,
/// and the expiry, which are fixed at registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRequest {
    pub scope: LockScope,
    pub depth: LockDepth,
    /// Opaque client-supplied holder identifier.
    pub owner: String,
    pub timeout: Duration,
}

/// An active lock on a repository path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lock {
    pub path: String,
    pub scope: LockScope,
    pub depth: LockDepth,
    pub owner: String,
    /// Minted at creation; proves ownership to the protocol layer.
    pub token: String,
    /// Unix seconds. A lock past this instant is treated as absent
    /// everywhere; a zero timeout therefore yields a lock that is already
    /// expired when first observed.
    pub expires_at: i64,
}

impl Lock {
    /// Mint a lock for `path` from a request, stamping token and expiry.
    pub fn new(path: impl Into<String>, request: &LockRequest) -> Self {
        let ttl: i64 = request.timeout.as_secs().try_into().unwrap_or(i64::MAX);
        Self {
            path: path.into(),
            scope: request.scope,
            depth: request.depth,
            owner: request.owner.clone(),
            token: format!("opaquelocktoken:{}", Uuid::new_v4()),
            expires_at: chrono::Utc::now().timestamp().saturating_add(ttl),
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    /// Whether this lock applies to `path`.
    pub fn covers(&self, path: &str) -> bool {
        match self.depth {
            LockDepth::Item => self.path == path,
            LockDepth::Infinity => is_within(&self.path, path),
        }
    }
}

/// Outcome of a session-level lock acquisition.
#[derive(Debug, Clone)]
pub struct LockAcquireResult {
    pub acquired: bool,
    /// The registered lock, token included, when acquired.
    pub lock: Option<Lock>,
    /// Owner of the blocking lock, when known.
    pub current_holder: Option<String>,
}

impl LockAcquireResult {
    pub fn acquired(lock: Lock) -> Self {
        Self {
            acquired: true,
            lock: Some(lock),
            current_holder: None,
        }
    }

    pub fn held_by(existing: &Lock) -> Self {
        Self {
            acquired: false,
            lock: None,
            current_holder: Some(existing.owner.clone()),
        }
    }

    pub fn not_acquired() -> Self {
        Self {
            acquired: false,
            lock: None,
            current_holder: None,
        }
    }
}
