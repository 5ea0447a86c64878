//! Local filesystem backend for davrepo.
//!
//! Exposes a directory tree as a path-addressed, lockable item store:
//! - `LocalRepository`: factory binding sessions to a configured root
//! - `LocalSession`: per-login session implementing the repository operations
//! - `Config`: the clap-derived configuration surface (one required root path)

mod config;
mod repository;
mod session;

pub use config::Config;
pub use repository::LocalRepository;
pub use session::LocalSession;
