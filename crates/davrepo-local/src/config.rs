use std::path::PathBuf;

use clap::Parser;

/// Configuration for a file-backed repository.
///
/// The root path is the single required value; parsing fails without it,
/// before any session can be opened.
#[derive(Parser, Debug, Clone)]
#[command(name = "davrepo-local")]
#[command(about = "File-backed repository session layer")]
pub struct Config {
    /// Directory exposed as the repository root.
    #[arg(long, env = "DAVREPO_ROOT")]
    pub root: PathBuf,
}
