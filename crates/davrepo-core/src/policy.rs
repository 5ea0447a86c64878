//! Reserved-subtree access policy.
//!
//! Two top-level names are reserved for administrative use. Every session
//! operation checks its target against this policy before any existence
//! check or backing-store access, so a reserved path is reported as denied
//! rather than absent.

use crate::error::RepositoryError;

/// Top-level names closed to clients, matched case-insensitively.
pub const RESERVED_NAMES: [&str; 2] = [".admin", ".system"];

/// Reject a normalized path that falls under a reserved subtree.
pub fn check_path(path: &str) -> Result<(), RepositoryError> {
    let first = path
        .strip_prefix('/')
        .unwrap_or(path)
        .split('/')
        .next()
        .unwrap_or("");
    if RESERVED_NAMES
        .iter()
        .any(|name| first.eq_ignore_ascii_case(name))
    {
        return Err(RepositoryError::PermissionDenied(format!(
            "{} is under a reserved subtree",
            path
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_roots_are_denied() {
        for path in ["/.admin", "/.system", "/.admin/users", "/.system/a/b"] {
            assert!(matches!(
                check_path(path),
                Err(RepositoryError::PermissionDenied(_))
            ));
        }
    }

    #[test]
    fn reserved_match_is_case_insensitive() {
        assert!(check_path("/.ADMIN/x").is_err());
        assert!(check_path("/.System").is_err());
    }

    #[test]
    fn similar_names_are_allowed() {
        assert!(check_path("/").is_ok());
        assert!(check_path("/admin").is_ok());
        assert!(check_path("/.administrator").is_ok());
        assert!(check_path("/docs/.admin").is_ok());
    }
}
