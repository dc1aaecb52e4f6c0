//! Wildcard expansion.
//!
//! The evaluator only knows that a wildcard expands to a list of names; how
//! the names are found is up to a [`Globber`]. [`FsGlobber`] matches against
//! the local filesystem with the `glob` crate.

use glob::MatchOptions;

use crate::interpreter::ErrorCause;

/// Expands one wildcard pattern.
pub trait Globber: Send + Sync {
    /// Every match, sorted. An empty result is not an error here; the
    /// evaluator decides whether zero matches is allowed.
    fn glob(&self, pattern: &str) -> Result<Vec<String>, ErrorCause>;
}

/// Matches against the local filesystem. Hidden files only match when the
/// pattern spells out the leading dot.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsGlobber;

impl Globber for FsGlobber {
    fn glob(&self, pattern: &str) -> Result<Vec<String>, ErrorCause> {
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: true,
        };
        let paths = glob::glob_with(pattern, options)
            .map_err(|e| ErrorCause::Type(format!("bad wildcard {pattern}: {}", e.msg)))?;

        // Unreadable directories are skipped.
        let mut matches: Vec<String> = paths
            .filter_map(Result::ok)
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        matches.sort();
        Ok(matches)
    }
}
