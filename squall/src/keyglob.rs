//! Glob handling shared by the remote listers and the local batch sources.

use glob::{MatchOptions, Pattern};

use crate::error::JobError;

const GLOB_CHARS: &[char] = &['*', '?', '['];

pub fn has_glob(s: &str) -> bool {
    s.contains(GLOB_CHARS)
}

/// The fixed (non-glob) head of a pattern, used as the listing prefix.
pub fn glob_prefix(key: &str) -> &str {
    match key.find(GLOB_CHARS) {
        Some(idx) => &key[..idx],
        None => key,
    }
}

/// Key matching never lets `*`/`?` cross a `/`, mirroring how listings treat
/// the delimiter.
pub fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

pub fn compile(pattern: &str) -> Result<Pattern, JobError> {
    Pattern::new(pattern)
        .map_err(|e| JobError::Failed(format!("invalid glob `{pattern}`: {e}")))
}

/// Last path segment of a key (the key itself if it has no `/`).
pub fn key_basename(key: &str) -> &str {
    key.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_stops_at_first_metacharacter() {
        assert_eq!(glob_prefix("logs/2024-*.gz"), "logs/2024-");
        assert_eq!(glob_prefix("logs/?.gz"), "logs/");
        assert_eq!(glob_prefix("plain/key"), "plain/key");
        assert_eq!(glob_prefix("*"), "");
    }

    #[test]
    fn star_does_not_cross_separator() {
        let pattern = compile("prefix/*").unwrap();
        assert!(pattern.matches_with("prefix/a.txt", match_options()));
        assert!(!pattern.matches_with("prefix/sub/a.txt", match_options()));
    }

    #[test]
    fn basename_of_keys() {
        assert_eq!(key_basename("a/b/c.txt"), "c.txt");
        assert_eq!(key_basename("c.txt"), "c.txt");
        assert_eq!(key_basename("a/b/"), "b");
    }

    #[test]
    fn glob_detection() {
        assert!(has_glob("a/*.txt"));
        assert!(has_glob("a/b[0-9]"));
        assert!(!has_glob("a/b.txt"));
    }
}
