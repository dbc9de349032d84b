//! Event name patterns.
//!
//! Two flavours share one syntax:
//!
//! - a pattern containing `*` is a glob anchored to the whole name
//!   (`"order.*"` matches `"order.created"`, not `"orders.created"`)
//! - any other pattern is a literal prefix (`"persistence."` matches
//!   `"persistence.saved: Order"`)
//!
//! Matching is case-sensitive. `*` is the only special character.

const WILDCARD: char = '*';

pub fn is_wildcard(pattern: &str) -> bool {
    pattern.contains(WILDCARD)
}

/// Anchored glob match where `*` matches any run of characters (including none).
pub fn glob_matches(pattern: &str, name: &str) -> bool {
    if pattern == name {
        return true;
    }

    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    let (mut p, mut n) = (0usize, 0usize);
    // Position of the last `*` seen and the name index it was tried against.
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && pattern[p] == WILDCARD {
            backtrack = Some((p, n));
            p += 1;
        } else if p < pattern.len() && pattern[p] == name[n] {
            p += 1;
            n += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            n = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == WILDCARD)
}

/// Classification match: glob for wildcard patterns, literal prefix otherwise.
///
/// An empty pattern never matches.
pub fn pattern_matches(pattern: &str, name: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    (is_wildcard(pattern) && glob_matches(pattern, name)) || name.starts_with(pattern)
}
