//! Repository identity normalization.
//!
//! Registries and node provenance spell the same repository many ways
//! (`git@github.com:o/r.git`, `https://www.github.com/o/r/tree/main`, ...).
//! [`normalize`] maps them onto one canonical key so packages can be compared
//! by identity. It is pure and idempotent.

use once_cell::sync::Lazy;
use regex::Regex;

const GITHUB_HOSTS: &[&str] = &["github.com", "www.github.com"];

/// Scheme URLs (`https://`, `ssh://git@`) and scp-style `user@host:path`.
/// Any `?query` or `#fragment` is left out of the path.
static REMOTE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:[A-Za-z][A-Za-z0-9+.\-]*://(?:[^@/]+@)?(?P<host>[^/:?#]+)(?::\d+)?/(?P<path>[^?#]*)|[^@/\s]+@(?P<scp_host>[^/:]+):(?P<scp_path>[^?#]*))(?:[?#].*)?$",
    )
    .unwrap()
});

/// Strip trailing whitespace, `/` and `.git` until none remain.
fn strip_suffixes(mut s: &str) -> &str {
    loop {
        let trimmed = s.trim_end().trim_end_matches('/');
        let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
        if trimmed == s {
            return s;
        }
        s = trimmed;
    }
}

/// Canonical identity key for a repository URL.
///
/// - `None` or blank input gives `""`.
/// - GitHub remotes under any scheme become `https://github.com/<owner>/<repo>`.
/// - Anything else is returned with surrounding whitespace, trailing `/` and
///   `.git` removed.
pub fn normalize(url: Option<&str>) -> String {
    let Some(raw) = url else {
        return String::new();
    };
    let stripped = strip_suffixes(raw.trim_start());
    if stripped.is_empty() {
        return String::new();
    }

    github_identity(stripped).unwrap_or_else(|| stripped.to_string())
}

fn github_identity(url: &str) -> Option<String> {
    let caps = REMOTE_PATTERN.captures(url)?;
    let host = caps.name("host").or_else(|| caps.name("scp_host"))?.as_str();
    if !GITHUB_HOSTS.iter().any(|h| h.eq_ignore_ascii_case(host)) {
        return None;
    }

    let path = caps.name("path").or_else(|| caps.name("scp_path"))?.as_str();
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = strip_suffixes(segments.next()?);
    if repo.is_empty() {
        return None;
    }
    Some(format!("https://github.com/{owner}/{repo}"))
}
