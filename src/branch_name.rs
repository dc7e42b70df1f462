//! Branch naming: prompt slugs, collision suffixes, and multi-version fan-out.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Default cap on the slug derived from a prompt.
pub const DEFAULT_MAX_LENGTH: usize = 50;

/// Name used when a prompt sanitizes to nothing.
pub const DEFAULT_FALLBACK: &str = "kilo";

/// How generated branch names are shaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingOptions {
    pub max_length: usize,
    pub fallback: String,
}

impl Default for NamingOptions {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            fallback: DEFAULT_FALLBACK.to_string(),
        }
    }
}

/// Slugify free text into a branch-safe name.
///
/// Truncates to `max_length` characters, lowercases, collapses every run of
/// characters outside `[a-z0-9]` into one hyphen and trims hyphens at both
/// ends. Never longer than `max_length`; empty input yields an empty string.
pub fn sanitize_branch_name(name: &str, max_length: usize) -> String {
    let mut out = String::with_capacity(max_length.min(name.len()));
    let mut pending_hyphen = false;

    for c in name.chars().take(max_length) {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    out
}

/// Milliseconds since the Unix epoch.
pub fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

/// `<slug>-<epoch millis>`, with the default naming options.
pub fn generate_branch_name(prompt: &str) -> String {
    generate_branch_name_at(prompt, &NamingOptions::default(), epoch_millis())
}

/// `<slug>-<millis>`; the slug falls back to `options.fallback` when empty.
pub fn generate_branch_name_at(prompt: &str, options: &NamingOptions, millis: u128) -> String {
    let slug = sanitize_branch_name(prompt, options.max_length);
    let base = if slug.is_empty() {
        options.fallback.as_str()
    } else {
        slug.as_str()
    };
    format!("{base}-{millis}")
}

/// The name tried after a collision: `<branch>-<millis>`.
pub fn collision_suffixed(branch: &str, millis: u128) -> String {
    format!("{branch}-{millis}")
}

/// Directory name for a branch. Slashes would nest directories.
pub fn worktree_dir_name(branch: &str) -> String {
    branch.replace('/', "-")
}

/// Branch and display label for one member of a multi-version group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionedName {
    pub branch: Option<String>,
    pub label: Option<String>,
}

/// Fan a base name out across `total` parallel variants.
///
/// Index 0 and single-member groups keep the base name; index `i >= 1` gets
/// `_v<i+1>` on the branch and ` v<i+1>` on the label.
pub fn versioned_name(base: Option<&str>, index: usize, total: usize) -> VersionedName {
    let Some(base) = base else {
        return VersionedName {
            branch: None,
            label: None,
        };
    };

    if total <= 1 || index == 0 {
        return VersionedName {
            branch: Some(base.to_string()),
            label: Some(base.to_string()),
        };
    }

    let n = index + 1;
    VersionedName {
        branch: Some(format!("{base}_v{n}")),
        label: Some(format!("{base} v{n}")),
    }
}
