//! Route template matching.
//!
//! # Responsibilities
//! - Match request paths against route templates
//! - Extract `:param` bindings and wildcard remainders
//! - Derive the coarse pattern-group key used by the registry index
//!
//! # Design Decisions
//! - Purely structural and stateless; identical inputs always match
//!   identically (cache-key derivation depends on this)
//! - `:name` template segments match exactly one path segment
//! - A trailing `*` matches any remainder, including an empty one
//! - No regex to guarantee O(n) matching

use std::collections::HashMap;

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Normalize a route template into its pattern-group key: every `:param`
/// segment collapses to `*` so templates that differ only in parameter
/// names index into the same group.
pub fn pattern_group(template: &str) -> String {
    let parts: Vec<&str> = segments(template)
        .into_iter()
        .map(|s| if s.starts_with(':') { "*" } else { s })
        .collect();
    format!("/{}", parts.join("/"))
}

/// Coarse pre-filter: does `path` fall into the pattern group `group_key`?
/// Group keys contain only literal segments and `*` (one segment each),
/// with an optional trailing `*` covering the rest of the path.
pub fn matches_pattern(path: &str, group_key: &str) -> bool {
    let path_segs = segments(path);
    let key_segs = segments(group_key);

    if key_segs.last() == Some(&"*") {
        let prefix = &key_segs[..key_segs.len() - 1];
        if path_segs.len() < prefix.len() {
            return false;
        }
        return prefix
            .iter()
            .zip(path_segs.iter())
            .all(|(k, p)| *k == "*" || k == p);
    }

    if path_segs.len() != key_segs.len() {
        return false;
    }
    key_segs
        .iter()
        .zip(path_segs.iter())
        .all(|(k, p)| *k == "*" || k == p)
}

/// Exact template match: `:param` segments match any single segment, a
/// trailing `*` matches any remainder, literals must match exactly.
pub fn matches_path(path: &str, template: &str) -> bool {
    let path_segs = segments(path);
    let tmpl_segs = segments(template);

    if tmpl_segs.last() == Some(&"*") {
        let prefix = &tmpl_segs[..tmpl_segs.len() - 1];
        if path_segs.len() < prefix.len() {
            return false;
        }
        return prefix
            .iter()
            .zip(path_segs.iter())
            .all(|(t, p)| t.starts_with(':') || t == p);
    }

    if path_segs.len() != tmpl_segs.len() {
        return false;
    }
    tmpl_segs
        .iter()
        .zip(path_segs.iter())
        .all(|(t, p)| t.starts_with(':') || t == p)
}

/// Collect `:name → value` bindings by walking both segment lists in
/// lockstep. Assumes `matches_path` already succeeded.
pub fn extract_path_params(path: &str, template: &str) -> HashMap<String, String> {
    let path_segs = segments(path);
    let tmpl_segs = segments(template);

    tmpl_segs
        .iter()
        .zip(path_segs.iter())
        .filter(|(t, _)| t.starts_with(':'))
        .map(|(t, p)| (t[1..].to_string(), p.to_string()))
        .collect()
}

/// The path suffix covered by a trailing `*`, joined with `/`. Returns
/// `None` for templates without a trailing wildcard.
pub fn wildcard_remainder(path: &str, template: &str) -> Option<String> {
    let tmpl_segs = segments(template);
    if tmpl_segs.last() != Some(&"*") {
        return None;
    }
    let prefix_len = tmpl_segs.len() - 1;
    let path_segs = segments(path);
    Some(path_segs[prefix_len.min(path_segs.len())..].join("/"))
}
