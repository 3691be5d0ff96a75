//! Identifier canonicalization
//!
//! Canonical ids are URL-like strings (`file:///abs/path.graphql`,
//! `https://host/schema.graphql`) or opaque names that plugins own. Relative
//! references are joined lexically; the filesystem is never consulted.

use std::path::{Path, PathBuf};

/// The scheme of `id` when it has the `scheme://` form
pub fn scheme(id: &str) -> Option<&str> {
    let (scheme, _) = id.split_once("://")?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        Some(scheme)
    } else {
        None
    }
}

/// Whether `reference` is relative to the document that mentions it
pub fn is_relative(reference: &str) -> bool {
    reference.starts_with("./") || reference.starts_with("../")
}

/// Canonicalize `importee` as seen from `importer`.
///
/// `base` stands in for the importer when there is none (the root). It
/// should denote a directory, i.e. end with `/`.
pub fn resolve_reference(importee: &str, importer: Option<&str>, base: &str) -> String {
    if let Some(rest) = importee.strip_prefix("//") {
        format!("file://{rest}")
    } else if importee.starts_with('/') {
        format!("file://{importee}")
    } else if is_relative(importee) {
        join(importer.unwrap_or(base), importee)
    } else {
        importee.to_string()
    }
}

/// Join a relative reference onto the directory of `base`
pub fn join(base: &str, reference: &str) -> String {
    let (prefix, path) = split_origin(base);
    let directory = path.rfind('/').map_or("", |index| &path[..=index]);
    format!("{prefix}{}", normalize(&format!("{directory}{reference}")))
}

/// Split `scheme://authority` from the path part
fn split_origin(id: &str) -> (&str, &str) {
    let Some(scheme) = scheme(id) else {
        return ("", id);
    };
    let after_authority = scheme.len() + 3;
    match id[after_authority..].find('/') {
        Some(offset) => id.split_at(after_authority + offset),
        None => (id, "/"),
    }
}

/// Collapse `.` and `..` segments of a `/`-separated path
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            segment => segments.push(segment),
        }
    }

    let mut normalized = segments.join("/");
    if absolute {
        normalized.insert(0, '/');
    }
    if path.ends_with('/') && !segments.is_empty() {
        normalized.push('/');
    }
    normalized
}

/// Base id for a directory on disk
pub fn directory_base(dir: &Path) -> String {
    let mut text = dir.to_string_lossy().replace('\\', "/");
    if !text.ends_with('/') {
        text.push('/');
    }
    if text.starts_with('/') {
        format!("file://{text}")
    } else {
        text
    }
}

/// Filesystem path for ids the default loader reads, `None` for other schemes
pub fn file_path(id: &str) -> Option<PathBuf> {
    match scheme(id) {
        None => Some(PathBuf::from(id)),
        Some("file") => Some(PathBuf::from(&id["file://".len()..])),
        Some(_) => None,
    }
}
