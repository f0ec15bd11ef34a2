//! Collection naming for ingested documents.

use std::path::Path;
use uuid::Uuid;

const MAX_COLLECTION_NAME_LEN: usize = 255;
const SUFFIX_LEN: usize = 8;

/// Lowercase the file name and replace anything outside `[a-z0-9_-]` with `_`.
pub(crate) fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .map(|ch| {
            let ch = ch.to_ascii_lowercase();
            if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

/// Sanitized file name of `path`, or `document` when it has none.
pub(crate) fn collection_stem(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(sanitize_name)
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

/// Build `{prefix}_{stem}_{suffix}` with a random 8 hex character suffix.
pub(crate) fn fresh_collection_name(prefix: &str, path: &Path) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let suffix = &suffix[..SUFFIX_LEN];
    let stem = collection_stem(path);
    let room = MAX_COLLECTION_NAME_LEN.saturating_sub(prefix.len() + SUFFIX_LEN + 2);
    let stem: String = stem.chars().take(room).collect();
    format!("{prefix}_{stem}_{suffix}")
}

/// Whether `name` is acceptable as an explicit collection name.
pub(crate) fn is_valid_collection_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_COLLECTION_NAME_LEN
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
}
