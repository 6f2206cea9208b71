//! Short, log-safe hints for key material

/// Leading characters kept by `key_hint`.
const HINT_LEN: usize = 8;

/// Render a key as its first eight characters followed by `...`.
///
/// Counts characters, not bytes. Keys shorter than the hint are shown whole.
pub fn key_hint(key: &str) -> String {
    let prefix: String = key.chars().take(HINT_LEN).collect();
    format!("{prefix}...")
}
