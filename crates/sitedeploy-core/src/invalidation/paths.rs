//! Splitting invalidation paths into batches the CDN accepts.

/// Paths allowed in one invalidation request.
pub const MAX_PATHS_PER_INVALIDATION: usize = 3000;
/// Wildcard paths allowed in one invalidation request.
pub const MAX_WILDCARDS_PER_INVALIDATION: usize = 15;

pub const DEFAULT_PATH: &str = "/*";

/// Normalize `paths`: prefix `/`, drop blanks and duplicates, keep order.
/// An empty input invalidates everything.
pub fn normalize(paths: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for raw in paths {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let path = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        if seen.insert(path.clone()) {
            out.push(path);
        }
    }
    if out.is_empty() {
        out.push(DEFAULT_PATH.to_string());
    }
    out
}

/// Batch normalized paths so no batch exceeds either limit.
pub fn chunk(paths: &[String]) -> Vec<Vec<String>> {
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut wildcards = 0;

    for path in normalize(paths) {
        let is_wildcard = path.contains('*');
        let full = current.len() == MAX_PATHS_PER_INVALIDATION
            || (is_wildcard && wildcards == MAX_WILDCARDS_PER_INVALIDATION);
        if full {
            chunks.push(std::mem::take(&mut current));
            wildcards = 0;
        }
        if is_wildcard {
            wildcards += 1;
        }
        current.push(path);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
