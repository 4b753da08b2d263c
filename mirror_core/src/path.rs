//! Helpers for `/`-separated mirror paths.
//!
//! Empty segments are ignored, so `"/a//b/"` and `"a/b"` name the same
//! entry. The empty path is the root of the tree.

/// Iterates over the non-empty segments of `path`.
pub fn segments(path: &str) -> impl Iterator<Item = &str> + Clone {
    path.split('/').filter(|s| !s.is_empty())
}

/// Canonical form of `path`: segments joined by a single `/`.
pub fn normalize(path: &str) -> String {
    segments(path).collect::<Vec<_>>().join("/")
}

/// Appends `name` to `base`.
pub fn join(base: &str, name: &str) -> String {
    let base = normalize(base);
    let name = normalize(name);
    match (base.is_empty(), name.is_empty()) {
        (true, _) => name,
        (_, true) => base,
        _ => format!("{base}/{name}"),
    }
}

/// Parent of `path`, or `None` for the root.
pub fn parent(path: &str) -> Option<String> {
    let parts: Vec<&str> = segments(path).collect();
    let (_, init) = parts.split_last()?;
    Some(init.join("/"))
}

/// Last segment of `path`.
pub fn file_name(path: &str) -> Option<&str> {
    segments(path).last()
}

/// Number of segments `path` lies below `root`, or `None` when `path` is
/// not inside `root`. `relative_depth("a", "a/b")` is 1.
pub fn relative_depth(root: &str, path: &str) -> Option<usize> {
    let mut inner = segments(path);
    for part in segments(root) {
        if inner.next()? != part {
            return None;
        }
    }
    Some(inner.count())
}
