//! Internal path helpers
//!
//! Internal paths are absolute, `/`-separated and never end with a separator
//! (except the root itself, `"/"`).

use crate::error::{DciError, Result};

pub const SEPARATOR: char = '/';
pub const ROOT: &str = "/";

/// Normalize an internal path
///
/// Collapses repeated separators and drops a trailing one. Relative paths and
/// `.`/`..` segments are rejected.
pub fn normalize(path: &str) -> Result<String> {
    if !path.starts_with(SEPARATOR) {
        return Err(DciError::InvalidPath(path.to_string()));
    }

    let mut out = String::with_capacity(path.len());
    for segment in path.split(SEPARATOR).filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return Err(DciError::InvalidPath(path.to_string()));
        }
        out.push(SEPARATOR);
        out.push_str(segment);
    }

    if out.is_empty() {
        out.push(SEPARATOR);
    }
    Ok(out)
}

/// Parent of a normalized path; `None` for the root
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind(SEPARATOR) {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of a normalized path; empty for the root
pub fn file_name(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Join a directory path and a child name
pub fn join(dir: &str, name: &str) -> String {
    if dir.ends_with(SEPARATOR) {
        format!("{}{}", dir, name)
    } else {
        format!("{}{}{}", dir, SEPARATOR, name)
    }
}

/// True if `path` lies strictly below `ancestor`
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    if ancestor == ROOT {
        return path != ROOT;
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == SEPARATOR as u8
}

/// Resolve the text of a symlink stored at `link_path`
///
/// Absolute targets are returned unchanged. Relative targets are resolved
/// against the directory holding the link by consuming leading `./` and
/// `../` segments; the rest of the text is appended as is.
pub fn resolve_link(link_path: &str, target: &str) -> Result<String> {
    if target.starts_with(SEPARATOR) {
        return Ok(target.to_string());
    }

    let escapes = || DciError::SymlinkEscapesRoot {
        link: link_path.to_string(),
        target: target.to_string(),
    };

    let mut base = parent(link_path).ok_or_else(escapes)?;
    let mut rest = target;

    loop {
        if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix("../") {
            base = parent(base).ok_or_else(escapes)?;
            rest = stripped;
        } else if rest == "." {
            rest = "";
        } else if rest == ".." {
            base = parent(base).ok_or_else(escapes)?;
            rest = "";
        } else {
            break;
        }
    }

    if rest.is_empty() {
        Ok(base.to_string())
    } else {
        Ok(join(base, rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/").unwrap(), "/");
        assert_eq!(normalize("/a/b").unwrap(), "/a/b");
        assert_eq!(normalize("//a///b/").unwrap(), "/a/b");
        assert!(normalize("a/b").is_err());
        assert!(normalize("").is_err());
        assert!(normalize("/a/../b").is_err());
        assert!(normalize("/a/./b").is_err());
    }

    #[test]
    fn test_parent_and_name() {
        assert_eq!(parent("/"), None);
        assert_eq!(parent("/a"), Some("/"));
        assert_eq!(parent("/a/b.txt"), Some("/a"));
        assert_eq!(file_name("/a/b.txt"), "b.txt");
        assert_eq!(file_name("/"), "");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
    }

    #[test]
    fn test_is_descendant() {
        assert!(is_descendant("/a/b", "/a"));
        assert!(is_descendant("/a", "/"));
        assert!(!is_descendant("/a", "/a"));
        assert!(!is_descendant("/ab", "/a"));
        assert!(!is_descendant("/", "/"));
    }

    #[test]
    fn test_resolve_absolute_link() {
        assert_eq!(resolve_link("/c.lnk", "/b.txt").unwrap(), "/b.txt");
    }

    #[test]
    fn test_resolve_relative_link() {
        assert_eq!(resolve_link("/dir/c.lnk", "../x.txt").unwrap(), "/x.txt");
        assert_eq!(resolve_link("/dir/c.lnk", "./x.txt").unwrap(), "/dir/x.txt");
        assert_eq!(resolve_link("/dir/c.lnk", "x.txt").unwrap(), "/dir/x.txt");
        assert_eq!(
            resolve_link("/a/b/c.lnk", "./.././../y/z").unwrap(),
            "/y/z"
        );
        assert_eq!(resolve_link("/a/b/c.lnk", "..").unwrap(), "/a");
    }

    #[test]
    fn test_resolve_link_past_root() {
        assert!(matches!(
            resolve_link("/c.lnk", "../x.txt"),
            Err(DciError::SymlinkEscapesRoot { .. })
        ));
        assert!(matches!(
            resolve_link("/d/c.lnk", "../../x.txt"),
            Err(DciError::SymlinkEscapesRoot { .. })
        ));
    }
}
