//! Validation for entry names, scheme settings and scheme-qualified paths
//!
//! A scheme-qualified path is `"<scheme>:" + <real path> + <internal path>`,
//! e.g. `dci:/usr/share/icons/app.dci/256/normal.png`. Nothing marks where
//! the real path ends, so [`resolve_scheme_path`] tries every boundary that
//! follows the archive suffix and checks the filesystem.

use crate::error::{DciError, Result};
use crate::header::MAX_NAME_LEN;
use crate::path;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Validate a single entry name
///
/// # Rules
/// - 1 to 62 bytes of UTF-8
/// - no `/` and no NUL
/// - not `.` or `..`
pub fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(DciError::InvalidPath(name.to_string()));
    }

    if name.contains(path::SEPARATOR) || name.contains('\0') {
        return Err(DciError::InvalidPath(name.to_string()));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(DciError::NameTooLong {
            name: name.to_string(),
            len: name.len(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Pattern for URI-style scheme names
const SCHEME_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9+.\-]*$";

/// Validate a scheme name (the part before `:`)
///
/// # Examples
///
/// ```
/// use dci_rs::validation::validate_scheme;
///
/// assert!(validate_scheme("dci").is_ok());
/// assert!(validate_scheme("my-icons").is_ok());
/// assert!(validate_scheme("1dci").is_err());
/// assert!(validate_scheme("d:ci").is_err());
/// ```
pub fn validate_scheme(scheme: &str) -> Result<()> {
    let re = Regex::new(SCHEME_PATTERN).map_err(|e| DciError::InvalidConfig(e.to_string()))?;
    if !re.is_match(scheme) {
        return Err(DciError::InvalidConfig(format!(
            "scheme '{}' must start with a letter and contain only letters, digits, '+', '-' or '.'",
            scheme
        )));
    }
    Ok(())
}

/// Validate the conventional archive file suffix (e.g. ".dci")
pub fn validate_suffix(suffix: &str) -> Result<()> {
    if suffix.is_empty() {
        return Err(DciError::InvalidConfig("suffix cannot be empty".to_string()));
    }
    if suffix.contains(path::SEPARATOR) {
        return Err(DciError::InvalidConfig(format!(
            "suffix '{}' cannot contain '{}'",
            suffix,
            path::SEPARATOR
        )));
    }
    Ok(())
}

/// Strip `"<scheme>:"` from a path
///
/// Returns `None` when the path is not qualified with `scheme`.
pub fn split_scheme<'a>(path: &'a str, scheme: &str) -> Option<&'a str> {
    path.strip_prefix(scheme)?.strip_prefix(':')
}

/// Existence condition a resolved backing file must meet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolve {
    /// The backing file must already exist
    Existing,
    /// The backing file may be created: it exists as a file or nothing is there
    Create,
}

/// A scheme-qualified path split into its two halves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemePath {
    /// Real path of the backing archive file
    pub real: PathBuf,
    /// Normalized internal path, always `/`-rooted
    pub internal: String,
}

/// Split a scheme-qualified path into backing file and internal path
///
/// Candidate boundaries sit right after each occurrence of `suffix` that is
/// followed by a separator or ends the string. The first candidate that
/// satisfies `mode` wins; `None` if no candidate does.
///
/// # Examples
///
/// ```no_run
/// use dci_rs::validation::{resolve_scheme_path, Resolve};
///
/// let resolved = resolve_scheme_path("dci:/tmp/app.dci/icons/a.png", "dci", ".dci", Resolve::Existing);
/// if let Some(p) = resolved {
///     assert_eq!(p.internal, "/icons/a.png");
/// }
/// ```
pub fn resolve_scheme_path(
    qualified: &str,
    scheme: &str,
    suffix: &str,
    mode: Resolve,
) -> Option<SchemePath> {
    resolve_scheme_path_with(qualified, scheme, suffix, mode, |_| false)
}

/// Like [`resolve_scheme_path`], also accepting candidates that `is_live`
/// reports as backed by an in-memory archive
///
/// A live archive may not have been flushed yet, so its backing file can be
/// missing from disk while sessions already hold entries in it.
pub fn resolve_scheme_path_with<F>(
    qualified: &str,
    scheme: &str,
    suffix: &str,
    mode: Resolve,
    is_live: F,
) -> Option<SchemePath>
where
    F: Fn(&Path) -> bool,
{
    let rest = split_scheme(qualified, scheme)?;
    if suffix.is_empty() {
        return None;
    }

    for (idx, _) in rest.match_indices(suffix) {
        let boundary = idx + suffix.len();
        let (real, internal) = rest.split_at(boundary);

        let internal = if internal.is_empty() {
            path::ROOT.to_string()
        } else if internal.starts_with(path::SEPARATOR) {
            match path::normalize(internal) {
                Ok(normalized) => normalized,
                Err(_) => continue,
            }
        } else {
            continue;
        };

        let candidate = Path::new(real);
        let accepted = is_live(candidate)
            || match mode {
                Resolve::Existing => candidate.is_file(),
                Resolve::Create => candidate.is_file() || !candidate.exists(),
            };

        if accepted {
            return Some(SchemePath {
                real: candidate.to_path_buf(),
                internal,
            });
        }
    }

    None
}
