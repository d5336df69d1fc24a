//! Path validation and object key helpers.
//!
//! Every [`Entry`](crate::Entry) path is relative to the root of the backend
//! namespace. For container-based backends the first component names the
//! container (bucket) and the remaining components form the object key.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Separator used between object key segments, and as the suffix of
/// placeholder marker keys.
pub const SEPARATOR: char = '/';

/// Validates a storage path and returns it normalised.
///
/// Rejects paths that escape the root (`..` past the first component), paths
/// containing null bytes, platform prefixes, non-UTF-8 components and paths
/// that normalise to nothing.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use duet_storage::validate_path;
/// assert!(validate_path("bucket/photos/2024.jpg").is_ok());
/// assert!(validate_path("../etc/passwd").is_err());
/// assert_eq!(
///     validate_path("bucket//./photos/../docs/").unwrap(),
///     Path::new("bucket/docs")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    Ok(segments(path)?.into_iter().collect())
}

/// Splits a path into validated UTF-8 segments.
pub fn segments(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(path.to_path_buf());
    let mut segments: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls and are meaningless in keys.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                match s.to_str() {
                    Some(s) => segments.push(s.to_string()),
                    None => exn::bail!(invalid()),
                }
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if segments.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    if segments.is_empty() {
        exn::bail!(invalid());
    }
    Ok(segments)
}

/// Object key for a path below its container: `["bucket", "a", "b"]` gives
/// `a/b`. Returns `None` for a container-only path.
pub fn object_key(path: impl AsRef<Path>) -> Result<Option<String>> {
    let segments = segments(path)?;
    Ok(match segments.len() {
        1 => None,
        _ => Some(segments[1..].join(&SEPARATOR.to_string())),
    })
}

/// Key of the zero-length marker object that stands in for a directory.
pub fn directory_key(key: &str) -> String {
    format!("{}{SEPARATOR}", key.trim_end_matches(SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("bucket/work.txt", "bucket/work.txt")]
    #[case("a//b//c", "a/b/c")]
    #[case("a/./b/./c", "a/b/c")]
    #[case("a/b/..", "a")]
    #[case("bucket/dir///", "bucket/dir")]
    #[case("/bucket/key", "bucket/key")]
    fn test_normalisation(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(validate(input).unwrap(), Path::new(expected));
    }

    #[rstest]
    #[case("../etc/passwd")]
    #[case("a/../../b")]
    #[case("..")]
    #[case("")]
    #[case(".")]
    #[case("//")]
    #[case("a\0b")]
    fn test_rejected(#[case] input: &str) {
        let err = validate(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[test]
    fn test_object_key() {
        assert_eq!(object_key("bucket").unwrap(), None);
        assert_eq!(object_key("bucket/a").unwrap().as_deref(), Some("a"));
        assert_eq!(object_key("bucket/a/b/c.txt").unwrap().as_deref(), Some("a/b/c.txt"));
    }

    #[test]
    fn test_directory_key() {
        assert_eq!(directory_key("a/b"), "a/b/");
        assert_eq!(directory_key("a/b/"), "a/b/");
    }
}
