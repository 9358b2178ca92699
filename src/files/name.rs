// src/files/name.rs

//! Parsing of absolute path strings
//!
//! Paths are written `/a/b/c` (relative to the top root) or `@root/a/b/c`.
//! Empty components are ignored and `.` is skipped; `..` and relative
//! strings are rejected.

use crate::error::{Error, Result};

/// A path string split into its root and components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    /// Explicit `@root` prefix, if any
    pub root: Option<String>,
    pub components: Vec<String>,
}

/// Split an absolute path string into root and components
pub fn parse_path(path: &str) -> Result<ParsedPath> {
    let (root, rest) = if let Some(stripped) = path.strip_prefix('@') {
        let (name, rest) = match stripped.find('/') {
            Some(idx) => (&stripped[..idx], &stripped[idx..]),
            None => (stripped, ""),
        };
        if !is_valid_root_name(name) {
            return Err(Error::BadPath(format!("invalid root name in '{}'", path)));
        }
        (Some(name.to_string()), rest)
    } else if path.starts_with('/') {
        (None, path)
    } else {
        return Err(Error::BadPath(format!("path is not absolute: '{}'", path)));
    };

    let mut components = Vec::new();
    for component in rest.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                return Err(Error::BadPath(format!(
                    "parent references are not allowed: '{}'",
                    path
                )));
            }
            name => {
                validate_component(name)?;
                components.push(name.to_string());
            }
        }
    }

    Ok(ParsedPath { root, components })
}

/// Check a single path component (a base name)
pub fn validate_component(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0')
    {
        return Err(Error::BadPath(format!("invalid path component '{}'", name)));
    }
    Ok(())
}

/// Root names start with a letter and continue with letters, digits, `_` or `-`
pub fn is_valid_root_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_absolute_path() {
        let parsed = parse_path("/usr/include/stdio.h").unwrap();
        assert_eq!(parsed.root, None);
        assert_eq!(parsed.components, vec!["usr", "include", "stdio.h"]);
    }

    #[test]
    fn test_rooted_path() {
        let parsed = parse_path("@workspace/libz/inflate.c").unwrap();
        assert_eq!(parsed.root.as_deref(), Some("workspace"));
        assert_eq!(parsed.components, vec!["libz", "inflate.c"]);

        let bare = parse_path("@workspace").unwrap();
        assert_eq!(bare.root.as_deref(), Some("workspace"));
        assert!(bare.components.is_empty());
    }

    #[test]
    fn test_redundant_separators_and_dots() {
        let parsed = parse_path("//a/./b//c/").unwrap();
        assert_eq!(parsed.components, vec!["a", "b", "c"]);
        assert!(parse_path("/").unwrap().components.is_empty());
    }

    #[test]
    fn test_rejected_paths() {
        assert!(matches!(parse_path("a/b"), Err(Error::BadPath(_))));
        assert!(matches!(parse_path(""), Err(Error::BadPath(_))));
        assert!(matches!(parse_path("/a/../b"), Err(Error::BadPath(_))));
        assert!(matches!(parse_path("@/a"), Err(Error::BadPath(_))));
        assert!(matches!(parse_path("@1root/a"), Err(Error::BadPath(_))));
    }

    #[test]
    fn test_root_names() {
        assert!(is_valid_root_name("workspace"));
        assert!(is_valid_root_name("libz_src"));
        assert!(is_valid_root_name("a-1"));
        assert!(!is_valid_root_name(""));
        assert!(!is_valid_root_name("_src"));
        assert!(!is_valid_root_name("a/b"));
        assert!(!is_valid_root_name("a@b"));
    }
}
