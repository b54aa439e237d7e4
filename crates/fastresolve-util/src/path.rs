//! Lexical path helpers.
//!
//! None of these functions touch the filesystem. Resolution works on
//! requests that are joined and normalized many times per call, so the
//! helpers stay allocation-light and never canonicalize.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Classification of a request or module-directory string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathType {
    Empty,
    /// A bare name such as `node_modules` or `lodash/fp`.
    Normal,
    /// `.`, `..`, `./x` or `../x`.
    Relative,
    /// `C:\x` or `C:/x`.
    AbsoluteWin,
    /// `/x`.
    AbsolutePosix,
    /// `#x` (package imports).
    Internal,
}

impl PathType {
    /// Whether this type denotes an absolute path on any platform.
    #[must_use]
    pub fn is_absolute(self) -> bool {
        matches!(self, Self::AbsoluteWin | Self::AbsolutePosix)
    }
}

/// Classify a request string.
#[must_use]
pub fn get_type(p: &str) -> PathType {
    let bytes = p.as_bytes();
    match bytes {
        [] => PathType::Empty,
        [b'.'] => PathType::Relative,
        [b'/', ..] => PathType::AbsolutePosix,
        [b'#', ..] => PathType::Internal,
        [b'.', b'.' | b'/'] => PathType::Relative,
        [b'.', b'/', ..] | [b'.', b'.', b'/', ..] => PathType::Relative,
        [drive, b':'] if drive.is_ascii_alphabetic() => PathType::AbsoluteWin,
        [drive, b':', b'\\' | b'/', ..] if drive.is_ascii_alphabetic() => PathType::AbsoluteWin,
        _ => PathType::Normal,
    }
}

/// Whether a request explicitly starts with `./` or `../`.
#[must_use]
pub fn is_relative_request(request: &str) -> bool {
    request.starts_with("./") || request.starts_with("../")
}

/// Lexically normalize a path, folding `.` and `..` components.
///
/// `..` never climbs above the root of an absolute path.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Join a request onto a base directory and normalize the result.
///
/// An absolute request replaces the base.
#[must_use]
pub fn join(base: &Path, request: &str) -> PathBuf {
    if get_type(request).is_absolute() {
        return normalize(Path::new(request));
    }
    normalize(&base.join(request))
}

/// Join an already-split path segment (such as a symlink target) onto a base.
#[must_use]
pub fn join_path(base: &Path, segment: &Path) -> PathBuf {
    normalize(&base.join(segment))
}

/// Join two `/`-separated relative paths (as stored in `relativePath`),
/// keeping the leading `./` that marks them as package-relative.
#[must_use]
pub fn join_relative(base: &str, request: &str) -> String {
    if request.starts_with('/') {
        return request.to_string();
    }

    let mut segments: Vec<&str> = Vec::new();
    let mut leading_parents = 0usize;
    for segment in base.split('/').chain(request.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    leading_parents += 1;
                }
            }
            other => segments.push(other),
        }
    }

    let mut out = if leading_parents == 0 {
        String::from(".")
    } else {
        vec![".."; leading_parents].join("/")
    };
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    out
}

/// Append a raw suffix (such as an extension) to the last path component.
#[must_use]
pub fn append(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// The directory above `path`, if any.
#[must_use]
pub fn cd_up(path: &Path) -> Option<&Path> {
    path.parent()
}

/// Whether `path` is `parent` or lies below it (component-wise).
#[must_use]
pub fn is_inside(path: &Path, parent: &Path) -> bool {
    path.starts_with(parent)
}

/// A path split into its ancestors and their last components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathChain {
    /// `path` followed by each ancestor up to the root.
    pub paths: Vec<PathBuf>,
    /// The last component of each entry in `paths`; the root is kept whole.
    pub segments: Vec<OsString>,
}

/// Split a path into its chain of ancestors.
///
/// `/a/b` yields paths `["/a/b", "/a", "/"]` and segments `["b", "a", "/"]`.
#[must_use]
pub fn get_paths(path: &Path) -> PathChain {
    let mut paths = Vec::new();
    let mut segments = Vec::new();
    for ancestor in path.ancestors() {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        paths.push(ancestor.to_path_buf());
        segments.push(
            ancestor
                .file_name()
                .map_or_else(|| ancestor.as_os_str().to_owned(), ToOwned::to_owned),
        );
    }
    PathChain { paths, segments }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_type() {
        assert_eq!(get_type(""), PathType::Empty);
        assert_eq!(get_type("."), PathType::Relative);
        assert_eq!(get_type(".."), PathType::Relative);
        assert_eq!(get_type("./a"), PathType::Relative);
        assert_eq!(get_type("../a"), PathType::Relative);
        assert_eq!(get_type(".a"), PathType::Normal);
        assert_eq!(get_type("...x"), PathType::Normal);
        assert_eq!(get_type("/a"), PathType::AbsolutePosix);
        assert_eq!(get_type("#a"), PathType::Internal);
        assert_eq!(get_type("C:\\a"), PathType::AbsoluteWin);
        assert_eq!(get_type("c:/a"), PathType::AbsoluteWin);
        assert_eq!(get_type("node_modules"), PathType::Normal);
        assert_eq!(get_type("1:/a"), PathType::Normal);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(normalize(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(normalize(Path::new("./")), PathBuf::from("."));
    }

    #[test]
    fn test_join_absolute_request_replaces_base() {
        assert_eq!(join(Path::new("/base"), "/other/x.js"), PathBuf::from("/other/x.js"));
        assert_eq!(join(Path::new("/base/dir"), "../x.js"), PathBuf::from("/base/x.js"));
    }

    #[test]
    fn test_join_path() {
        assert_eq!(
            join_path(Path::new("/a/b"), Path::new("../c")),
            PathBuf::from("/a/c")
        );
        assert_eq!(join_path(Path::new("/a"), Path::new("/z")), PathBuf::from("/z"));
    }

    #[test]
    fn test_join_relative() {
        assert_eq!(join_relative(".", "./foo"), "./foo");
        assert_eq!(join_relative("./src", "../lib/x"), "./lib/x");
        assert_eq!(join_relative("./", "index"), "./index");
        assert_eq!(join_relative(".", ".."), "..");
        assert_eq!(join_relative("./a", "/abs"), "/abs");
    }

    #[test]
    fn test_append() {
        assert_eq!(append(Path::new("/a/b"), ".js"), PathBuf::from("/a/b.js"));
        assert_eq!(append(Path::new("/a/b.d"), ""), PathBuf::from("/a/b.d"));
    }

    #[test]
    fn test_is_inside_is_component_wise() {
        assert!(is_inside(Path::new("/allowed/x.js"), Path::new("/allowed")));
        assert!(is_inside(Path::new("/allowed"), Path::new("/allowed")));
        assert!(!is_inside(Path::new("/allowed-not/x.js"), Path::new("/allowed")));
    }

    #[cfg(unix)]
    #[test]
    fn test_get_paths() {
        let chain = get_paths(Path::new("/a/b"));
        assert_eq!(
            chain.paths,
            vec![PathBuf::from("/a/b"), PathBuf::from("/a"), PathBuf::from("/")]
        );
        assert_eq!(
            chain.segments,
            vec![OsString::from("b"), OsString::from("a"), OsString::from("/")]
        );
    }
}
