//! URI/path utilities (component A).
//!
//! A [`Uri`] is a canonicalised `file:` (or, for library files, `git:`)
//! identifier. Conversions to and from native filesystem paths are total for
//! `file:` URIs: [`path_to_uri`] always succeeds for an absolute path, and
//! [`uri_to_path`] always succeeds for a `file:` scheme URI.

use std::fmt;
use std::path::{Path, PathBuf};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::{CoreError, CoreResult};

/// Percent-encode everything except the set the specification carves out:
/// `A-Z a-z 0-9 - _ . ~ / :`.
const URI_SAFE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// A canonical file identifier.
///
/// Equality and hashing are byte-exact over the normalised string form:
/// lower-case scheme, no trailing slash except for the root, percent-encoded
/// path segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uri(String);

impl Uri {
    /// Wraps an already-normalised string. Used internally and by tests that
    /// construct URIs directly; prefer [`path_to_uri`] for native paths.
    pub fn from_normalized(s: impl Into<String>) -> Self {
        Uri(normalize(&s.into()))
    }

    /// Parses an arbitrary URI string, normalising it.
    pub fn parse(s: &str) -> CoreResult<Self> {
        if s.is_empty() {
            return Err(CoreError::InvalidUri(s.to_string()));
        }
        Ok(Uri(normalize(s)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scheme(&self) -> &str {
        self.0.split(':').next().unwrap_or("")
    }

    /// True if this is a `file:` URI.
    pub fn is_file(&self) -> bool {
        self.scheme() == "file"
    }

    /// Returns the parent directory URI, or `None` at the root.
    pub fn parent(&self) -> Option<Uri> {
        let path = self.path_part();
        let trimmed = path.trim_end_matches('/');
        let idx = trimmed.rfind('/')?;
        if idx == 0 {
            // root
            let prefix = &self.0[..self.0.len() - path.len()];
            return Some(Uri(format!("{prefix}/")));
        }
        let prefix = &self.0[..self.0.len() - path.len()];
        Some(Uri(format!("{prefix}{}", &trimmed[..idx])))
    }

    /// The basename (last path segment), without decoding.
    pub fn basename(&self) -> &str {
        let path = self.path_part();
        let trimmed = path.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(idx) => &trimmed[idx + 1..],
            None => trimmed,
        }
    }

    /// Path segments of this URI, percent-decoded, empty segments dropped.
    pub fn segments(&self) -> Vec<String> {
        self.path_part()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
            .collect()
    }

    /// True if `self` is `other` or a descendant of `other` by path segments.
    pub fn is_self_or_descendant_of(&self, other: &Uri) -> bool {
        let mine = self.segments();
        let theirs = other.segments();
        theirs.len() <= mine.len() && mine[..theirs.len()] == theirs[..]
    }

    /// Depth (number of path segments); used for `rootPackageJsonUri`
    /// selection (fewest segments wins, see `packages`).
    pub fn depth(&self) -> usize {
        self.segments().len()
    }

    /// Join a relative, forward-slash path onto this URI's parent directory.
    /// Used by reference-closure triple-slash resolution, which must always
    /// use POSIX-style joining regardless of host OS.
    pub fn join_relative(&self, rel: &str) -> Uri {
        let base = self.parent().unwrap_or_else(|| self.clone());
        let mut combined: Vec<&str> = base
            .path_part()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        for part in rel.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    combined.pop();
                }
                other => combined.push(other),
            }
        }
        let prefix_len = self.0.len() - self.path_part().len();
        let prefix = &self.0[..prefix_len];
        Uri(format!("{prefix}/{}", combined.join("/")))
    }

    fn path_part(&self) -> &str {
        match self.0.find("://") {
            Some(idx) => &self.0[idx + 3..],
            None => match self.0.find(':') {
                Some(idx) => &self.0[idx + 1..],
                None => &self.0,
            },
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize(s: &str) -> String {
    let (scheme, rest) = match s.find("://") {
        Some(idx) => (&s[..idx], &s[idx + 3..]),
        None => return s.to_string(),
    };
    let scheme = scheme.to_ascii_lowercase();
    let rest = if rest.len() > 1 && rest.ends_with('/') {
        rest.trim_end_matches('/')
    } else {
        rest
    };
    format!("{scheme}://{rest}")
}

/// Converts a native filesystem path to a `file:` URI.
///
/// Total for any absolute path: forward slashes are used on the wire
/// regardless of host OS, and bytes outside the safe set are percent-encoded.
pub fn path_to_uri(path: &Path) -> CoreResult<Uri> {
    let path = strip_windows_device_prefix(path);
    let raw = path.to_string_lossy().replace('\\', "/");
    if raw.is_empty() {
        return Err(CoreError::InvalidUri("<empty path>".to_string()));
    }
    let raw = if raw.starts_with('/') {
        raw
    } else {
        format!("/{raw}")
    };
    let encoded = raw
        .split('/')
        .map(|segment| utf8_percent_encode(segment, URI_SAFE).to_string())
        .collect::<Vec<_>>()
        .join("/");
    Ok(Uri(normalize(&format!("file://{encoded}"))))
}

/// Converts a `file:` URI back to a native path. Fails with
/// [`CoreError::InvalidUri`] if the scheme is not `file:`.
pub fn uri_to_path(uri: &Uri) -> CoreResult<PathBuf> {
    if !uri.is_file() {
        return Err(CoreError::InvalidUri(uri.as_str().to_string()));
    }
    let raw_path = uri.path_part();
    let decoded = percent_decode_str(raw_path).decode_utf8_lossy().into_owned();
    if decoded.is_empty() {
        return Err(CoreError::InvalidUri(uri.as_str().to_string()));
    }

    #[cfg(windows)]
    {
        if let Some(stripped) = decoded.strip_prefix('/') {
            if stripped.len() >= 2 && stripped.as_bytes()[1] == b':' {
                return Ok(PathBuf::from(stripped.replace('/', "\\")));
            }
        }
    }

    Ok(PathBuf::from(decoded))
}

#[cfg(windows)]
fn strip_windows_device_prefix(path: &Path) -> PathBuf {
    let Some(raw) = path.to_str() else {
        return path.to_path_buf();
    };
    for prefix in ["\\\\?\\UNC\\", "\\\\.\\UNC\\"] {
        if let Some(rest) = raw.strip_prefix(prefix) {
            return PathBuf::from(format!("\\\\{rest}"));
        }
    }
    for prefix in ["\\\\?\\", "\\\\.\\"] {
        if let Some(rest) = raw.strip_prefix(prefix) {
            return PathBuf::from(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(not(windows))]
fn strip_windows_device_prefix(path: &Path) -> PathBuf {
    path.to_path_buf()
}

/// The classification of a file by suffix/basename (component A).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    TsSource,
    JsSource,
    Declaration,
    TsConfig,
    JsConfig,
    PackageJson,
    GlobalDeclaration,
    Other,
}

/// Classifies a path by its basename/suffix, per the specification's
/// `classifyFile`.
pub fn classify_file(path: &str) -> FileClass {
    let basename = path.rsplit('/').next().unwrap_or(path);
    if basename == "package.json" {
        return FileClass::PackageJson;
    }
    if basename == "tsconfig.json" {
        return FileClass::TsConfig;
    }
    if basename == "jsconfig.json" {
        return FileClass::JsConfig;
    }
    if basename.ends_with(".d.ts") {
        if basename.starts_with("lib.") {
            return FileClass::GlobalDeclaration;
        }
        return FileClass::Declaration;
    }
    if basename.ends_with(".ts") || basename.ends_with(".tsx") {
        return FileClass::TsSource;
    }
    if basename.ends_with(".js") || basename.ends_with(".jsx") || basename.ends_with(".mjs") {
        return FileClass::JsSource;
    }
    FileClass::Other
}

/// `true` iff `native_path`'s basename matches a bundled standard-library
/// file name (`lib.d.ts`, `lib.es5.d.ts`, ...), per [`crate::vfs::LibraryBundle`].
pub fn is_library_file_name(basename: &str) -> bool {
    basename.starts_with("lib.") && basename.ends_with(".d.ts")
}

/// Path-joins `config_dir` with a TS-lib-style `git:` URI for a standard
/// library file, per the handler layer's special-cased URI mapping (component
/// I, step 4): `git://github.com/Microsoft/TypeScript?v<ver>#lib/<basename>`.
pub fn lib_file_git_uri(version: &str, basename: &str) -> Uri {
    Uri::from_normalized(format!(
        "git://github.com/Microsoft/TypeScript?v{version}#lib/{basename}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_to_uri_percent_encodes_spaces() {
        let uri = path_to_uri(Path::new("/a dir/b.ts")).unwrap();
        assert_eq!(uri.as_str(), "file:///a%20dir/b.ts");
    }

    #[test]
    fn roundtrip_preserves_path() {
        let original = Path::new("/workspace/src/index.ts");
        let uri = path_to_uri(original).unwrap();
        let back = uri_to_path(&uri).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn uri_to_path_rejects_non_file_scheme() {
        let uri = Uri::parse("git://github.com/x?v4#lib/lib.d.ts").unwrap();
        assert!(uri_to_path(&uri).is_err());
    }

    #[test]
    fn parent_and_basename() {
        let uri = Uri::from_normalized("file:///a/b/c.ts");
        assert_eq!(uri.basename(), "c.ts");
        assert_eq!(uri.parent().unwrap().as_str(), "file:///a/b");
    }

    #[test]
    fn join_relative_is_posix_even_conceptually_on_windows() {
        let entry = Uri::from_normalized("file:///a/b/a.ts");
        let joined = entry.join_relative("foo/c.ts");
        assert_eq!(joined.as_str(), "file:///a/b/foo/c.ts");
    }

    #[test]
    fn join_relative_resolves_parent_segments() {
        let entry = Uri::from_normalized("file:///a/b/a.ts");
        let joined = entry.join_relative("../c.ts");
        assert_eq!(joined.as_str(), "file:///a/c.ts");
    }

    #[test]
    fn classify_detects_configs_and_sources() {
        assert_eq!(classify_file("/x/tsconfig.json"), FileClass::TsConfig);
        assert_eq!(classify_file("/x/jsconfig.json"), FileClass::JsConfig);
        assert_eq!(classify_file("/x/package.json"), FileClass::PackageJson);
        assert_eq!(classify_file("/x/a.ts"), FileClass::TsSource);
        assert_eq!(classify_file("/x/a.js"), FileClass::JsSource);
        assert_eq!(classify_file("/x/a.d.ts"), FileClass::Declaration);
        assert_eq!(classify_file("/x/lib.es5.d.ts"), FileClass::GlobalDeclaration);
        assert_eq!(classify_file("/x/readme.md"), FileClass::Other);
    }

    #[test]
    fn depth_counts_segments() {
        let root = Uri::from_normalized("file:///a/package.json");
        let nested = Uri::from_normalized("file:///a/b/c/package.json");
        assert!(root.depth() < nested.depth());
    }

    #[test]
    fn is_self_or_descendant_of_matches_prefix() {
        let root = Uri::from_normalized("file:///a");
        let child = Uri::from_normalized("file:///a/b/c.ts");
        let other = Uri::from_normalized("file:///z/b/c.ts");
        assert!(child.is_self_or_descendant_of(&root));
        assert!(!other.is_self_or_descendant_of(&root));
    }
}
