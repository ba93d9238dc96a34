//! Glob patterns for watch filtering.
//!
//! Supported syntax:
//!
//! | Token | Matches |
//! |-------|---------|
//! | `*` | Any run of characters except `/` |
//! | `**` | Any run of characters, including `/` |
//! | `**/` | Zero or more leading directories |
//! | `?` | One character except `/` |
//! | `[ab]`, `[a-z]`, `[!a]` | One character from the class |
//! | `{a,b}` | Either alternative |
//!
//! Paths are compared relative to the working directory; a leading `./`
//! and a trailing `/` are ignored.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use globset::{Glob, GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};

use crate::error::{Error, Result};
use crate::protocol::{WatchOptions, WatchPathsOptions};

// ============================================================================
// Path Normalization
// ============================================================================

/// Strips `./` prefixes and trailing slashes.
pub(crate) fn normalize_path(path: &str) -> &str {
    let mut path = path;
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        return "/";
    }
    if trimmed == "." { "" } else { trimmed }
}

/// Compiles one glob with `*` and `?` kept inside a path segment.
fn compile(pattern: &str) -> Result<Glob> {
    GlobBuilder::new(normalize_path(pattern))
        .literal_separator(true)
        .build()
        .map_err(|e| Error::invalid_pattern(pattern, e.kind().to_string()))
}

// ============================================================================
// GlobPattern
// ============================================================================

/// A compiled glob pattern.
#[derive(Clone)]
pub struct GlobPattern {
    source: String,
    matcher: GlobMatcher,
}

impl GlobPattern {
    /// Compiles a glob pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] for unclosed `{}` groups or `[]`
    /// classes.
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let source = pattern.into();
        let matcher = compile(&source)?.compile_matcher();
        Ok(Self { source, matcher })
    }

    /// Returns `true` if `path` matches the whole pattern.
    #[inline]
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.matcher.is_match(normalize_path(path))
    }

    /// Returns the pattern as written.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns `true` if `pattern` contains glob syntax.
    #[must_use]
    pub fn is_glob(pattern: &str) -> bool {
        pattern.contains(['*', '?', '[', '{'])
    }
}

impl fmt::Debug for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobPattern").field(&self.source).finish()
    }
}

// ============================================================================
// WatchTarget
// ============================================================================

/// What a single-pattern watcher reports on.
#[derive(Debug, Clone)]
pub(crate) enum WatchTarget {
    /// Glob: report paths matching it.
    Glob(GlobPattern),
    /// Literal path: the path itself plus children (descendants if
    /// recursive).
    Path { path: String, recursive: bool },
}

impl WatchTarget {
    /// Builds a target from a watch call.
    pub fn new(pattern: &str, options: &WatchOptions) -> Result<Self> {
        if GlobPattern::is_glob(pattern) {
            return GlobPattern::new(pattern).map(Self::Glob);
        }
        Ok(Self::Path {
            path: normalize_path(pattern).to_string(),
            recursive: options.recursive,
        })
    }

    /// Returns `true` if an event on `path` belongs to this watcher.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Glob(glob) => glob.matches(path),
            Self::Path {
                path: root,
                recursive,
            } => {
                let path = normalize_path(path);
                if path == root {
                    return true;
                }
                let rest = match root.as_str() {
                    "" => Some(path),
                    "/" => path.strip_prefix('/'),
                    _ => path
                        .strip_prefix(root.as_str())
                        .and_then(|rest| rest.strip_prefix('/')),
                };
                match rest {
                    Some(rest) if !rest.is_empty() => *recursive || !rest.contains('/'),
                    _ => false,
                }
            }
        }
    }
}

// ============================================================================
// PathFilter
// ============================================================================

/// Include/exclude glob sets for a multi-path watcher.
#[derive(Debug, Clone)]
pub(crate) struct PathFilter {
    include: GlobSet,
    exclude: GlobSet,
}

impl PathFilter {
    /// Compiles the option sets.
    pub fn new(options: &WatchPathsOptions) -> Result<Self> {
        Ok(Self {
            include: compile_set(&options.include)?,
            exclude: compile_set(&options.exclude)?,
        })
    }

    /// Included and not excluded. An empty include set includes everything.
    pub fn matches(&self, path: &str) -> bool {
        let path = normalize_path(path);
        let included = self.include.is_empty() || self.include.is_match(path);
        included && !self.exclude.is_match(path)
    }
}

fn compile_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(compile(pattern)?);
    }
    builder
        .build()
        .map_err(|e| Error::invalid_pattern(patterns.join(","), e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn glob(pattern: &str) -> GlobPattern {
        GlobPattern::new(pattern).expect("valid glob")
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./src/a.ts"), "src/a.ts");
        assert_eq!(normalize_path("src/"), "src");
        assert_eq!(normalize_path("."), "");
        assert_eq!(normalize_path("./"), "");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_star_stays_in_segment() {
        let g = glob("src/*.ts");
        assert!(g.matches("src/index.ts"));
        assert!(!g.matches("src/nested/index.ts"));
        assert!(!g.matches("src/index.tsx"));
    }

    #[test]
    fn test_double_star_crosses_segments() {
        let g = glob("src/**/*.ts");
        assert!(g.matches("src/index.ts"));
        assert!(g.matches("src/a/b/c.ts"));
        assert!(!g.matches("lib/a.ts"));

        let g = glob("dist/**");
        assert!(g.matches("dist/a/b.js"));
    }

    #[test]
    fn test_question_mark_and_groups() {
        assert!(glob("a?.txt").matches("ab.txt"));
        assert!(!glob("a?.txt").matches("a/.txt"));

        let g = glob("**/*.{js,ts}");
        assert!(g.matches("x.js"));
        assert!(g.matches("deep/y.ts"));
        assert!(!g.matches("z.css"));
    }

    #[test]
    fn test_parentheses_are_literal() {
        let g = glob("file(1).txt");
        assert!(g.matches("file(1).txt"));
        assert!(!g.matches("file1.txt"));
    }

    #[test]
    fn test_character_classes() {
        let g = glob("src/*.[jt]s");
        assert!(g.matches("src/a.js"));
        assert!(g.matches("src/b.ts"));
        assert!(!g.matches("src/c.rs"));
        assert!(!g.matches("src/x.[jt]s"));

        assert!(glob("log[0-9].txt").matches("log7.txt"));
        assert!(!glob("log[!0-9].txt").matches("log7.txt"));
    }

    #[test]
    fn test_nested_groups_never_compile_to_a_dead_pattern() {
        match GlobPattern::new("{src,lib/{a,b}}/*.js") {
            Ok(g) => {
                assert!(g.matches("src/x.js"));
                assert!(g.matches("lib/a/x.js"));
                assert!(g.matches("lib/b/x.js"));
                assert!(!g.matches("lib/c/x.js"));
            }
            Err(err) => assert!(matches!(err, Error::InvalidPattern { .. }), "{err}"),
        }
    }

    #[test]
    fn test_unclosed_class_is_rejected() {
        let err = GlobPattern::new("src/[ab.ts").expect_err("invalid");
        assert!(
            matches!(err, Error::InvalidPattern { ref pattern, .. } if pattern == "src/[ab.ts"),
            "{err}"
        );
    }

    #[test]
    fn test_class_makes_a_glob_target() {
        let target = WatchTarget::new("src/[ab].ts", &WatchOptions::default()).expect("target");
        assert!(matches!(target, WatchTarget::Glob(_)));
        assert!(target.matches("src/a.ts"));
        assert!(!target.matches("src/c.ts"));
    }

    #[test]
    fn test_unbalanced_group_is_rejected() {
        let err = GlobPattern::new("*.{js,ts").expect_err("invalid");
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn test_literal_target_non_recursive() {
        let target = WatchTarget::new("src", &WatchOptions::default()).expect("target");
        assert!(target.matches("src"));
        assert!(target.matches("src/a.ts"));
        assert!(!target.matches("src/nested/a.ts"));
        assert!(!target.matches("srcx/a.ts"));
        assert!(!target.matches("other.ts"));
    }

    #[test]
    fn test_literal_target_recursive() {
        let target = WatchTarget::new("./src/", &WatchOptions::recursive()).expect("target");
        assert!(target.matches("src/nested/deep/a.ts"));
        assert!(!target.matches("lib/a.ts"));
    }

    #[test]
    fn test_root_target() {
        let target = WatchTarget::new(".", &WatchOptions::default()).expect("target");
        assert!(target.matches("a.txt"));
        assert!(!target.matches("dir/a.txt"));
    }

    #[test]
    fn test_filesystem_root_target() {
        let target = WatchTarget::new("/", &WatchOptions::default()).expect("target");
        assert!(target.matches("/"));
        assert!(target.matches("/a"));
        assert!(!target.matches("/a/b"));
        assert!(!target.matches("a"));

        let target = WatchTarget::new("/", &WatchOptions::recursive()).expect("target");
        assert!(target.matches("/a/b/c.txt"));
    }

    #[test]
    fn test_file_target() {
        let target = WatchTarget::new("package.json", &WatchOptions::default()).expect("target");
        assert!(target.matches("package.json"));
        assert!(!target.matches("package-lock.json"));
    }

    #[test]
    fn test_path_filter_include_exclude() {
        let filter = PathFilter::new(
            &WatchPathsOptions::include(["**/*.js"]).exclude(["node_modules/**"]),
        )
        .expect("filter");
        assert!(filter.matches("dist/app.js"));
        assert!(!filter.matches("node_modules/react/index.js"));
        assert!(!filter.matches("dist/app.css"));
    }

    #[test]
    fn test_path_filter_rejects_invalid_member() {
        let err = PathFilter::new(&WatchPathsOptions::include(["*.ts", "src/{a"]))
            .expect_err("invalid");
        assert!(matches!(err, Error::InvalidPattern { ref pattern, .. } if pattern == "src/{a"));
    }

    #[test]
    fn test_empty_include_means_everything() {
        let filter =
            PathFilter::new(&WatchPathsOptions::default().exclude([".git/**"])).expect("filter");
        assert!(filter.matches("anything/at/all"));
        assert!(!filter.matches(".git/HEAD"));
    }

    proptest! {
        #[test]
        fn prop_literal_pattern_matches_itself(
            path in "[a-z]{1,8}(/[a-z]{1,8}){0,3}\\.[a-z]{1,3}",
        ) {
            prop_assert!(glob(&path).matches(&path));
        }

        #[test]
        fn prop_double_star_matches_any_path(path in "[a-z0-9_.-]{1,8}(/[a-z0-9_.-]{1,8}){0,4}") {
            prop_assert!(glob("**").matches(&path));
        }

        #[test]
        fn prop_single_star_never_crosses_slash(
            dir in "[a-z]{1,8}",
            name in "[a-z]{1,8}",
        ) {
            let nested = format!("{dir}/{name}.rs");
            let flat = format!("{name}.rs");
            prop_assert!(glob("*.rs").matches(&flat));
            prop_assert!(!glob("*.rs").matches(&nested));
        }
    }
}
