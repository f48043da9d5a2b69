#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `filters` implements the ordered include/exclude path filter the walker
//! and comparator consult for every entry. Each rule pairs a direction
//! with a shell-style glob; evaluation returns the verdict of the first
//! matching rule, and entries no rule matches are accepted.
//!
//! # Matching semantics
//!
//! - A pattern containing `/` matches against the full `dir + name` path;
//!   any other pattern matches the basename only.
//! - `*`, `?` and `[…]` carry their shell meaning and never match a `/`,
//!   so a single `*` stays within one path component.
//! - A bare `*` is a fast-path match-anything rule.
//! - Directories are tested with a trailing `/` on the name, so a pattern
//!   ending in `/` matches directories only.
//!
//! # Examples
//!
//! ```
//! use filters::{PathFilter, RuleKind};
//!
//! let mut filter = PathFilter::new();
//! filter.push(RuleKind::Include, "*.keep")?;
//! filter.push(RuleKind::Exclude, "*.tmp")?;
//! filter.push(RuleKind::Exclude, "build/")?;
//!
//! assert!(filter.allows("src/", "main.rs")); // no rule matches
//! assert!(!filter.allows("src/", "scratch.tmp"));
//! assert!(filter.allows("", "important.keep"));
//! assert!(!filter.allows("", "build/"));
//! # Ok::<(), filters::FilterError>(())
//! ```

use globset::{GlobBuilder, GlobMatcher};
use thiserror::Error;

/// Error raised while building a filter.
#[derive(Debug, Error)]
pub enum FilterError {
    /// A directive string had no `+`/`-` prefix.
    #[error("malformed filter directive {directive:?}")]
    MalformedDirective {
        /// The offending directive text.
        directive: String,
    },
    /// A pattern failed to compile as a glob.
    #[error("invalid filter pattern {pattern:?}")]
    BadPattern {
        /// The offending pattern text.
        pattern: String,
        /// Compilation error from the glob engine.
        #[source]
        source: globset::Error,
    },
}

/// Direction of one filter rule.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RuleKind {
    /// A match accepts the entry and stops evaluation.
    Include,
    /// A match rejects the entry and stops evaluation.
    Exclude,
}

/// One compiled rule.
#[derive(Debug)]
struct Rule {
    kind: RuleKind,
    pattern: String,
    /// Compiled matcher; `None` for the bare-`*` fast path.
    matcher: Option<GlobMatcher>,
    /// Pattern contains `/`: match the full path instead of the basename.
    match_path: bool,
}

impl Rule {
    fn new(kind: RuleKind, pattern: &str) -> Result<Self, FilterError> {
        let matcher = if pattern == "*" {
            None
        } else {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|source| FilterError::BadPattern {
                    pattern: pattern.to_owned(),
                    source,
                })?;
            Some(glob.compile_matcher())
        };
        Ok(Self {
            kind,
            pattern: pattern.to_owned(),
            matcher,
            match_path: pattern.contains('/'),
        })
    }

    fn matches(&self, dir: &str, name: &str) -> bool {
        let Some(matcher) = &self.matcher else {
            return true;
        };
        if self.match_path {
            let mut path = String::with_capacity(dir.len() + name.len());
            path.push_str(dir);
            path.push_str(name);
            matcher.is_match(path)
        } else {
            matcher.is_match(name)
        }
    }
}

/// Ordered include/exclude filter with default-accept semantics.
#[derive(Debug, Default)]
pub struct PathFilter {
    rules: Vec<Rule>,
}

impl PathFilter {
    /// Creates a filter with no rules; it accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one rule.
    pub fn push(&mut self, kind: RuleKind, pattern: &str) -> Result<(), FilterError> {
        self.rules.push(Rule::new(kind, pattern)?);
        Ok(())
    }

    /// Builds a filter from `+pattern` / `-pattern` directive strings.
    ///
    /// Whitespace between the sign and the pattern is skipped. Any other
    /// leading character is a malformed directive.
    pub fn from_directives<'a, I>(directives: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut filter = Self::new();
        for directive in directives {
            let mut chars = directive.chars();
            let kind = match chars.next() {
                Some('+') => RuleKind::Include,
                Some('-') => RuleKind::Exclude,
                _ => {
                    return Err(FilterError::MalformedDirective {
                        directive: directive.to_owned(),
                    });
                }
            };
            filter.push(kind, chars.as_str().trim_start())?;
        }
        Ok(filter)
    }

    /// Returns `true` if the filter has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterates the rules as `(kind, pattern)` pairs, in evaluation order.
    pub fn rules(&self) -> impl Iterator<Item = (RuleKind, &str)> {
        self.rules
            .iter()
            .map(|rule| (rule.kind, rule.pattern.as_str()))
    }

    /// Tests an entry against the rules.
    ///
    /// `dir` is the directory part (with trailing `/`, possibly empty) and
    /// `name` the basename; directory entries carry a trailing `/` on the
    /// name. Returns the verdict of the first matching rule, or `true`
    /// when nothing matches.
    #[must_use]
    pub fn allows(&self, dir: &str, name: &str) -> bool {
        for rule in &self.rules {
            if rule.matches(dir, name) {
                return match rule.kind {
                    RuleKind::Include => true,
                    RuleKind::Exclude => false,
                };
            }
        }
        true
    }
}
