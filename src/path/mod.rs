//! Dotted-path parsing and canonicalisation.
//!
//! Paths address leaves in templates, schemas, and payloads. A path is a
//! `.`-separated sequence of segments; each segment is a plain key, an
//! indexed key `key[n]`, or a wildcard `key[]`. Wildcards accept any index,
//! so `plan.tasks[]` and `plan.tasks[0]` never collide, while `plan.tasks[]`
//! against a plain-object use of `plan.tasks` does.

mod set;

pub use set::{SetError, get_by_path, set_by_path};

use std::fmt;
use std::str::FromStr;

use crate::error::PathError;

/// How a segment addresses its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accessor {
    /// Plain object key: `foo`.
    Key,
    /// Indexed array element: `foo[3]`.
    Index(usize),
    /// Wildcard array element: `foo[]`.
    Wildcard,
}

/// One segment of a dotted path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    /// The property key.
    pub key: String,
    /// How the key is addressed.
    pub accessor: Accessor,
}

impl Segment {
    /// Creates a plain key segment.
    #[must_use]
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            accessor: Accessor::Key,
        }
    }

    /// Creates an indexed segment.
    #[must_use]
    pub fn index(key: impl Into<String>, index: usize) -> Self {
        Self {
            key: key.into(),
            accessor: Accessor::Index(index),
        }
    }

    /// Creates a wildcard segment.
    #[must_use]
    pub fn wildcard(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            accessor: Accessor::Wildcard,
        }
    }

    /// Returns `true` when this segment, used as a pattern, accepts `other`.
    ///
    /// Keys must match exactly; a wildcard accessor accepts any index (and
    /// another wildcard), an index accepts only itself.
    #[must_use]
    pub fn accepts(&self, other: &Self) -> bool {
        if self.key != other.key {
            return false;
        }
        match (self.accessor, other.accessor) {
            (Accessor::Key, Accessor::Key)
            | (Accessor::Wildcard, Accessor::Index(_) | Accessor::Wildcard) => true,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.accessor {
            Accessor::Key => write!(f, "{}", self.key),
            Accessor::Index(i) => write!(f, "{}[{i}]", self.key),
            Accessor::Wildcard => write!(f, "{}[]", self.key),
        }
    }
}

/// A parsed, canonicalised dotted path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotPath {
    segments: Vec<Segment>,
}

impl SlotPath {
    /// Parses a path like `foo.bar[0].baz[]`.
    ///
    /// Validation: no empty path, no empty segments (leading, trailing, or
    /// doubled dots), `[n]` must hold a non-negative integer, every `[` must
    /// close, nothing may follow `]` within a segment.
    ///
    /// # Errors
    ///
    /// Returns a [`PathError`] describing the first violated rule.
    pub fn parse(input: &str) -> Result<Self, PathError> {
        if input.is_empty() {
            return Err(PathError::Empty);
        }
        let mut segments = Vec::new();
        for raw in input.split('.') {
            if raw.is_empty() {
                return Err(PathError::EmptySegment {
                    path: input.to_string(),
                });
            }
            segments.push(parse_segment(raw)?);
        }
        Ok(Self { segments })
    }

    /// Parses a path, additionally rejecting non-terminal wildcards.
    ///
    /// Deriver contexts only allow `[]` on the final segment; mid-path
    /// wildcards have no canonical shape there.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::WildcardNotAllowed`] for a mid-path wildcard, or
    /// any error [`Self::parse`] produces.
    pub fn parse_terminal_wildcard(input: &str) -> Result<Self, PathError> {
        let path = Self::parse(input)?;
        let non_terminal_wildcard = path
            .segments
            .iter()
            .rev()
            .skip(1)
            .any(|s| s.accessor == Accessor::Wildcard);
        if non_terminal_wildcard {
            return Err(PathError::WildcardNotAllowed {
                path: input.to_string(),
            });
        }
        Ok(path)
    }

    /// Builds a path from pre-parsed segments.
    #[must_use]
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// The parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns `true` for a segment-less path (never produced by `parse`).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The canonical string form, suitable for comparison and reporting.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// Returns `true` when any segment carries a wildcard.
    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        self.segments
            .iter()
            .any(|s| s.accessor == Accessor::Wildcard)
    }

    /// Returns `true` when this path, used as a pattern, accepts `other`.
    ///
    /// Used by coverage post-processing: an expected `key[]` slot is
    /// satisfied by a written `key[3]`.
    #[must_use]
    pub fn accepts(&self, other: &Self) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| a.accepts(b))
    }
}

impl fmt::Display for SlotPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl FromStr for SlotPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_segment(raw: &str) -> Result<Segment, PathError> {
    match raw.find('[') {
        None => Ok(Segment::key(raw)),
        Some(0) => Err(PathError::EmptySegment {
            path: raw.to_string(),
        }),
        Some(open) => {
            let key = &raw[..open];
            let rest = &raw[open + 1..];
            let Some(close) = rest.find(']') else {
                return Err(PathError::UnclosedBracket {
                    segment: raw.to_string(),
                });
            };
            if close + 1 != rest.len() {
                return Err(PathError::TrailingCharacters {
                    segment: raw.to_string(),
                });
            }
            let inner = &rest[..close];
            if inner.is_empty() {
                return Ok(Segment::wildcard(key));
            }
            let index: usize = inner.parse().map_err(|_| PathError::InvalidIndex {
                segment: raw.to_string(),
            })?;
            Ok(Segment::index(key, index))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_parse_plain() {
        let p = SlotPath::parse("foo.bar.baz").unwrap();
        assert_eq!(p.len(), 3);
        assert_eq!(p.segments()[0], Segment::key("foo"));
        assert_eq!(p.canonical(), "foo.bar.baz");
    }

    #[test]
    fn test_parse_indexed_and_wildcard() {
        let p = SlotPath::parse("foo.bar[0].baz[]").unwrap();
        assert_eq!(p.segments()[1], Segment::index("bar", 0));
        assert_eq!(p.segments()[2], Segment::wildcard("baz"));
        assert!(p.has_wildcard());
        assert_eq!(p.canonical(), "foo.bar[0].baz[]");
    }

    #[test_case("" => matches PathError::Empty; "empty path")]
    #[test_case(".foo" => matches PathError::EmptySegment { .. }; "leading dot")]
    #[test_case("foo." => matches PathError::EmptySegment { .. }; "trailing dot")]
    #[test_case("a..b" => matches PathError::EmptySegment { .. }; "doubled dot")]
    #[test_case("a.[0]" => matches PathError::EmptySegment { .. }; "bracket without key")]
    #[test_case("a.b[x]" => matches PathError::InvalidIndex { .. }; "non-numeric index")]
    #[test_case("a.b[-1]" => matches PathError::InvalidIndex { .. }; "negative index")]
    #[test_case("a.b[0" => matches PathError::UnclosedBracket { .. }; "unclosed bracket")]
    #[test_case("a.b[0]c" => matches PathError::TrailingCharacters { .. }; "text after bracket")]
    fn test_parse_rejects(input: &str) -> PathError {
        SlotPath::parse(input).unwrap_err()
    }

    #[test]
    fn test_terminal_wildcard_rule() {
        assert!(SlotPath::parse_terminal_wildcard("a.b[]").is_ok());
        assert!(SlotPath::parse_terminal_wildcard("a.b[0].c").is_ok());
        let err = SlotPath::parse_terminal_wildcard("a[].b").unwrap_err();
        assert!(matches!(err, PathError::WildcardNotAllowed { .. }));
    }

    #[test]
    fn test_wildcard_accepts_any_index() {
        let pattern = SlotPath::parse("plan.tasks[]").unwrap();
        let concrete = SlotPath::parse("plan.tasks[4]").unwrap();
        assert!(pattern.accepts(&concrete));
        assert!(pattern.accepts(&pattern));
        // An index never accepts the wildcard or a different index.
        assert!(!concrete.accepts(&pattern));
        let other = SlotPath::parse("plan.tasks[5]").unwrap();
        assert!(!concrete.accepts(&other));
    }

    #[test]
    fn test_accepts_requires_same_shape() {
        let a = SlotPath::parse("a.b").unwrap();
        let b = SlotPath::parse("a.b.c").unwrap();
        assert!(!a.accepts(&b));
        let c = SlotPath::parse("a.c").unwrap();
        assert!(!a.accepts(&c));
    }

    #[test]
    fn test_roundtrip_canonical() {
        for input in ["a", "a.b[0]", "a.b[]", "visits[2].notes[]"] {
            let p = SlotPath::parse(input).unwrap();
            assert_eq!(p.canonical(), input);
            assert_eq!(input.parse::<SlotPath>().unwrap(), p);
        }
    }
}
