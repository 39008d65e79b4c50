//! Hierarchical dotted names
//!
//! A [`ScopedName`] identifies a symbol across modules and namespaces, e.g.
//! `main.fib.loop_start`. Names are immutable; equality and ordering are
//! structural over the segment sequence.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Separator between path segments in the textual form
pub const SCOPE_SEPARATOR: &str = ".";

/// An immutable ordered sequence of path segments.
///
/// Invariant: no segment is empty or contains the separator. The empty name
/// (zero segments) is the root scope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopedName {
    segments: Vec<String>,
}

impl ScopedName {
    /// The root scope (no segments)
    pub fn root() -> Self {
        ScopedName { segments: Vec::new() }
    }

    /// Build a name from segments, checking the segment invariant
    pub fn new(segments: Vec<String>) -> Option<Self> {
        if segments
            .iter()
            .any(|s| s.is_empty() || s.contains(SCOPE_SEPARATOR))
        {
            return None;
        }
        Some(ScopedName { segments })
    }

    /// Parse a dotted string. The empty string is the root scope.
    pub fn from_string(path: &str) -> Option<Self> {
        if path.is_empty() {
            return Some(Self::root());
        }
        Self::new(path.split(SCOPE_SEPARATOR).map(str::to_string).collect())
    }

    /// A single-segment name
    pub fn from_segment(segment: &str) -> Option<Self> {
        Self::new(vec![segment.to_string()])
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// First segment, if any
    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// Last segment, if any
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The name with the last segment removed. Root's parent is root.
    pub fn parent(&self) -> ScopedName {
        let mut segments = self.segments.clone();
        segments.pop();
        ScopedName { segments }
    }

    /// Does `self` start with all segments of `prefix`?
    pub fn startswith(&self, prefix: &ScopedName) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Concatenation: `self` followed by all segments of `other`
    pub fn concat(&self, other: &ScopedName) -> ScopedName {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        ScopedName { segments }
    }

    /// Append a single segment
    pub fn child(&self, segment: &str) -> Option<ScopedName> {
        if segment.is_empty() || segment.contains(SCOPE_SEPARATOR) {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Some(ScopedName { segments })
    }

    /// The suffix of `self` after removing `prefix`, if `self` starts with it
    pub fn strip_prefix(&self, prefix: &ScopedName) -> Option<ScopedName> {
        if !self.startswith(prefix) {
            return None;
        }
        Some(ScopedName {
            segments: self.segments[prefix.len()..].to_vec(),
        })
    }
}

impl fmt::Display for ScopedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join(SCOPE_SEPARATOR))
    }
}

impl Serialize for ScopedName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ScopedName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ScopedName::from_string(&s).ok_or_else(|| D::Error::custom("invalid scoped name"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_string() {
        let name = ScopedName::from_string("a.b.c").unwrap();
        assert_eq!(name.segments(), &["a", "b", "c"]);
        assert_eq!(name.to_string(), "a.b.c");
    }

    #[test]
    fn test_empty_segment_rejected() {
        assert!(ScopedName::from_string("a..b").is_none());
        assert!(ScopedName::new(vec!["".to_string()]).is_none());
        assert!(ScopedName::new(vec!["a.b".to_string()]).is_none());
    }

    #[test]
    fn test_root() {
        let root = ScopedName::from_string("").unwrap();
        assert!(root.is_empty());
        assert_eq!(root, ScopedName::root());
    }

    #[test]
    fn test_startswith() {
        let name = ScopedName::from_string("a.b.c").unwrap();
        let prefix = ScopedName::from_string("a.b").unwrap();
        let other = ScopedName::from_string("a.c").unwrap();
        assert!(name.startswith(&prefix));
        assert!(name.startswith(&name));
        assert!(!name.startswith(&other));
        assert!(!prefix.startswith(&name));
    }

    #[test]
    fn test_concat_and_parent() {
        let a = ScopedName::from_string("x.y").unwrap();
        let b = ScopedName::from_string("z").unwrap();
        assert_eq!(a.concat(&b).to_string(), "x.y.z");
        assert_eq!(a.parent().to_string(), "x");
        assert_eq!(ScopedName::root().parent(), ScopedName::root());
    }

    #[test]
    fn test_strip_prefix() {
        let name = ScopedName::from_string("a.b.c").unwrap();
        let prefix = ScopedName::from_string("a").unwrap();
        assert_eq!(name.strip_prefix(&prefix).unwrap().to_string(), "b.c");
        let other = ScopedName::from_string("b").unwrap();
        assert!(name.strip_prefix(&other).is_none());
    }

    #[test]
    fn test_ordering_is_structural() {
        let a = ScopedName::from_string("a.b").unwrap();
        let b = ScopedName::from_string("a.c").unwrap();
        assert!(a < b);
    }
}
