//! Normalized paths and location chains
//!
//! During evaluation every candidate node carries its location as a
//! parent-linked chain of [`PathNode`]s sharing structure with its siblings.
//! A [`NormalizedPath`] is the flattened, canonical form of such a chain:
//! bracket notation rooted at `$`, e.g. `$['store']['book'][2]['title']`,
//! with single quotes in member names escaped as `\'`.
//!
//! Normalized paths order first by segment (roots before members before
//! indices, members lexicographically, indices numerically), then by length,
//! which is the ordering the `SORT` option guarantees.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

/// One component of a location.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathSegment {
    /// The root marker `$`
    Root,
    /// The current-node marker `@`
    Current,
    /// An object member name
    Member(String),
    /// An array index
    Index(i64),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Root => f.write_str("$"),
            PathSegment::Current => f.write_str("@"),
            PathSegment::Member(name) => {
                if name.contains('\'') {
                    write!(f, "['{}']", name.replace('\'', "\\'"))
                } else {
                    write!(f, "['{name}']")
                }
            }
            PathSegment::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// A node in a parent-linked location chain.
///
/// Chains are extended by pushing a new node whose parent is the previous
/// tail; siblings share their whole ancestry. `Rc` keeps every node alive
/// for exactly as long as something downstream still references it.
#[derive(Debug)]
pub(crate) struct PathNode {
    pub(crate) segment: PathSegment,
    pub(crate) parent: Option<Rc<PathNode>>,
}

impl PathNode {
    pub(crate) fn root() -> Rc<PathNode> {
        Rc::new(PathNode {
            segment: PathSegment::Root,
            parent: None,
        })
    }

    pub(crate) fn current() -> Rc<PathNode> {
        Rc::new(PathNode {
            segment: PathSegment::Current,
            parent: None,
        })
    }

    pub(crate) fn member(parent: &Rc<PathNode>, name: impl Into<String>) -> Rc<PathNode> {
        Rc::new(PathNode {
            segment: PathSegment::Member(name.into()),
            parent: Some(Rc::clone(parent)),
        })
    }

    pub(crate) fn index(parent: &Rc<PathNode>, index: usize) -> Rc<PathNode> {
        Rc::new(PathNode {
            segment: PathSegment::Index(index as i64),
            parent: Some(Rc::clone(parent)),
        })
    }
}

/// The canonical location of a node within a root document.
///
/// Field order matters: ordering and equality derive from the segment list,
/// and the cached string is a pure function of it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NormalizedPath {
    segments: Vec<PathSegment>,
    normalized: String,
}

impl NormalizedPath {
    /// The path of the root value itself: `$`.
    #[must_use]
    pub fn root() -> Self {
        NormalizedPath::from_segments(vec![PathSegment::Root])
    }

    pub(crate) fn from_node(tail: &Rc<PathNode>) -> Self {
        let mut segments = Vec::new();
        let mut node: &PathNode = tail;
        loop {
            segments.push(node.segment.clone());
            match &node.parent {
                Some(parent) => node = parent,
                None => break,
            }
        }
        segments.reverse();
        NormalizedPath::from_segments(segments)
    }

    fn from_segments(segments: Vec<PathSegment>) -> Self {
        use fmt::Write;

        let mut normalized = String::new();
        for segment in &segments {
            // String formatting cannot fail
            let _ = write!(normalized, "{segment}");
        }
        NormalizedPath {
            segments,
            normalized,
        }
    }

    /// The canonical string form, e.g. `$['store']['book'][0]`.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// The path segments in root-to-leaf order.
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// RFC 6901 JSON Pointer form, with `~` and `/` in member names escaped
    /// as `~0` and `~1`.
    #[must_use]
    pub fn to_json_pointer(&self) -> String {
        let mut buffer = String::new();
        for segment in &self.segments {
            match segment {
                PathSegment::Root | PathSegment::Current => {}
                PathSegment::Member(name) => {
                    buffer.push('/');
                    for c in name.chars() {
                        match c {
                            '~' => buffer.push_str("~0"),
                            '/' => buffer.push_str("~1"),
                            _ => buffer.push(c),
                        }
                    }
                }
                PathSegment::Index(index) => {
                    buffer.push('/');
                    buffer.push_str(&index.to_string());
                }
            }
        }
        buffer
    }

    /// Navigates `root` along this path, returning the addressed value if
    /// every segment resolves.
    #[must_use]
    pub fn try_select<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut element = root;
        for segment in &self.segments {
            match segment {
                PathSegment::Root | PathSegment::Current => {}
                PathSegment::Member(name) => {
                    element = element.as_object()?.get(name)?;
                }
                PathSegment::Index(index) => {
                    let array = element.as_array()?;
                    if *index < 0 || *index as usize >= array.len() {
                        return None;
                    }
                    element = &array[*index as usize];
                }
            }
        }
        Some(element)
    }

    /// Mutable variant of [`try_select`](Self::try_select), used by the
    /// replace entry points.
    #[must_use]
    pub fn try_select_mut<'a>(&self, root: &'a mut Value) -> Option<&'a mut Value> {
        let mut element = root;
        for segment in &self.segments {
            match segment {
                PathSegment::Root | PathSegment::Current => {}
                PathSegment::Member(name) => {
                    element = element.as_object_mut()?.get_mut(name)?;
                }
                PathSegment::Index(index) => {
                    let array = element.as_array_mut()?;
                    if *index < 0 || *index as usize >= array.len() {
                        return None;
                    }
                    element = &mut array[*index as usize];
                }
            }
        }
        Some(element)
    }

    /// True when `root` has a value at this path.
    #[must_use]
    pub fn contains_value(&self, root: &Value) -> bool {
        self.try_select(root).is_some()
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

#[cfg(test)]
mod normalized_path_tests {
    use super::*;
    use serde_json::json;

    fn chain() -> Rc<PathNode> {
        let root = PathNode::root();
        let store = PathNode::member(&root, "store");
        let book = PathNode::member(&store, "book");
        PathNode::index(&book, 2)
    }

    #[test]
    fn test_canonical_string() {
        let path = NormalizedPath::from_node(&chain());
        assert_eq!(path.as_str(), "$['store']['book'][2]");
    }

    #[test]
    fn test_quote_escaping() {
        let root = PathNode::root();
        let odd = PathNode::member(&root, "it's");
        let path = NormalizedPath::from_node(&odd);
        assert_eq!(path.as_str(), "$['it\\'s']");
    }

    #[test]
    fn test_json_pointer() {
        let path = NormalizedPath::from_node(&chain());
        assert_eq!(path.to_json_pointer(), "/store/book/2");
    }

    #[test]
    fn test_ordering_member_before_index_then_depth() {
        let root = PathNode::root();
        let a = NormalizedPath::from_node(&PathNode::member(&root, "a"));
        let b = NormalizedPath::from_node(&PathNode::member(&root, "b"));
        let i = NormalizedPath::from_node(&PathNode::index(&root, 0));
        let deeper = NormalizedPath::from_node(&PathNode::member(&PathNode::member(&root, "a"), "x"));
        assert!(a < b);
        assert!(b < i);
        assert!(a < deeper);
    }

    #[test]
    fn test_try_select() {
        let doc = json!({"store": {"book": [1, 2, {"title": "x"}]}});
        let path = NormalizedPath::from_node(&chain());
        assert_eq!(path.try_select(&doc), Some(&json!({"title": "x"})));
        assert!(path.contains_value(&doc));

        let missing = NormalizedPath::from_node(&PathNode::member(&PathNode::root(), "nope"));
        assert_eq!(missing.try_select(&doc), None);
    }
}
