//! Pointer strings that address a node inside a JSON document.
//!
//! Paths are written as dotted object keys with bracketed array indices,
//! e.g. `choices[0].message.content`. Keys that cannot be written bare
//! (empty, or containing `.`, `[`, `]` or `"`) are written as a bracketed
//! JSON string: `data["weird.key"]`. The document root is written `$`.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Rendering of the empty path.
pub const ROOT: &str = "$";

/// One step of a [`JsonPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Object member access.
    Key(String),
    /// Array element access.
    Index(usize),
}

/// A parsed pointer into a JSON document.
///
/// # Examples
///
/// ```
/// use replyparse::path::JsonPath;
/// use serde_json::json;
///
/// let path: JsonPath = "choices[0].message.content".parse().unwrap();
/// let doc = json!({"choices": [{"message": {"content": "hi"}}]});
/// assert_eq!(path.resolve(&doc), Some(&json!("hi")));
/// assert_eq!(path.to_string(), "choices[0].message.content");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

/// Error returned when a pointer string is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid path at byte {position}: {reason}")]
pub struct PathParseError {
    /// Byte offset where parsing stopped.
    pub position: usize,
    /// What was expected.
    pub reason: &'static str,
}

impl PathParseError {
    fn new(position: usize, reason: &'static str) -> Self {
        Self { position, reason }
    }
}

impl JsonPath {
    /// Creates the root path.
    #[inline]
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns the segments of this path.
    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of segments; the root has depth 0.
    #[inline]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Returns true for the root path.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns a new path with an object key appended.
    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.segments.push(Segment::Key(key.into()));
        next
    }

    /// Returns a new path with an array index appended.
    pub fn index(&self, index: usize) -> Self {
        let mut next = self.clone();
        next.segments.push(Segment::Index(index));
        next
    }

    /// The nearest object key, skipping trailing array indices.
    ///
    /// For `messages[2]` this is `messages`; for `a.b` it is `b`.
    pub fn parent_key(&self) -> Option<&str> {
        self.segments.iter().rev().find_map(|s| match s {
            Segment::Key(k) => Some(k.as_str()),
            Segment::Index(_) => None,
        })
    }

    /// Follows the path through `value`.
    ///
    /// Returns `None` on any structural mismatch (missing key, index out of
    /// bounds, or indexing into a scalar).
    pub fn resolve<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        self.segments
            .iter()
            .try_fold(value, |node, segment| match segment {
                Segment::Key(k) => node.as_object()?.get(k),
                Segment::Index(i) => node.as_array()?.get(*i),
            })
    }
}

/// Returns true when `key` can be rendered without brackets.
fn is_bare_key(key: &str) -> bool {
    !key.is_empty() && key != ROOT && !key.contains(['.', '[', ']', '"'])
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str(ROOT);
        }
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(k) if is_bare_key(k) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(k)?;
                }
                Segment::Key(k) => write!(f, "[{}]", Value::String(k.clone()))?,
                Segment::Index(n) => write!(f, "[{}]", n)?,
            }
        }
        Ok(())
    }
}

impl FromStr for JsonPath {
    type Err = PathParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.is_empty() || input == ROOT {
            return Ok(Self::root());
        }

        let bytes = input.as_bytes();
        let mut segments = Vec::new();
        let mut pos = 0;

        while pos < bytes.len() {
            match bytes[pos] {
                b'[' => {
                    let (segment, next) = parse_bracket(input, pos)?;
                    segments.push(segment);
                    pos = next;
                }
                b'.' if segments.is_empty() => {
                    return Err(PathParseError::new(pos, "path cannot start with '.'"));
                }
                b'.' => {
                    pos += 1;
                    let (key, next) = parse_bare(input, pos)?;
                    segments.push(Segment::Key(key));
                    pos = next;
                }
                _ if segments.is_empty() => {
                    let (key, next) = parse_bare(input, pos)?;
                    segments.push(Segment::Key(key));
                    pos = next;
                }
                _ => return Err(PathParseError::new(pos, "expected '.' or '['")),
            }
        }

        Ok(Self { segments })
    }
}

/// Parses a bare key starting at `start`, returning it and the next offset.
fn parse_bare(input: &str, start: usize) -> Result<(String, usize), PathParseError> {
    let rest = &input[start..];
    let len = rest.find(['.', '[', ']', '"']).unwrap_or(rest.len());
    if len == 0 {
        return Err(PathParseError::new(start, "expected a key"));
    }
    Ok((rest[..len].to_string(), start + len))
}

/// Parses `[n]` or `["key"]` starting at the `[` at `start`.
fn parse_bracket(input: &str, start: usize) -> Result<(Segment, usize), PathParseError> {
    let bytes = input.as_bytes();
    let open = start + 1;

    if bytes.get(open) == Some(&b'"') {
        let mut i = open + 1;
        let mut escaped = false;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' if !escaped => escaped = true,
                b'"' if !escaped => break,
                _ => escaped = false,
            }
            i += 1;
        }
        if i >= bytes.len() {
            return Err(PathParseError::new(open, "unterminated quoted key"));
        }
        let key: String = serde_json::from_str(&input[open..=i])
            .map_err(|_| PathParseError::new(open, "invalid quoted key"))?;
        if bytes.get(i + 1) != Some(&b']') {
            return Err(PathParseError::new(i + 1, "expected ']'"));
        }
        return Ok((Segment::Key(key), i + 2));
    }

    let close = input[open..]
        .find(']')
        .map(|offset| open + offset)
        .ok_or_else(|| PathParseError::new(open, "expected ']'"))?;
    let index = input[open..close]
        .parse::<usize>()
        .map_err(|_| PathParseError::new(open, "expected an array index"))?;
    Ok((Segment::Index(index), close + 1))
}

impl Serialize for JsonPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JsonPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
