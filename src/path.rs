//! Path addressing for configuration trees
//!
//! A [`Path`] is an ordered sequence of segments locating a subtree inside a
//! configuration tree; [`Path::root`] is the empty sequence. The textual form
//! is dotted and escaped:
//!
//! - Dot notation: `foo.bar.baz`
//! - List indices: `foo[0]` or `items[1].name`
//! - Bracket-quoted keys: `config["special.key"]` or `config['special.key']`
//! - Escaped characters: `foo\.bar` (literal dot)
//!
//! The by-uuid reference form `//*[_.uuid='{uuid}']` parses into a single
//! [`PathSegment::Reference`] segment. Reference segments are resolved either
//! by a full tree scan (plain backends) or by the uuid index (the indexing
//! decorator).
//!
//! Malformed input fails fast with [`Error::PathSyntax`]; it is never
//! deferred to a later tree operation.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Represents one segment in a path locating a subtree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A named key for accessing object members
    Key(String),
    /// A numeric index for accessing list elements
    Index(usize),
    /// A by-uuid reference, resolved against the whole tree
    Reference(String),
}

/// An ordered sequence of path segments; the empty sequence addresses the
/// configuration root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path {
    segments: Vec<PathSegment>,
}

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^//\*\[_\.uuid='([^']+)'\]$").expect("valid regex"))
}

impl Path {
    /// The empty path addressing the configuration root
    pub fn root() -> Self {
        Path::default()
    }

    /// True if this path addresses the configuration root
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True if the path has no segments (same as [`Path::is_root`])
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Borrow the segments
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// The last segment, if any
    pub fn last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    /// True if any segment is a by-uuid reference
    pub fn has_reference(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, PathSegment::Reference(_)))
    }

    /// Extend this path with a key segment
    pub fn child(&self, key: &str) -> Path {
        let mut path = self.clone();
        path.segments.push(PathSegment::Key(key.to_string()));
        path
    }

    /// Extend this path with an index segment
    pub fn item(&self, index: usize) -> Path {
        let mut path = self.clone();
        path.segments.push(PathSegment::Index(index));
        path
    }

    /// Concatenate two paths
    pub fn join(&self, other: &Path) -> Path {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Path { segments }
    }

    /// Append a segment in place
    pub fn push(&mut self, segment: PathSegment) {
        self.segments.push(segment);
    }

    /// Remove and return the last segment
    pub fn pop(&mut self) -> Option<PathSegment> {
        self.segments.pop()
    }

    /// The path addressing this path's parent; `None` for the root
    pub fn parent(&self) -> Option<Path> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Path {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// True if `prefix` is an ancestor of (or equal to) this path
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Parse a path from its dotted/escaped textual form.
    ///
    /// `""` and `"/"` parse as the root path. The reference form
    /// `//*[_.uuid='{uuid}']` parses into a single reference segment; any
    /// other use of `//` is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PathSyntax`] on empty segments, unclosed brackets,
    /// empty bracket expressions, trailing escapes, and malformed reference
    /// forms.
    pub fn parse(path: &str) -> Result<Path> {
        let syntax_err = |message: &str| Error::PathSyntax {
            path: path.to_string(),
            message: message.to_string(),
        };

        if path.trim().is_empty() || path == "/" {
            return Ok(Path::root());
        }

        if path.starts_with("//") {
            return match reference_regex().captures(path) {
                Some(captures) => Ok(Path {
                    segments: vec![PathSegment::Reference(captures[1].to_string())],
                }),
                None => Err(syntax_err("double slashes are only valid in //*[_.uuid='...']")),
            };
        }

        let mut segments = Vec::new();
        let mut current = String::new();
        let mut seen_any = false;
        let mut after_bracket = false;
        let mut chars = path.chars().peekable();
        let mut escaped = false;

        while let Some(ch) = chars.next() {
            if escaped {
                current.push(ch);
                escaped = false;
                after_bracket = false;
                continue;
            }

            match ch {
                '\\' => {
                    escaped = true;
                }
                '.' => {
                    if current.is_empty() && !after_bracket {
                        if !seen_any {
                            return Err(syntax_err("path must not start with '.'"));
                        }
                        return Err(syntax_err("empty path segment"));
                    }
                    if !current.is_empty() {
                        segments.push(PathSegment::Key(current.clone()));
                        current.clear();
                    }
                    seen_any = true;
                    after_bracket = false;
                }
                '[' => {
                    if !current.is_empty() {
                        segments.push(PathSegment::Key(current.clone()));
                        current.clear();
                    }
                    seen_any = true;
                    after_bracket = true;

                    let first_char = chars.peek().copied();
                    if first_char == Some('"') || first_char == Some('\'') {
                        let quote_char = chars.next().expect("peeked");
                        let mut key = String::new();
                        let mut bracket_escaped = false;
                        let mut closed = false;

                        for ch in chars.by_ref() {
                            if bracket_escaped {
                                key.push(ch);
                                bracket_escaped = false;
                            } else if ch == '\\' {
                                bracket_escaped = true;
                            } else if ch == quote_char {
                                closed = true;
                                break;
                            } else {
                                key.push(ch);
                            }
                        }
                        if !closed || chars.next() != Some(']') {
                            return Err(syntax_err("unclosed quoted bracket expression"));
                        }
                        segments.push(PathSegment::Key(key));
                    } else {
                        let mut bracket_content = String::new();
                        let mut closed = false;
                        for ch in chars.by_ref() {
                            if ch == ']' {
                                closed = true;
                                break;
                            }
                            bracket_content.push(ch);
                        }
                        if !closed {
                            return Err(syntax_err("unclosed bracket expression"));
                        }
                        let trimmed = bracket_content.trim();
                        if trimmed.is_empty() {
                            return Err(syntax_err("empty bracket expression"));
                        }
                        match trimmed.parse::<usize>() {
                            Ok(index) => segments.push(PathSegment::Index(index)),
                            Err(_) => segments.push(PathSegment::Key(trimmed.to_string())),
                        }
                    }
                }
                _ => {
                    current.push(ch);
                    after_bracket = false;
                }
            }
        }

        if escaped {
            return Err(syntax_err("trailing escape character"));
        }
        if !current.is_empty() {
            segments.push(PathSegment::Key(current));
        } else if matches!(path.chars().last(), Some('.')) {
            return Err(syntax_err("path must not end with '.'"));
        }

        Ok(Path { segments })
    }
}

impl From<Vec<PathSegment>> for Path {
    fn from(segments: Vec<PathSegment>) -> Self {
        Path { segments }
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Path> {
        Path::parse(s)
    }
}

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for ch in key.chars() {
        if matches!(ch, '\\' | '.' | '[' | ']') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        let mut first = true;
        for segment in &self.segments {
            match segment {
                PathSegment::Key(key) => {
                    if !first {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", escape_key(key))?;
                }
                PathSegment::Index(index) => {
                    write!(f, "[{}]", index)?;
                }
                PathSegment::Reference(uuid) => {
                    if !first {
                        write!(f, ".")?;
                    }
                    write!(f, "//*[_.uuid='{}']", uuid)?;
                }
            }
            first = false;
        }
        Ok(())
    }
}
