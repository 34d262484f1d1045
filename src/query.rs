//! Lite-XPath search patterns
//!
//! The restricted path-pattern language accepted by `search`: absolute
//! paths, no double slashes, `*` as a name wildcard, and only `[attr=val]` /
//! `[attr<>val]` predicates. The restriction is deliberate: it bounds query
//! cost and avoids full tree scans on arbitrary expressions.
//!
//! ```text
//! /devicesRoot/*[deviceName='scanner1']/connections
//! ```
//!
//! Predicate values may be single-quoted or bare; comparison is on the
//! primitive's canonical string form. An `<>` predicate passes when the
//! attribute is missing.
//!
//! The special by-uuid reference form `//*[_.uuid='{uuid}']` is not a search
//! step sequence; [`uuid_reference`] recognizes it so callers can resolve it
//! by index or tree scan instead.

use crate::error::{Error, Result};
use crate::node::Node;
use crate::path::{Path, PathSegment};

/// One comparison inside a step: `[attr=val]` or `[attr<>val]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    /// Attribute key looked up on the candidate node
    pub attr: String,
    /// Expected canonical string value
    pub value: String,
    /// True for `<>` (not-equal) predicates
    pub negate: bool,
}

impl Predicate {
    /// True if the candidate node satisfies this predicate
    fn matches(&self, node: &Node) -> bool {
        let actual = node.get(&self.attr).and_then(Node::primitive_text);
        let equal = actual.as_deref() == Some(self.value.as_str());
        if self.negate {
            !equal
        } else {
            equal
        }
    }
}

/// One `/`-separated step of a pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// The key to descend into, or `None` for the `*` wildcard
    pub name: Option<String>,
    /// Conjunction of predicates filtering the candidates
    pub predicates: Vec<Predicate>,
}

/// A parsed lite-XPath pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    steps: Vec<Step>,
}

impl PathPattern {
    /// Parse an absolute lite-XPath pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PatternSyntax`] for relative patterns, double
    /// slashes, empty steps, unclosed brackets, and predicates without an
    /// operator.
    pub fn parse(pattern: &str) -> Result<PathPattern> {
        let syntax_err = |message: &str| Error::PatternSyntax {
            pattern: pattern.to_string(),
            message: message.to_string(),
        };

        let rest = pattern
            .strip_prefix('/')
            .ok_or_else(|| syntax_err("pattern must be absolute"))?;
        if rest.is_empty() {
            return Ok(PathPattern { steps: Vec::new() });
        }

        let mut steps = Vec::new();
        for raw_step in split_steps(rest) {
            if raw_step.is_empty() {
                return Err(syntax_err("double slashes are not allowed"));
            }
            steps.push(parse_step(&raw_step, &syntax_err)?);
        }
        Ok(PathPattern { steps })
    }

    /// Borrow the parsed steps
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// Split the body of a pattern on `/`, honoring quotes inside predicates
fn split_steps(body: &str) -> Vec<String> {
    let mut steps = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    for ch in body.chars() {
        match ch {
            '\'' => {
                in_quote = !in_quote;
                current.push(ch);
            }
            '/' if !in_quote => {
                steps.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    steps.push(current);
    steps
}

fn parse_step(raw: &str, syntax_err: &dyn Fn(&str) -> Error) -> Result<Step> {
    let (name_part, predicate_part) = match raw.find('[') {
        Some(pos) => (&raw[..pos], &raw[pos..]),
        None => (raw, ""),
    };

    let name = match name_part.trim() {
        "" => return Err(syntax_err("step is missing a name")),
        "*" => None,
        name => Some(name.to_string()),
    };

    let mut predicates = Vec::new();
    let mut remaining = predicate_part;
    while !remaining.is_empty() {
        if !remaining.starts_with('[') {
            return Err(syntax_err("unexpected characters after predicate"));
        }
        let close = remaining
            .find(']')
            .ok_or_else(|| syntax_err("unclosed predicate bracket"))?;
        let body = &remaining[1..close];
        predicates.push(parse_predicate(body, syntax_err)?);
        remaining = &remaining[close + 1..];
    }

    Ok(Step { name, predicates })
}

fn parse_predicate(body: &str, syntax_err: &dyn Fn(&str) -> Error) -> Result<Predicate> {
    let (attr, value, negate) = if let Some(pos) = body.find("<>") {
        (&body[..pos], &body[pos + 2..], true)
    } else if let Some(pos) = body.find('=') {
        (&body[..pos], &body[pos + 1..], false)
    } else {
        return Err(syntax_err("predicate must use '=' or '<>'"));
    };

    let attr = attr.trim().trim_start_matches('@');
    if attr.is_empty() {
        return Err(syntax_err("predicate is missing an attribute name"));
    }
    let value = value.trim();
    let value = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value);

    Ok(Predicate {
        attr: attr.to_string(),
        value: value.to_string(),
        negate,
    })
}

/// Recognize the special `//*[_.uuid='{uuid}']` reference form
pub fn uuid_reference(pattern: &str) -> Option<String> {
    match Path::parse(pattern) {
        Ok(path) => match path.segments() {
            [PathSegment::Reference(uuid)] => Some(uuid.clone()),
            _ => None,
        },
        Err(_) => None,
    }
}

/// Evaluate a pattern against a tree, returning deep clones of every
/// matching node in document order.
pub fn search(root: &Node, pattern: &PathPattern) -> Vec<Node> {
    let mut current: Vec<&Node> = vec![root];
    for step in pattern.steps() {
        let mut next = Vec::new();
        for node in current {
            match node {
                Node::Object(map) => match &step.name {
                    Some(name) => {
                        if let Some(child) = map.get(name) {
                            if step.predicates.iter().all(|p| p.matches(child)) {
                                next.push(child);
                            }
                        }
                    }
                    None => {
                        for child in map.values() {
                            if step.predicates.iter().all(|p| p.matches(child)) {
                                next.push(child);
                            }
                        }
                    }
                },
                Node::List(items) => {
                    // A step applied to a list filters its elements; only the
                    // wildcard can match, elements are unnamed.
                    if step.name.is_none() {
                        for item in items {
                            if step.predicates.iter().all(|p| p.matches(item)) {
                                next.push(item);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    current.into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Node {
        Node::from_json_str(
            r#"{
                "devicesRoot": {
                    "scanner1": {"deviceName": "scanner1", "installed": true, "port": 104},
                    "scanner2": {"deviceName": "scanner2", "installed": false, "port": 104},
                    "viewer": {"deviceName": "viewer"}
                },
                "connections": [
                    {"cn": "dicom", "port": 11112},
                    {"cn": "dicom-tls", "port": 2762}
                ]
            }"#,
        )
        .unwrap()
    }

    mod parse_tests {
        use super::*;

        #[test]
        fn test_parse_steps_and_predicates() {
            let pattern = PathPattern::parse("/devicesRoot/*[deviceName='scanner1']").unwrap();
            assert_eq!(pattern.steps().len(), 2);
            assert_eq!(pattern.steps()[0].name.as_deref(), Some("devicesRoot"));
            assert!(pattern.steps()[1].name.is_none());
            assert_eq!(
                pattern.steps()[1].predicates,
                vec![Predicate {
                    attr: "deviceName".to_string(),
                    value: "scanner1".to_string(),
                    negate: false,
                }]
            );
        }

        #[test]
        fn test_parse_not_equal_and_bare_value() {
            let pattern = PathPattern::parse("/a/*[installed<>true][port=104]").unwrap();
            let step = &pattern.steps()[1];
            assert_eq!(step.predicates.len(), 2);
            assert!(step.predicates[0].negate);
            assert_eq!(step.predicates[0].value, "true");
            assert!(!step.predicates[1].negate);
            assert_eq!(step.predicates[1].value, "104");
        }

        #[test]
        fn test_parse_at_prefix_is_tolerated() {
            let pattern = PathPattern::parse("/a/*[@name='x']").unwrap();
            assert_eq!(pattern.steps()[1].predicates[0].attr, "name");
        }

        #[test]
        fn test_parse_root_pattern() {
            assert!(PathPattern::parse("/").unwrap().steps().is_empty());
        }

        #[test]
        fn test_parse_rejects_malformed_patterns() {
            assert!(PathPattern::parse("relative/path").is_err());
            assert!(PathPattern::parse("/a//b").is_err());
            assert!(PathPattern::parse("/a/*[noop]").is_err());
            assert!(PathPattern::parse("/a/*[x='1'").is_err());
            assert!(PathPattern::parse("/a/[x='1']").is_err());
        }

        #[test]
        fn test_quoted_value_may_contain_slash() {
            let pattern = PathPattern::parse("/a/*[path='x/y']").unwrap();
            assert_eq!(pattern.steps().len(), 2);
            assert_eq!(pattern.steps()[1].predicates[0].value, "x/y");
        }
    }

    mod uuid_reference_tests {
        use super::*;

        #[test]
        fn test_uuid_reference_recognized() {
            assert_eq!(
                uuid_reference("//*[_.uuid='u-42']"),
                Some("u-42".to_string())
            );
        }

        #[test]
        fn test_other_patterns_not_recognized() {
            assert_eq!(uuid_reference("/devicesRoot"), None);
            assert_eq!(uuid_reference("//*[name='x']"), None);
        }
    }

    mod search_tests {
        use super::*;

        #[test]
        fn test_search_named_steps() {
            let results = search(
                &sample(),
                &PathPattern::parse("/devicesRoot/scanner1").unwrap(),
            );
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].get("port").and_then(Node::as_i64), Some(104));
        }

        #[test]
        fn test_search_wildcard_with_predicate() {
            let results = search(
                &sample(),
                &PathPattern::parse("/devicesRoot/*[installed=true]").unwrap(),
            );
            assert_eq!(results.len(), 1);
            assert_eq!(
                results[0].get("deviceName").and_then(Node::as_str),
                Some("scanner1")
            );
        }

        #[test]
        fn test_search_not_equal_passes_when_attr_missing() {
            let results = search(
                &sample(),
                &PathPattern::parse("/devicesRoot/*[installed<>true]").unwrap(),
            );
            let names: Vec<&str> = results
                .iter()
                .filter_map(|n| n.get("deviceName").and_then(Node::as_str))
                .collect();
            assert_eq!(names, vec!["scanner2", "viewer"]);
        }

        #[test]
        fn test_search_filters_list_elements() {
            let results = search(
                &sample(),
                &PathPattern::parse("/connections/*[cn='dicom-tls']").unwrap(),
            );
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].get("port").and_then(Node::as_i64), Some(2762));
        }

        #[test]
        fn test_search_no_match_is_empty() {
            let results = search(
                &sample(),
                &PathPattern::parse("/devicesRoot/*[deviceName='ghost']").unwrap(),
            );
            assert!(results.is_empty());
        }

        #[test]
        fn test_search_results_are_clones() {
            let root = sample();
            let mut results = search(&root, &PathPattern::parse("/devicesRoot/scanner1").unwrap());
            if let Some(map) = results[0].as_object_mut() {
                map.insert("mutated".to_string(), Node::Bool(true));
            }
            // The source tree is unaffected.
            assert!(root
                .get("devicesRoot")
                .and_then(|n| n.get("scanner1"))
                .and_then(|n| n.get("mutated"))
                .is_none());
        }
    }
}
