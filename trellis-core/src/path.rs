// Path templates and segment matching

use crate::{Error, Result};
use regex::Regex;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::sync::Arc;

/// One segment of a path template
#[derive(Debug, Clone)]
pub enum Segment {
    Literal(String),
    Param {
        name: String,
        constraint: Option<Regex>,
    },
}

impl Segment {
    /// literal > constrained param > plain param
    fn rank(&self) -> u8 {
        match self {
            Segment::Literal(_) => 2,
            Segment::Param {
                constraint: Some(_),
                ..
            } => 1,
            Segment::Param { .. } => 0,
        }
    }
}

/// A parsed route path such as `/users/{id}/posts/{post: [0-9]+}`.
///
/// `:id` is accepted as shorthand for `{id}`.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
    names: Arc<[String]>,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let raw = normalize(template);
        let mut segments = Vec::new();
        let mut names: Vec<String> = Vec::new();

        for part in split_segments(&raw) {
            let segment = parse_segment(part, template)?;
            if let Segment::Param { name, .. } = &segment {
                if names.contains(name) {
                    return Err(Error::InvalidRoute(format!(
                        "duplicate parameter `{}` in `{}`",
                        name, template
                    )));
                }
                names.push(name.clone());
            }
            segments.push(segment);
        }

        Ok(Self {
            raw,
            segments,
            names: names.into(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn param_names(&self) -> &Arc<[String]> {
        &self.names
    }

    /// Identity of the template with parameter names erased: `/users/{id}`
    /// and `/users/{userId}` are the same path.
    pub fn key(&self) -> String {
        let mut key = String::new();
        for segment in &self.segments {
            key.push('/');
            match segment {
                Segment::Literal(literal) => key.push_str(literal),
                Segment::Param {
                    constraint: Some(regex),
                    ..
                } => {
                    key.push_str("{:");
                    key.push_str(regex.as_str());
                    key.push('}');
                }
                Segment::Param { .. } => key.push_str("{}"),
            }
        }
        if key.is_empty() {
            key.push('/');
        }
        key
    }

    /// Positional comparison: the first segment where the ranks differ
    /// decides, then the longer template wins.
    pub fn cmp_specificity(&self, other: &PathTemplate) -> Ordering {
        for (mine, theirs) in self.segments.iter().zip(&other.segments) {
            match mine.rank().cmp(&theirs.rank()) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.segments.len().cmp(&other.segments.len())
    }

    /// Match already-split request segments, returning the decoded
    /// parameter values in template order.
    pub fn matches(&self, request: &[&str]) -> Option<SmallVec<[String; 4]>> {
        if request.len() != self.segments.len() {
            return None;
        }

        let mut values = SmallVec::new();
        for (segment, raw) in self.segments.iter().zip(request) {
            let decoded = decode(raw);
            match segment {
                Segment::Literal(literal) => {
                    if literal.as_str() != decoded.as_ref() {
                        return None;
                    }
                }
                Segment::Param { constraint, .. } => {
                    if let Some(regex) = constraint {
                        if !regex.is_match(&decoded) {
                            return None;
                        }
                    }
                    values.push(decoded.into_owned());
                }
            }
        }
        Some(values)
    }
}

fn parse_segment(part: &str, template: &str) -> Result<Segment> {
    let invalid = |reason: &str| Error::InvalidRoute(format!("{} in `{}`", reason, template));

    if let Some(name) = part.strip_prefix(':') {
        return param(name, None).ok_or_else(|| invalid("bad parameter name"));
    }

    if let Some(inner) = part.strip_prefix('{') {
        let inner = inner
            .strip_suffix('}')
            .ok_or_else(|| invalid("unclosed `{`"))?;
        let (name, constraint) = match inner.split_once(':') {
            Some((name, pattern)) => {
                let pattern = pattern.trim();
                if pattern.is_empty() {
                    return Err(invalid("empty constraint"));
                }
                let regex = Regex::new(&format!("^(?:{})$", pattern))
                    .map_err(|e| invalid(&format!("bad constraint `{}` ({})", pattern, e)))?;
                (name, Some(regex))
            }
            None => (inner, None),
        };
        return param(name.trim(), constraint).ok_or_else(|| invalid("bad parameter name"));
    }

    if part.contains('{') || part.contains('}') {
        return Err(invalid("braces inside a literal segment"));
    }
    Ok(Segment::Literal(decode(part).into_owned()))
}

fn param(name: &str, constraint: Option<Regex>) -> Option<Segment> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    valid.then(|| Segment::Param {
        name: name.to_string(),
        constraint,
    })
}

fn decode(segment: &str) -> Cow<'_, str> {
    urlencoding::decode(segment).unwrap_or(Cow::Borrowed(segment))
}

/// Collapse duplicate slashes, ensure a leading slash and drop a trailing
/// one (except for the root).
pub fn normalize(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len() + 1);
    for segment in split_segments(path) {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}

pub fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Join a resource base path and a route path with exactly one slash.
pub fn join(base: &str, path: &str) -> String {
    normalize(&format!("{}/{}", base, path))
}

/// Path parameter values of a matched request, positional with optional
/// lookup by the template's names.
#[derive(Debug, Clone, Default)]
pub struct PathParams {
    names: Option<Arc<[String]>>,
    values: SmallVec<[String; 4]>,
}

impl PathParams {
    pub fn new(names: Arc<[String]>, values: SmallVec<[String; 4]>) -> Self {
        Self {
            names: Some(names),
            values,
        }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    pub fn named(&self, name: &str) -> Option<&str> {
        let names = self.names.as_ref()?;
        let index = names.iter().position(|n| n == name)?;
        self.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        let names = self.names.as_deref().unwrap_or(&[]);
        names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(path: &str) -> Vec<&str> {
        split_segments(path)
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("users//42/"), "/users/42");
        assert_eq!(join("/api/", "/users"), "/api/users");
        assert_eq!(join("/api", ""), "/api");
    }

    #[test]
    fn test_match_literal() {
        let t = PathTemplate::parse("/users").unwrap();
        assert!(t.matches(&segs("/users")).unwrap().is_empty());
        assert!(t.matches(&segs("/posts")).is_none());
        assert!(t.matches(&segs("/users/1")).is_none());
    }

    #[test]
    fn test_match_params_positionally() {
        let t = PathTemplate::parse("/users/{user}/posts/:post").unwrap();
        let values = t.matches(&segs("/users/7/posts/hello%20world")).unwrap();
        assert_eq!(values.as_slice(), ["7", "hello world"]);
        assert_eq!(&t.param_names()[..], ["user", "post"]);
    }

    #[test]
    fn test_constraint() {
        let t = PathTemplate::parse("/items/{id: [0-9]+}").unwrap();
        assert!(t.matches(&segs("/items/42")).is_some());
        assert!(t.matches(&segs("/items/abc")).is_none());
        assert!(t.matches(&segs("/items/42abc")).is_none());
    }

    #[test]
    fn test_root_template() {
        let t = PathTemplate::parse("/").unwrap();
        assert!(t.matches(&segs("/")).is_some());
        assert_eq!(t.key(), "/");
    }

    #[test]
    fn test_key_ignores_param_names() {
        let a = PathTemplate::parse("/users/{id}").unwrap();
        let b = PathTemplate::parse("/users/:userId/").unwrap();
        assert_eq!(a.key(), b.key());
        let c = PathTemplate::parse("/users/{id: \\d+}").unwrap();
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn test_specificity() {
        let literal = PathTemplate::parse("/users/me").unwrap();
        let constrained = PathTemplate::parse("/users/{id: \\d+}").unwrap();
        let plain = PathTemplate::parse("/users/{id}").unwrap();
        assert_eq!(literal.cmp_specificity(&plain), Ordering::Greater);
        assert_eq!(constrained.cmp_specificity(&plain), Ordering::Greater);
        assert_eq!(literal.cmp_specificity(&constrained), Ordering::Greater);
        assert_eq!(plain.cmp_specificity(&plain.clone()), Ordering::Equal);
    }

    #[test]
    fn test_invalid_templates() {
        assert!(PathTemplate::parse("/users/{id").is_err());
        assert!(PathTemplate::parse("/users/{}").is_err());
        assert!(PathTemplate::parse("/users/{a}/{a}").is_err());
        assert!(PathTemplate::parse("/users/{id: [}").is_err());
        assert!(PathTemplate::parse("/users/x{id}").is_err());
        assert!(PathTemplate::parse("/users/:").is_err());
    }

    #[test]
    fn test_path_params_lookup() {
        let t = PathTemplate::parse("/a/{x}/{y}").unwrap();
        let values = t.matches(&segs("/a/1/2")).unwrap();
        let params = PathParams::new(t.param_names().clone(), values);
        assert_eq!(params.get(1), Some("2"));
        assert_eq!(params.named("x"), Some("1"));
        assert_eq!(params.named("z"), None);
        assert_eq!(params.iter().collect::<Vec<_>>(), vec![("x", "1"), ("y", "2")]);
    }
}
