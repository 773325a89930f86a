//! Media types and `Accept` negotiation.
//!
//! Compatibility follows the usual type/subtype/wildcard rule: `*/*` matches
//! everything, `text/*` matches every `text` subtype, anything else must
//! match exactly. Parameters are kept for output but ignored when matching.
//!
//! ```
//! use trellis_core::media_type::{Accept, MediaType, negotiate};
//!
//! let accept = Accept::parse("application/json, text/html;q=0.9, */*;q=0.1");
//! let available = vec![MediaType::html(), MediaType::json()];
//! let (best, quality) = negotiate(&accept, &available).unwrap();
//! assert_eq!(best, MediaType::json());
//! assert_eq!(quality, 1.0);
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A media type (MIME type) with optional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    pub type_: String,
    pub subtype: String,
    pub params: BTreeMap<String, String>,
}

impl MediaType {
    pub fn new(type_: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            type_: type_.into().to_ascii_lowercase(),
            subtype: subtype.into().to_ascii_lowercase(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .insert(key.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn json() -> Self {
        Self::new("application", "json")
    }

    pub fn html() -> Self {
        Self::new("text", "html")
    }

    pub fn plain_text() -> Self {
        Self::new("text", "plain")
    }

    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    pub fn form_urlencoded() -> Self {
        Self::new("application", "x-www-form-urlencoded")
    }

    /// `*/*`
    pub fn any() -> Self {
        Self::new("*", "*")
    }

    /// Parse a media type, dropping any `q` parameter.
    ///
    /// Returns `None` for values without a `/`, with empty halves, or with a
    /// wildcard type but concrete subtype (`*/json`).
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split(';');
        let (type_, subtype) = parts.next()?.trim().split_once('/')?;
        let (type_, subtype) = (type_.trim(), subtype.trim());

        if type_.is_empty() || subtype.is_empty() || (type_ == "*" && subtype != "*") {
            return None;
        }

        let mut media_type = Self::new(type_, subtype);
        for param in parts {
            if let Some((key, value)) = param.split_once('=') {
                let key = key.trim().to_ascii_lowercase();
                if key != "q" && !key.is_empty() {
                    media_type
                        .params
                        .insert(key, value.trim().trim_matches('"').to_string());
                }
            }
        }
        Some(media_type)
    }

    /// Wildcard-aware compatibility, symmetric in its arguments.
    pub fn matches(&self, other: &MediaType) -> bool {
        let type_matches = self.type_ == "*" || other.type_ == "*" || self.type_ == other.type_;
        let subtype_matches =
            self.subtype == "*" || other.subtype == "*" || self.subtype == other.subtype;
        type_matches && subtype_matches
    }

    pub fn is_wildcard(&self) -> bool {
        self.type_ == "*" || self.subtype == "*"
    }

    /// Structured syntax suffix, `json` for `application/problem+json`.
    pub fn suffix(&self) -> Option<&str> {
        self.subtype.rsplit_once('+').map(|(_, suffix)| suffix)
    }

    /// Whether this type carries JSON, directly or via a `+json` suffix.
    pub fn is_json(&self) -> bool {
        self.subtype == "json" || self.suffix() == Some("json")
    }

    /// 3 for `a/b`, 2 for `a/*`, 0 for `*/*`; parameters add a fraction.
    pub(crate) fn specificity(&self) -> u8 {
        let mut score = 0u8;
        if self.type_ != "*" {
            score += 4;
        }
        if self.subtype != "*" {
            score += 2;
        }
        if !self.params.is_empty() {
            score += 1;
        }
        score
    }

    /// `type/subtype` without parameters.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.type_, self.subtype)
    }

    pub fn to_header_value(&self) -> String {
        let mut value = self.essence();
        for (key, param) in &self.params {
            value.push_str("; ");
            value.push_str(key);
            value.push('=');
            value.push_str(param);
        }
        value
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_header_value())
    }
}

impl std::str::FromStr for MediaType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MediaType::parse(s).ok_or_else(|| crate::Error::InvalidRoute(format!("bad media type `{}`", s)))
    }
}

/// A parsed `Accept` header.
#[derive(Debug, Clone)]
pub struct Accept {
    /// Ranges sorted by quality, then specificity, then header order.
    pub ranges: Vec<(MediaType, f32)>,
}

impl Default for Accept {
    fn default() -> Self {
        Self::any()
    }
}

impl Accept {
    /// Accepts anything, the meaning of a missing header.
    pub fn any() -> Self {
        Self {
            ranges: vec![(MediaType::any(), 1.0)],
        }
    }

    /// Parse an `Accept` header. Unparseable ranges are skipped; a header
    /// with nothing usable in it accepts anything.
    pub fn parse(header: &str) -> Self {
        let mut ranges: Vec<(MediaType, f32)> = header
            .split(',')
            .filter_map(|part| {
                let part = part.trim();
                if part.is_empty() {
                    return None;
                }
                MediaType::parse(part).map(|media_type| (media_type, Self::quality_of(part)))
            })
            .collect();

        if ranges.is_empty() {
            return Self::any();
        }

        // stable: equal entries keep header order
        ranges.sort_by(|a, b| match b.1.partial_cmp(&a.1) {
            Some(Ordering::Equal) | None => b.0.specificity().cmp(&a.0.specificity()),
            Some(ord) => ord,
        });

        Self { ranges }
    }

    /// Accept built from an optional header value.
    pub fn from_header(header: Option<&str>) -> Self {
        match header {
            Some(value) if !value.trim().is_empty() => Self::parse(value),
            _ => Self::any(),
        }
    }

    fn quality_of(range: &str) -> f32 {
        range
            .split(';')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("q"))
            .and_then(|(_, value)| value.trim().parse::<f32>().ok())
            .map(|q| q.clamp(0.0, 1.0))
            .unwrap_or(1.0)
    }

    /// Quality the client gives `media_type`: the q of the most specific
    /// matching range, the highest q among equally specific ones, 0 when
    /// nothing matches.
    pub fn quality_for(&self, media_type: &MediaType) -> f32 {
        self.ranges
            .iter()
            .filter(|(range, _)| range.matches(media_type))
            .max_by(|a, b| {
                a.0.specificity()
                    .cmp(&b.0.specificity())
                    .then(a.1.total_cmp(&b.1))
            })
            .map(|(_, quality)| *quality)
            .unwrap_or(0.0)
    }

    pub fn accepts(&self, media_type: &MediaType) -> bool {
        self.quality_for(media_type) > 0.0
    }

    /// Best concrete range compatible with `media_type`.
    fn concrete_for(&self, media_type: &MediaType) -> Option<&MediaType> {
        self.ranges
            .iter()
            .filter(|(range, quality)| *quality > 0.0 && !range.is_wildcard())
            .map(|(range, _)| range)
            .find(|range| range.matches(media_type))
    }
}

/// Pick the available type the client prefers.
///
/// Ties on quality go to the more specific available type, then to the
/// earlier one. A wildcard winner is narrowed to the client's best concrete
/// range inside it; when the client named none the wildcard is returned
/// as is and the entity writer picks the concrete type.
pub fn negotiate(accept: &Accept, available: &[MediaType]) -> Option<(MediaType, f32)> {
    let mut best: Option<(&MediaType, f32)> = None;

    for candidate in available {
        let quality = accept.quality_for(candidate);
        if quality <= 0.0 {
            continue;
        }
        let better = match best {
            None => true,
            Some((current, current_q)) => {
                quality > current_q
                    || (quality == current_q && candidate.specificity() > current.specificity())
            }
        };
        if better {
            best = Some((candidate, quality));
        }
    }

    best.map(|(media_type, quality)| {
        if media_type.is_wildcard() {
            let narrowed = accept
                .concrete_for(media_type)
                .cloned()
                .unwrap_or_else(|| media_type.clone());
            (narrowed, quality)
        } else {
            (media_type.clone(), quality)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_params() {
        let mt = MediaType::parse("Text/HTML; charset=UTF-8; q=0.5").unwrap();
        assert_eq!(mt.type_, "text");
        assert_eq!(mt.subtype, "html");
        assert_eq!(mt.params.get("charset").map(String::as_str), Some("UTF-8"));
        assert!(!mt.params.contains_key("q"));
        assert_eq!(mt.to_header_value(), "text/html; charset=UTF-8");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(MediaType::parse("json").is_none());
        assert!(MediaType::parse("/json").is_none());
        assert!(MediaType::parse("*/json").is_none());
        assert!(MediaType::parse("").is_none());
    }

    #[test]
    fn test_wildcard_matching() {
        let json = MediaType::json();
        assert!(MediaType::any().matches(&json));
        assert!(MediaType::new("application", "*").matches(&json));
        assert!(!MediaType::new("text", "*").matches(&json));
        assert!(!MediaType::plain_text().matches(&json));
    }

    #[test]
    fn test_json_suffix() {
        let problem = MediaType::parse("application/problem+json").unwrap();
        assert_eq!(problem.suffix(), Some("json"));
        assert!(problem.is_json());
        assert!(!MediaType::plain_text().is_json());
    }

    #[test]
    fn test_accept_sorted_by_quality() {
        let accept = Accept::parse("text/html;q=0.5, application/json, */*;q=0.1");
        assert_eq!(accept.ranges[0].0, MediaType::json());
        assert_eq!(accept.ranges[1].0, MediaType::html());
        assert!(accept.ranges[2].0.is_wildcard());
    }

    #[test]
    fn test_quality_uses_most_specific_range() {
        let accept = Accept::parse("*/*, text/html;q=0");
        assert_eq!(accept.quality_for(&MediaType::html()), 0.0);
        assert_eq!(accept.quality_for(&MediaType::json()), 1.0);
        assert!(!accept.accepts(&MediaType::html()));
    }

    #[test]
    fn test_quality_clamped() {
        let accept = Accept::parse("text/plain;q=7");
        assert_eq!(accept.quality_for(&MediaType::plain_text()), 1.0);
    }

    #[test]
    fn test_empty_header_accepts_anything() {
        assert!(Accept::from_header(None).accepts(&MediaType::json()));
        assert!(Accept::from_header(Some("  ")).accepts(&MediaType::json()));
        assert!(Accept::parse("garbage").accepts(&MediaType::json()));
    }

    #[test]
    fn test_negotiate_prefers_quality() {
        let accept = Accept::parse("text/plain;q=0.4, application/json;q=0.8");
        let (best, q) = negotiate(&accept, &[MediaType::plain_text(), MediaType::json()]).unwrap();
        assert_eq!(best, MediaType::json());
        assert_eq!(q, 0.8);
    }

    #[test]
    fn test_negotiate_none_acceptable() {
        let accept = Accept::parse("application/json");
        assert!(negotiate(&accept, &[MediaType::plain_text()]).is_none());
    }

    #[test]
    fn test_negotiate_narrows_wildcard() {
        let accept = Accept::parse("text/csv, */*;q=0.1");
        let (best, _) = negotiate(&accept, &[MediaType::new("text", "*")]).unwrap();
        assert_eq!(best, MediaType::new("text", "csv"));

        let (kept, _) = negotiate(&Accept::any(), &[MediaType::new("text", "*")]).unwrap();
        assert_eq!(kept, MediaType::new("text", "*"));

        // a concrete client range outside the produces range is not taken
        let accept = Accept::parse("application/json, */*;q=0.5");
        let (kept, quality) = negotiate(&accept, &[MediaType::new("text", "*")]).unwrap();
        assert_eq!(kept, MediaType::new("text", "*"));
        assert_eq!(quality, 0.5);
    }

    #[test]
    fn test_quality_prefers_best_of_equally_specific_ranges() {
        let accept = Accept::parse("text/plain, text/html;q=0.1");
        assert_eq!(accept.quality_for(&MediaType::new("text", "*")), 1.0);

        let accept = Accept::parse("text/html;q=0.1, text/plain;q=0.7, */*;q=0.9");
        assert_eq!(accept.quality_for(&MediaType::new("text", "*")), 0.7);
        assert_eq!(accept.quality_for(&MediaType::html()), 0.1);
    }
}
