//! Attractor matching for Tapedeck.
//!
//! An attractor decides whether an incoming request "belongs to" a chapter or
//! a tape. This module provides:
//! - `AttractorBit`: one regex rule with required/optional and negate flags
//! - `AttractorGroup`: routing path, query and body bits for one profile
//! - `MatchScore`: the outcome of scoring a group against a request
//! - `BestMatchSelector`: picks a unique winner across candidates or reports a tie
//!
//! ## Module Structure
//!
//! - `bit`: the atomic rule and its wire form
//! - `group`: per-dimension scoring and request-derived groups
//! - `score`: scores and the pluggable ranking strategy
//! - `selector`: cross-candidate selection

mod bit;
mod group;
mod score;
mod selector;

pub use bit::AttractorBit;
pub use group::{method_requires_body, AttractorGroup};
pub use score::{LexicographicRanking, MatchScore, ScoreRanking};
pub use selector::{BestMatchSelector, MissReason, Selection};

use thiserror::Error;

/// Errors raised while building attractors.
#[derive(Debug, Error)]
pub enum AttractorError {
    #[error("Malformed attractor pattern '{pattern}': {reason}")]
    MalformedPattern { pattern: String, reason: String },
}

/// The three request dimensions an attractor group is scored against.
///
/// `path` has its leading `/` removed, `query` is percent-decoded, and an
/// empty query or body is `None`. Requests whose method carries a body keep
/// an empty body as `Some("")` (see [`Fingerprint::for_method`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub path: String,
    pub query: Option<String>,
    pub body: Option<String>,
}

impl Fingerprint {
    pub fn new(path: &str, query: Option<&str>, body: Option<&str>) -> Self {
        let query = query.filter(|q| !q.is_empty()).map(|q| {
            urlencoding::decode(q)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| q.to_string())
        });
        Self {
            path: path.trim_start_matches('/').to_string(),
            query,
            body: body.filter(|b| !b.is_empty()).map(str::to_string),
        }
    }

    /// Fingerprint for a request sent with `method`. A body-carrying method
    /// always has a body dimension, so an empty body stays `Some("")` and is
    /// matched by catch-all body bits.
    pub fn for_method(method: &str, path: &str, query: Option<&str>, body: Option<&str>) -> Self {
        let mut fingerprint = Self::new(path, query, body);
        if method_requires_body(method) && fingerprint.body.is_none() {
            fingerprint.body = Some(String::new());
        }
        fingerprint
    }

    /// The same request with the body dimension removed.
    pub fn without_body(&self) -> Self {
        Self {
            body: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fingerprint_normalizes_parts() {
        let fp = Fingerprint::new("/orders/1", Some("name=a%20b"), Some(""));
        assert_eq!(fp.path, "orders/1");
        assert_eq!(fp.query.as_deref(), Some("name=a b"));
        assert!(fp.body.is_none());

        let fp = Fingerprint::new("/", Some(""), None);
        assert_eq!(fp.path, "");
        assert!(fp.query.is_none());
    }

    #[test]
    fn test_body_methods_keep_empty_body() {
        let fp = Fingerprint::for_method("POST", "/ping", None, Some(""));
        assert_eq!(fp.body.as_deref(), Some(""));

        let fp = Fingerprint::for_method("patch", "/ping", None, None);
        assert_eq!(fp.body.as_deref(), Some(""));

        let fp = Fingerprint::for_method("GET", "/ping", None, Some(""));
        assert!(fp.body.is_none());

        let group = AttractorGroup::from_request("POST", "/ping", None).unwrap();
        assert!(group
            .score(&Fingerprint::for_method("POST", "/ping", None, Some("")))
            .satisfies_required());
    }

    #[test]
    fn test_without_body() {
        let fp = Fingerprint::new("/a", None, Some("{}"));
        assert!(fp.without_body().body.is_none());
        assert_eq!(fp.without_body().path, "a");
    }

    fn word() -> impl Strategy<Value = String> {
        "[a-z]{1,8}"
    }

    fn group_strategy() -> impl Strategy<Value = AttractorGroup> {
        (
            proptest::option::of(word()),
            proptest::collection::vec((word(), any::<bool>(), any::<bool>()), 0..4),
            proptest::collection::vec((word(), any::<bool>()), 0..3),
        )
            .prop_map(|(path, params, body)| {
                let mut group = AttractorGroup::new();
                if let Some(path) = path {
                    group = group.with_path(AttractorBit::new(path).unwrap());
                }
                for (p, optional, negate) in params {
                    group = group.with_param(
                        AttractorBit::new(p).unwrap().optional(optional).negated(negate),
                    );
                }
                for (b, optional) in body {
                    group = group.with_body(AttractorBit::new(b).unwrap().optional(optional));
                }
                group
            })
    }

    proptest! {
        #[test]
        fn prop_append_is_idempotent(a in group_strategy(), b in group_strategy()) {
            let mut once = a.clone();
            once.append(&b);
            let mut twice = once.clone();
            twice.append(&b);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_negate_inverts_hit(pattern in word(), source in "[a-z]{0,12}") {
            let plain = AttractorBit::new(&pattern).unwrap();
            let negated = plain.clone().negated(true);
            prop_assert_ne!(plain.evaluate(&source).is_some(), negated.evaluate(&source).is_some());
        }

        #[test]
        fn prop_empty_group_satisfied_by_empty_request(_seed in 0u8..4) {
            let score = AttractorGroup::new().score(&Fingerprint::new("", None, None));
            prop_assert!(score.satisfies_required());
        }

        #[test]
        fn prop_empty_patterns_are_impossible(count in 1usize..4, source in proptest::option::of("[a-z=&]{0,10}")) {
            let mut group = AttractorGroup::new();
            for _ in 0..count {
                group = group.with_param(AttractorBit::new("").unwrap());
            }
            prop_assert!(group.matches_params(source.as_deref()).is_impossible());
        }
    }
}
