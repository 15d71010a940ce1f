//! Attractor groups: the matching profile of one interaction or one tape.

use super::bit::AttractorBit;
use super::score::MatchScore;
use super::{AttractorError, Fingerprint};
use serde::{Deserialize, Deserializer, Serialize};

/// HTTP methods that always carry a request body.
const BODY_METHODS: &[&str] = &["POST", "PUT", "PATCH", "PROPPATCH", "REPORT"];

/// Whether `method` mandates a request body.
pub fn method_requires_body(method: &str) -> bool {
    BODY_METHODS
        .iter()
        .any(|m| m.eq_ignore_ascii_case(method.trim()))
}

/// Matching profile: an optional routing path bit plus query and body bits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttractorGroup {
    #[serde(default)]
    pub routing_path: Option<AttractorBit>,
    #[serde(
        default,
        rename = "queryParamMatchers",
        deserialize_with = "nullable_bits"
    )]
    pub query_params: Vec<AttractorBit>,
    #[serde(
        default,
        rename = "queryBodyMatchers",
        deserialize_with = "nullable_bits"
    )]
    pub body: Vec<AttractorBit>,
}

fn nullable_bits<'de, D>(deserializer: D) -> Result<Vec<AttractorBit>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<AttractorBit>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl AttractorGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a group that matches the given request literally.
    ///
    /// Every path and `key=value` query pair becomes an escaped literal bit; a
    /// catch-all body bit is added when the method mandates a body.
    pub fn from_request(method: &str, path: &str, query: Option<&str>) -> Result<Self, AttractorError> {
        let path = path.trim_start_matches('/');
        let routing_path = if path.is_empty() {
            None
        } else {
            Some(AttractorBit::literal(path)?)
        };

        let query_params = query
            .map(|q| {
                q.split('&')
                    .filter(|pair| !pair.is_empty())
                    .map(|pair| AttractorBit::literal(decode_pair(pair)))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let body = if method_requires_body(method) {
            vec![AttractorBit::new(".*")?]
        } else {
            Vec::new()
        };

        Ok(Self {
            routing_path,
            query_params,
            body,
        })
    }

    pub fn with_path(mut self, bit: AttractorBit) -> Self {
        self.routing_path = Some(bit);
        self
    }

    pub fn with_param(mut self, bit: AttractorBit) -> Self {
        self.query_params.push(bit);
        self
    }

    pub fn with_body(mut self, bit: AttractorBit) -> Self {
        self.body.push(bit);
        self
    }

    /// True when any of the three slots carries data.
    pub fn has_data(&self) -> bool {
        self.routing_path
            .as_ref()
            .is_some_and(|bit| !bit.pattern().trim().is_empty())
            || !self.query_params.is_empty()
            || !self.body.is_empty()
    }

    /// Merge `other` into this group.
    ///
    /// Bits already present are skipped, and an existing routing path is
    /// never overwritten.
    pub fn append(&mut self, other: &AttractorGroup) {
        if self.routing_path.is_none() {
            self.routing_path = other.routing_path.clone();
        }

        for bit in &other.query_params {
            if !self.query_params.contains(bit) {
                self.query_params.push(bit.clone());
            }
        }

        for bit in &other.body {
            if !self.body.contains(bit) {
                self.body.push(bit.clone());
            }
        }
    }

    /// Score the routing path. The path bit is always treated as required.
    pub fn matches_path(&self, source: Option<&str>) -> MatchScore {
        match &self.routing_path {
            Some(bit) => score_bits(std::slice::from_ref(&bit.with_required(true)), source),
            None => score_bits(&[], source),
        }
    }

    pub fn matches_params(&self, source: Option<&str>) -> MatchScore {
        score_bits(&self.query_params, source)
    }

    pub fn matches_body(&self, source: Option<&str>) -> MatchScore {
        score_bits(&self.body, source)
    }

    /// Score all three dimensions of `fingerprint`, stopping at the first
    /// dimension that leaves the required rules unsatisfied.
    pub fn score(&self, fingerprint: &Fingerprint) -> MatchScore {
        let mut total = self.matches_path(Some(fingerprint.path.as_str()));
        if !total.satisfies_required() {
            return total;
        }

        total.accumulate(&self.matches_params(fingerprint.query.as_deref()));
        if !total.satisfies_required() {
            return total;
        }

        total.accumulate(&self.matches_body(fingerprint.body.as_deref()));
        total
    }
}

fn decode_pair(pair: &str) -> String {
    urlencoding::decode(pair)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| pair.to_string())
}

/// Score `bits` against one request dimension.
///
/// - no bits: passes unless `source` has content, which counts as one failed
///   required rule;
/// - only empty patterns: the impossible sentinel;
/// - `None` source: every required bit fails;
/// - otherwise required bits gate the result and optional bits only add to
///   the optional tally.
pub(crate) fn score_bits(bits: &[AttractorBit], source: Option<&str>) -> MatchScore {
    if bits.is_empty() {
        return match source {
            Some(s) if !s.is_empty() => MatchScore::failed(1),
            _ => MatchScore::empty(),
        };
    }

    if bits.iter().all(AttractorBit::is_empty) {
        return MatchScore::impossible();
    }

    let required_total = bits.iter().filter(|b| b.is_required()).count() as i32;
    let Some(source) = source else {
        return MatchScore::failed(required_total);
    };

    let mut score = MatchScore::failed(required_total);
    for bit in bits {
        let Some(ratio) = bit.evaluate(source) else {
            continue;
        };
        if bit.is_required() {
            score.required_matched += 1;
            score.required_ratio += ratio;
        } else {
            score.optional_matched += 1;
            score.optional_ratio += ratio;
        }
    }
    score
}
