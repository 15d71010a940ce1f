//! A single attractor rule: one regex pattern with required/optional and negate flags.

use super::AttractorError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Wire form of an [`AttractorBit`].
///
/// `optional` may be absent or `null` in tape files, which means required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AttractorBitRaw {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub optional: Option<bool>,
    #[serde(default)]
    pub except: bool,
}

/// Atomic matching rule.
///
/// The pattern is compiled once at construction; an invalid pattern is
/// rejected with [`AttractorError::MalformedPattern`]. Two bits are equal when
/// their canonical form (`Req:<bool> <+|-!> {pattern}`) is equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "AttractorBitRaw", into = "AttractorBitRaw")]
pub struct AttractorBit {
    pattern: String,
    optional: Option<bool>,
    negate: bool,
    regex: Regex,
}

impl AttractorBit {
    /// Build a required, non-negated bit. A leading `/` is stripped.
    pub fn new(pattern: impl AsRef<str>) -> Result<Self, AttractorError> {
        let pattern = pattern.as_ref();
        Self::build(pattern.strip_prefix('/').unwrap_or(pattern), None, false)
    }

    /// Build a bit that matches the literal text (regex metacharacters escaped).
    pub fn literal(text: impl AsRef<str>) -> Result<Self, AttractorError> {
        let text = text.as_ref();
        Self::build(
            &regex::escape(text.strip_prefix('/').unwrap_or(text)),
            None,
            false,
        )
    }

    fn build(pattern: &str, optional: Option<bool>, negate: bool) -> Result<Self, AttractorError> {
        let regex = Regex::new(pattern).map_err(|e| AttractorError::MalformedPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            optional,
            negate,
            regex,
        })
    }

    /// Mark this bit optional (true) or required (false).
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = Some(optional);
        self
    }

    /// Invert the hit condition: the bit scores when the pattern is absent.
    pub fn negated(mut self, negate: bool) -> Self {
        self.negate = negate;
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn is_required(&self) -> bool {
        !self.optional.unwrap_or(false)
    }

    pub fn is_negated(&self) -> bool {
        self.negate
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    /// Copy of this bit with `required` forced to the given value.
    pub(crate) fn with_required(&self, required: bool) -> Self {
        let mut bit = self.clone();
        bit.optional = Some(!required);
        bit
    }

    /// Evaluate against `source`, returning the hit ratio when the bit scores.
    ///
    /// A plain hit contributes `matched_len / source_len` (1.0 for an empty
    /// source); a negated hit always contributes 1.0. Empty patterns never hit.
    pub fn evaluate(&self, source: &str) -> Option<f64> {
        if self.pattern.is_empty() {
            return None;
        }

        match (self.regex.find(source), self.negate) {
            (Some(found), false) => {
                if source.is_empty() {
                    Some(1.0)
                } else {
                    Some(found.as_str().len() as f64 / source.len() as f64)
                }
            }
            (None, true) => Some(1.0),
            _ => None,
        }
    }

    fn canonical(&self) -> String {
        format!(
            "Req:{} {} {{{}}}",
            self.is_required(),
            if self.negate { "-!" } else { "+" },
            self.pattern
        )
    }
}

impl TryFrom<AttractorBitRaw> for AttractorBit {
    type Error = AttractorError;

    fn try_from(raw: AttractorBitRaw) -> Result<Self, Self::Error> {
        Self::build(&raw.value, raw.optional, raw.except)
    }
}

impl From<AttractorBit> for AttractorBitRaw {
    fn from(bit: AttractorBit) -> Self {
        AttractorBitRaw {
            value: bit.pattern,
            optional: bit.optional,
            except: bit.negate,
        }
    }
}

impl fmt::Display for AttractorBit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl PartialEq for AttractorBit {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for AttractorBit {}

impl Hash for AttractorBit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}
