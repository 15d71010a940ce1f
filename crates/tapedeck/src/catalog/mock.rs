//! Mock upsert: create or update a hand-authored chapter.

use super::core::{save_logged, Catalog};
use super::types::CatalogError;
use crate::attractor::{method_requires_body, AttractorBit, AttractorGroup};
use crate::tape::{Interaction, ResponseSnapshot, Tape, UseState};
use std::sync::Arc;
use tracing::info;

/// Requested use count for a mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockUse {
    Always,
    Disable,
    /// Raw counter value; non-positive values follow the use-state encoding.
    Count(i32),
}

impl MockUse {
    /// Parse `always`, `disable` or an integer. Anything else is `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(count) = value.parse::<i32>() {
            return Some(MockUse::Count(count));
        }
        match value.to_lowercase().as_str() {
            "always" => Some(MockUse::Always),
            "disable" | "disabled" => Some(MockUse::Disable),
            _ => None,
        }
    }
}

/// Parsed mock directives. The matching profile is already built; the
/// catalog only applies it.
#[derive(Debug, Clone)]
pub struct MockDirectives {
    /// Tape to create or update. Only the last `/` segment is used.
    pub tape_name: Option<String>,
    pub tape_url: Option<String>,
    /// Whether a newly created tape accepts live recordings.
    pub tape_allow_live_recordings: bool,
    /// Stop after the tape has been found or created.
    pub tape_only: bool,
    pub tape_save: bool,

    pub name: Option<String>,
    pub method: Option<String>,
    pub response_code: Option<u16>,
    pub response_headers: Vec<(String, String)>,
    pub response_body: Option<String>,
    /// `None` keeps the chapter's current use state.
    pub uses: Option<MockUse>,
    pub read_only: bool,
    pub live: bool,
    /// `Some(true)` records the chapter without a response.
    pub await_response: Option<bool>,

    pub filters: AttractorGroup,
}

impl Default for MockDirectives {
    fn default() -> Self {
        Self {
            tape_name: None,
            tape_url: None,
            tape_allow_live_recordings: true,
            tape_only: false,
            tape_save: false,
            name: None,
            method: None,
            response_code: None,
            response_headers: Vec::new(),
            response_body: None,
            uses: None,
            read_only: false,
            live: false,
            await_response: None,
            filters: AttractorGroup::default(),
        }
    }
}

/// What a mock upsert did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockOutcome {
    pub tape: String,
    pub tape_created: bool,
    /// `None` when only the tape was touched.
    pub chapter: Option<String>,
    pub chapter_created: bool,
}

impl MockOutcome {
    pub fn created(&self) -> bool {
        self.tape_created || self.chapter_created
    }

    /// `Tape (New|Old): x, Mock (New|Old): y`
    pub fn message(&self) -> String {
        let tape = format!(
            "Tape ({}): {}",
            new_or_old(self.tape_created),
            self.tape
        );
        match &self.chapter {
            Some(chapter) => format!(
                "{tape}, Mock ({}): {chapter}",
                new_or_old(self.chapter_created)
            ),
            None => tape,
        }
    }
}

fn new_or_old(created: bool) -> &'static str {
    if created {
        "New"
    } else {
        "Old"
    }
}

impl Catalog {
    /// Create or update a mock chapter from parsed directives.
    pub fn put_mock(&self, directives: MockDirectives) -> Result<MockOutcome, CatalogError> {
        let mut attractors = directives.filters.clone();
        let always_live = directives.live.then_some(true);

        let (tape, tape_created) = self.mock_tape(&directives);
        if !tape_created {
            if let Some(defaults) = tape.attractors() {
                attractors.append(defaults);
            }
        }

        if directives.tape_save {
            save_logged(&tape);
        }

        if directives.tape_only {
            return Ok(MockOutcome {
                tape: tape.name().to_string(),
                tape_created,
                chapter: None,
                chapter_created: false,
            });
        }

        let existing = directives
            .name
            .as_deref()
            .and_then(|name| tape.find_chapter(name));
        let chapter_created = existing.is_none();

        let wants_body = directives
            .method
            .as_deref()
            .is_some_and(method_requires_body);
        if wants_body && attractors.body.iter().all(|bit| bit.pattern().trim().is_empty()) {
            attractors.body = vec![AttractorBit::new(".*")?];
        }

        let skip_response = directives.live || directives.await_response == Some(true);
        let response = (!skip_response).then(|| ResponseSnapshot {
            code: directives.response_code.unwrap_or(200),
            headers: directives.response_headers.clone(),
            body: directives.response_body.clone().unwrap_or_default(),
        });

        let current = existing
            .as_ref()
            .map(|c| c.use_state())
            .unwrap_or(UseState::Always);
        let use_state = resolve_use_state(directives.uses, directives.read_only, current);

        let name = directives
            .name
            .clone()
            .or_else(|| existing.as_ref().map(|c| c.name().to_string()));
        let mut chapter = Interaction::new(name)
            .with_attractors(Some(attractors))
            .with_always_live(always_live)
            .with_response(response)
            .with_use_state(use_state);
        if let Some(request) = existing.as_ref().and_then(|c| c.request()) {
            chapter = chapter.with_request(request.clone());
        }
        if let Some(previous) = &existing {
            chapter = chapter.with_recorded_at(previous.recorded_at());
        }

        let (chapter, _) = tape.upsert_chapter(chapter);
        info!(
            "Mock '{}' on tape '{}' set to {}",
            chapter.name(),
            tape.name(),
            chapter.use_state()
        );

        if tape.file_exists() {
            save_logged(&tape);
        }

        Ok(MockOutcome {
            tape: tape.name().to_string(),
            tape_created,
            chapter: Some(chapter.name().to_string()),
            chapter_created,
        })
    }

    /// Find the tape named by the directives, or create it.
    fn mock_tape(&self, directives: &MockDirectives) -> (Arc<Tape>, bool) {
        let name = directives
            .tape_name
            .as_deref()
            .and_then(|n| n.rsplit('/').next())
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let builder = self
            .tape_builder()
            .routing_url(directives.tape_url.clone())
            .writable(directives.tape_allow_live_recordings)
            .attractors(Some(directives.filters.clone()).filter(AttractorGroup::has_data));

        match name {
            Some(name) => self.tape_or_insert(name, || builder.name(name).build()),
            None => (self.add_tape(builder.build()), true),
        }
    }
}

/// Use state after applying a `use` directive. Read-only mocks only accept
/// always/disable; an unrecognized or missing value keeps `current`.
fn resolve_use_state(requested: Option<MockUse>, read_only: bool, current: UseState) -> UseState {
    if read_only {
        return match requested {
            Some(MockUse::Disable) => UseState::Disabled,
            _ => UseState::Always,
        };
    }
    match requested {
        Some(MockUse::Always) => UseState::Always,
        Some(MockUse::Disable) => UseState::Disabled,
        Some(MockUse::Count(raw)) => UseState::from_raw(raw),
        None => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_use_parse() {
        assert_eq!(MockUse::parse("always"), Some(MockUse::Always));
        assert_eq!(MockUse::parse("Disable"), Some(MockUse::Disable));
        assert_eq!(MockUse::parse(" 3 "), Some(MockUse::Count(3)));
        assert_eq!(MockUse::parse("-2"), Some(MockUse::Count(-2)));
        assert_eq!(MockUse::parse("sometimes"), None);
    }

    #[test]
    fn test_resolve_use_state() {
        let keep = UseState::Limited(4);
        assert_eq!(resolve_use_state(None, false, keep), keep);
        assert_eq!(resolve_use_state(Some(MockUse::Count(2)), false, keep), UseState::Limited(2));
        assert_eq!(resolve_use_state(Some(MockUse::Count(-2)), false, keep), UseState::Disabled);
        assert_eq!(resolve_use_state(Some(MockUse::Count(5)), true, keep), UseState::Always);
        assert_eq!(resolve_use_state(Some(MockUse::Disable), true, keep), UseState::Disabled);
    }

    #[test]
    fn test_outcome_message() {
        let outcome = MockOutcome {
            tape: "orders".into(),
            tape_created: true,
            chapter: Some("get".into()),
            chapter_created: false,
        };
        assert!(outcome.created());
        assert_eq!(outcome.message(), "Tape (New): orders, Mock (Old): get");

        let tape_only = MockOutcome {
            chapter: None,
            tape_created: false,
            ..outcome
        };
        assert!(!tape_only.created());
        assert_eq!(tape_only.message(), "Tape (Old): orders");
    }
}
