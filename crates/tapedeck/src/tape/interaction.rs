//! Chapters (interactions) and their use-state lifecycle.

use super::snapshot::{RequestSnapshot, ResponseSnapshot};
use crate::attractor::{AttractorGroup, Fingerprint, MatchScore};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

/// Raw `mockUses` sentinel for an always-enabled chapter.
pub const USES_ALWAYS: i32 = -1;
/// Raw `mockUses` sentinel for a disabled chapter.
pub const USES_DISABLED: i32 = -2;

/// Logical view of the raw `mockUses` counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseState {
    /// Served indefinitely without mutation.
    Always,
    /// Never served.
    Disabled,
    /// Limited chapter with no uses left.
    Exhausted,
    /// Limited chapter with this many uses left.
    Limited(u32),
}

impl UseState {
    /// Decode a raw counter. Unknown negative values read as disabled.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            USES_ALWAYS => UseState::Always,
            0 => UseState::Exhausted,
            n if n > 0 => UseState::Limited(n as u32),
            _ => UseState::Disabled,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            UseState::Always => USES_ALWAYS,
            UseState::Disabled => USES_DISABLED,
            UseState::Exhausted => 0,
            UseState::Limited(n) => n.min(i32::MAX as u32) as i32,
        }
    }

    /// Eligible for tier-1 replay.
    pub fn is_selectable(self) -> bool {
        matches!(self, UseState::Always | UseState::Limited(_))
    }

    /// Written to the tape file on save.
    pub fn is_persistent(self) -> bool {
        matches!(self, UseState::Always | UseState::Disabled)
    }
}

impl fmt::Display for UseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UseState::Always => f.write_str("always"),
            UseState::Disabled => f.write_str("disabled"),
            UseState::Exhausted => f.write_str("exhausted"),
            UseState::Limited(n) => write!(f, "limited({n})"),
        }
    }
}

/// One chapter of a tape.
///
/// The matching profile, request and identity are fixed at construction. The
/// use counter and the stored response are the only runtime-mutable parts,
/// so a chapter can be shared across in-flight requests behind an `Arc`.
pub struct Interaction {
    name: String,
    attractors: Option<AttractorGroup>,
    request: Option<RequestSnapshot>,
    response: RwLock<Option<ResponseSnapshot>>,
    recorded_at: DateTime<Utc>,
    always_live: Option<bool>,
    uses: AtomicI32,
}

impl Interaction {
    /// New always-enabled chapter. A missing or blank name is replaced by a UUID.
    pub fn new(name: Option<String>) -> Self {
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self {
            name,
            attractors: None,
            request: None,
            response: RwLock::new(None),
            recorded_at: Utc::now(),
            always_live: None,
            uses: AtomicI32::new(USES_ALWAYS),
        }
    }

    pub fn with_attractors(mut self, attractors: Option<AttractorGroup>) -> Self {
        self.attractors = attractors;
        self
    }

    pub fn with_request(mut self, request: RequestSnapshot) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_response(self, response: Option<ResponseSnapshot>) -> Self {
        *self.response.write() = response;
        self
    }

    pub fn with_use_state(self, state: UseState) -> Self {
        self.uses.store(state.as_raw(), Ordering::SeqCst);
        self
    }

    /// Set the counter from its raw encoding. Unknown negative values are
    /// stored as [`USES_DISABLED`].
    pub fn with_raw_uses(self, raw: i32) -> Self {
        self.uses.store(UseState::from_raw(raw).as_raw(), Ordering::SeqCst);
        self
    }

    pub fn with_always_live(mut self, always_live: Option<bool>) -> Self {
        self.always_live = always_live;
        self
    }

    pub fn with_recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = recorded_at;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attractors(&self) -> Option<&AttractorGroup> {
        self.attractors.as_ref()
    }

    pub fn request(&self) -> Option<&RequestSnapshot> {
        self.request.as_ref()
    }

    pub fn response(&self) -> Option<ResponseSnapshot> {
        self.response.read().clone()
    }

    pub fn has_response(&self) -> bool {
        self.response.read().is_some()
    }

    pub fn set_response(&self, response: ResponseSnapshot) {
        *self.response.write() = Some(response);
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn always_live(&self) -> Option<bool> {
        self.always_live
    }

    pub fn is_always_live(&self) -> bool {
        self.always_live.unwrap_or(false)
    }

    /// Whether a replay must go to the upstream instead of the stored response.
    pub fn needs_live_call(&self) -> bool {
        self.is_always_live() || !self.has_response()
    }

    pub fn raw_uses(&self) -> i32 {
        self.uses.load(Ordering::SeqCst)
    }

    pub fn use_state(&self) -> UseState {
        UseState::from_raw(self.raw_uses())
    }

    pub fn set_use_state(&self, state: UseState) {
        self.uses.store(state.as_raw(), Ordering::SeqCst);
    }

    pub fn is_selectable(&self) -> bool {
        self.use_state().is_selectable()
    }

    /// Claim one serve.
    ///
    /// Always-enabled chapters are claimed without mutation; limited chapters
    /// are decremented with a compare-and-swap so concurrent claims never
    /// drive the counter below zero. Returns false when nothing was claimed.
    pub fn try_consume(&self) -> bool {
        let mut current = self.uses.load(Ordering::SeqCst);
        loop {
            match UseState::from_raw(current) {
                UseState::Always => return true,
                UseState::Limited(_) => {
                    match self.uses.compare_exchange(
                        current,
                        current - 1,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    ) {
                        Ok(_) => return true,
                        Err(actual) => current = actual,
                    }
                }
                UseState::Disabled | UseState::Exhausted => return false,
            }
        }
    }

    /// Score this chapter's attractors; a chapter without attractors is scored
    /// as an empty group.
    pub fn score(&self, fingerprint: &Fingerprint) -> MatchScore {
        match &self.attractors {
            Some(group) => group.score(fingerprint),
            None => AttractorGroup::default().score(fingerprint),
        }
    }
}

impl Clone for Interaction {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            attractors: self.attractors.clone(),
            request: self.request.clone(),
            response: RwLock::new(self.response()),
            recorded_at: self.recorded_at,
            always_live: self.always_live,
            uses: AtomicI32::new(self.raw_uses()),
        }
    }
}

impl fmt::Debug for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interaction")
            .field("name", &self.name)
            .field("uses", &self.use_state())
            .field("has_response", &self.has_response())
            .field("always_live", &self.always_live)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}; Uses: {}", self.name, self.raw_uses())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_use_state_decoding() {
        assert_eq!(UseState::from_raw(-1), UseState::Always);
        assert_eq!(UseState::from_raw(-2), UseState::Disabled);
        assert_eq!(UseState::from_raw(-7), UseState::Disabled);
        assert_eq!(UseState::from_raw(0), UseState::Exhausted);
        assert_eq!(UseState::from_raw(3), UseState::Limited(3));
        assert_eq!(UseState::Limited(3).as_raw(), 3);
    }

    #[test]
    fn test_raw_uses_normalized() {
        assert_eq!(Interaction::new(None).with_raw_uses(-7).raw_uses(), USES_DISABLED);
        assert_eq!(Interaction::new(None).with_raw_uses(-1).raw_uses(), USES_ALWAYS);
        assert_eq!(Interaction::new(None).with_raw_uses(4).raw_uses(), 4);
        assert_eq!(Interaction::new(None).with_raw_uses(0).raw_uses(), 0);
    }

    #[test]
    fn test_selectable_and_persistent() {
        assert!(UseState::Always.is_selectable());
        assert!(UseState::Limited(1).is_selectable());
        assert!(!UseState::Disabled.is_selectable());
        assert!(!UseState::Exhausted.is_selectable());

        assert!(UseState::Always.is_persistent());
        assert!(UseState::Disabled.is_persistent());
        assert!(!UseState::Limited(2).is_persistent());
        assert!(!UseState::Exhausted.is_persistent());
    }

    #[test]
    fn test_blank_name_is_generated() {
        let chapter = Interaction::new(Some("  ".to_string()));
        assert!(uuid::Uuid::parse_str(chapter.name()).is_ok());
        assert_eq!(chapter.name(), chapter.name());

        let named = Interaction::new(Some("get-orders".to_string()));
        assert_eq!(named.name(), "get-orders");
        assert_eq!(named.use_state(), UseState::Always);
    }

    #[test]
    fn test_limited_consume_until_exhausted() {
        let chapter = Interaction::new(None).with_use_state(UseState::Limited(1));
        assert!(chapter.try_consume());
        assert_eq!(chapter.use_state(), UseState::Exhausted);
        assert!(!chapter.try_consume());
        assert_eq!(chapter.raw_uses(), 0);
    }

    #[test]
    fn test_always_and_disabled_consume() {
        let always = Interaction::new(None);
        for _ in 0..5 {
            assert!(always.try_consume());
        }
        assert_eq!(always.raw_uses(), USES_ALWAYS);

        let disabled = Interaction::new(None).with_use_state(UseState::Disabled);
        assert!(!disabled.try_consume());
    }

    #[test]
    fn test_concurrent_consume_never_underflows() {
        let chapter = Arc::new(Interaction::new(None).with_use_state(UseState::Limited(25)));
        let served = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let chapter = Arc::clone(&chapter);
                let served = Arc::clone(&served);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        if chapter.try_consume() {
                            served.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(served.load(Ordering::SeqCst), 25);
        assert_eq!(chapter.raw_uses(), 0);
    }

    #[test]
    fn test_needs_live_call() {
        let empty = Interaction::new(None);
        assert!(empty.needs_live_call());

        let stored = Interaction::new(None).with_response(Some(ResponseSnapshot::new(200)));
        assert!(!stored.needs_live_call());

        let live = stored.clone().with_always_live(Some(true));
        assert!(live.needs_live_call());
    }

    #[test]
    fn test_clone_copies_runtime_state() {
        let chapter = Interaction::new(Some("a".into())).with_use_state(UseState::Limited(2));
        chapter.try_consume();
        let copy = chapter.clone();
        assert_eq!(copy.use_state(), UseState::Limited(1));
        assert_eq!(copy.name(), "a");
    }
}
