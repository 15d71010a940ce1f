//! The tape container: chapters plus the defaults used to route new recordings.

use super::file::{InteractionFile, TapeFile};
use super::interaction::Interaction;
use super::snapshot::is_absolute;
use super::{TapeError, TapeOps};
use crate::attractor::{AttractorGroup, Fingerprint, MatchScore};
use hyper::Uri;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

lazy_static! {
    static ref SLASH_WORD: Regex = Regex::new(r"/(\w)").unwrap();
}

/// File name for a tape name: spaces become `_`, `/x` becomes `X`, remaining
/// slashes are dropped and dots become `-`.
pub fn json_file_name(tape_name: &str) -> String {
    let spaced = tape_name.replace(' ', "_");
    let camel = SLASH_WORD.replace_all(&spaced, |caps: &regex::Captures| caps[1].to_uppercase());
    format!("{}.json", camel.replace('/', "").replace('.', "-"))
}

/// A named collection of chapters sharing defaults and an upstream target.
pub struct Tape {
    name: String,
    attractors: Option<AttractorGroup>,
    routing_url: Option<String>,
    writable: bool,
    file: Option<PathBuf>,
    chapters: RwLock<Vec<Arc<Interaction>>>,
}

/// Builder for [`Tape`].
#[derive(Debug, Default)]
pub struct TapeBuilder {
    name: Option<String>,
    sub_directory: Option<String>,
    tape_root: Option<PathBuf>,
    file: Option<PathBuf>,
    routing_url: Option<String>,
    attractors: Option<AttractorGroup>,
    writable: Option<bool>,
    chapters: Vec<Interaction>,
}

impl TapeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into()).filter(|n: &String| !n.trim().is_empty());
        self
    }

    pub fn sub_directory(mut self, dir: impl Into<String>) -> Self {
        self.sub_directory = Some(dir.into());
        self
    }

    /// Directory the backing file is derived under.
    pub fn tape_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.tape_root = Some(root.into());
        self
    }

    /// Use an explicit backing file instead of deriving one from the name.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn routing_url(mut self, url: Option<String>) -> Self {
        self.routing_url = url;
        self
    }

    pub fn attractors(mut self, attractors: Option<AttractorGroup>) -> Self {
        self.attractors = attractors;
        self
    }

    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = Some(writable);
        self
    }

    pub fn chapter(mut self, chapter: Interaction) -> Self {
        self.chapters.push(chapter);
        self
    }

    pub fn build(self) -> Tape {
        let name = self
            .name
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

        let file = self.file.or_else(|| {
            self.tape_root.map(|root| {
                let dir = match self.sub_directory.as_deref().map(str::trim) {
                    Some(sub) if !sub.is_empty() => root.join(sub.trim_matches('/')),
                    _ => root,
                };
                dir.join(json_file_name(&name))
            })
        });

        Tape {
            name,
            attractors: self.attractors,
            routing_url: self.routing_url.filter(|url| !url.trim().is_empty()),
            writable: self.writable.unwrap_or(true),
            file,
            chapters: RwLock::new(self.chapters.into_iter().map(Arc::new).collect()),
        }
    }
}

impl Tape {
    pub fn builder() -> TapeBuilder {
        TapeBuilder::new()
    }

    /// Read a tape document. A missing name is generated; the tape remembers `path`.
    pub fn load(path: &Path) -> Result<Tape, TapeError> {
        let text = fs::read_to_string(path).map_err(|source| TapeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document: TapeFile =
            serde_json::from_str(&text).map_err(|source| TapeError::Decode {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_document(document, Some(path.to_path_buf())))
    }

    pub fn from_document(document: TapeFile, file: Option<PathBuf>) -> Tape {
        let mut builder = Tape::builder()
            .routing_url(document.routing_url)
            .attractors(document.attractors)
            .writable(!document.read_only.unwrap_or(false));
        if let Some(name) = document.tape_name {
            builder = builder.name(name);
        }
        if let Some(file) = file {
            builder = builder.file(file);
        }
        document
            .chapters
            .into_iter()
            .fold(builder, |builder, chapter| builder.chapter(chapter.into()))
            .build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attractors(&self) -> Option<&AttractorGroup> {
        self.attractors.as_ref()
    }

    pub fn routing_url(&self) -> Option<&str> {
        self.routing_url.as_deref()
    }

    /// The routing URL when it is a usable absolute URL.
    pub fn upstream(&self) -> Option<Uri> {
        self.routing_url
            .as_deref()
            .and_then(|url| url.trim().parse::<Uri>().ok())
            .filter(is_absolute)
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn file_exists(&self) -> bool {
        self.file.as_deref().is_some_and(Path::exists)
    }

    pub fn chapters(&self) -> Vec<Arc<Interaction>> {
        self.chapters.read().clone()
    }

    pub fn len(&self) -> usize {
        self.chapters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.read().is_empty()
    }

    pub fn contains(&self, chapter: &Arc<Interaction>) -> bool {
        self.chapters.read().iter().any(|c| Arc::ptr_eq(c, chapter))
    }

    pub fn find_chapter(&self, name: &str) -> Option<Arc<Interaction>> {
        self.chapters
            .read()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    /// Insert `chapter`, replacing any chapter with the same name in place.
    /// Returns true when an existing chapter was replaced.
    pub fn upsert_chapter(&self, chapter: Interaction) -> (Arc<Interaction>, bool) {
        let chapter = Arc::new(chapter);
        let mut chapters = self.chapters.write();
        match chapters.iter_mut().find(|c| c.name() == chapter.name()) {
            Some(slot) => {
                *slot = Arc::clone(&chapter);
                (chapter, true)
            }
            None => {
                chapters.push(Arc::clone(&chapter));
                (chapter, false)
            }
        }
    }

    pub fn remove_chapter(&self, name: &str) -> bool {
        let mut chapters = self.chapters.write();
        let before = chapters.len();
        chapters.retain(|c| c.name() != name);
        chapters.len() != before
    }

    /// Score this tape's default attractors against a request.
    pub fn matches_by_default(&self, fingerprint: &Fingerprint) -> MatchScore {
        match &self.attractors {
            Some(group) => group.score(fingerprint),
            None => AttractorGroup::default().score(fingerprint),
        }
    }

    /// Append a new chapter. Chapters without attractors inherit the tape's defaults.
    pub fn create_interaction(&self, chapter: Interaction) -> Arc<Interaction> {
        let chapter = if chapter.attractors().is_none() {
            chapter.with_attractors(self.attractors.clone())
        } else {
            chapter
        };
        let chapter = Arc::new(chapter);
        self.chapters.write().push(Arc::clone(&chapter));
        debug!("Tape '{}' gained chapter '{}'", self.name, chapter.name());
        chapter
    }

    /// The tape document. With `persistent_only`, chapters whose use state is
    /// not always/disabled are left out.
    pub fn to_document(&self, persistent_only: bool) -> TapeFile {
        let chapters = self
            .chapters
            .read()
            .iter()
            .filter(|c| !persistent_only || c.use_state().is_persistent())
            .map(|c| InteractionFile::from(c.as_ref()))
            .collect();

        TapeFile {
            tape_name: Some(self.name.clone()),
            attractors: self.attractors.clone(),
            routing_url: self.routing_url.clone(),
            read_only: Some(!self.writable),
            chapters,
        }
    }

    /// Persist the tape to its backing file.
    ///
    /// Only always/disabled chapters are written. The document is written to a
    /// sibling temp file and renamed over the target, so a failed save leaves
    /// the previous file intact.
    pub fn save(&self) -> Result<PathBuf, TapeError> {
        let path = self
            .file
            .clone()
            .ok_or_else(|| TapeError::NoBackingFile(self.name.clone()))?;
        let json = serde_json::to_string_pretty(&self.to_document(true))?;

        let io_err = |source| TapeError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| json_file_name(&self.name));
        let temp = path.with_file_name(format!(
            ".{file_name}.{}.tmp",
            uuid::Uuid::new_v4().simple()
        ));
        fs::write(&temp, json).map_err(io_err)?;
        if let Err(source) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(io_err(source));
        }

        info!("Saved tape '{}' to {:?}", self.name, path);
        Ok(path)
    }
}

impl TapeOps for Tape {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn active_chapters(&self) -> Vec<Arc<Interaction>> {
        self.chapters
            .read()
            .iter()
            .filter(|c| c.is_selectable())
            .cloned()
            .collect()
    }

    fn match_rule(&self) -> Option<&AttractorGroup> {
        self.attractors.as_ref()
    }

    fn record(&self, chapter: Interaction) -> Arc<Interaction> {
        self.create_interaction(chapter)
    }
}

impl std::fmt::Debug for Tape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tape")
            .field("name", &self.name)
            .field("routing_url", &self.routing_url)
            .field("writable", &self.writable)
            .field("file", &self.file)
            .field("chapters", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attractor::AttractorBit;
    use crate::tape::{ResponseSnapshot, UseState};
    use tempfile::TempDir;

    #[test]
    fn test_json_file_name() {
        assert_eq!(json_file_name("my tape"), "my_tape.json");
        assert_eq!(json_file_name("api/users/list"), "apiUsersList.json");
        assert_eq!(json_file_name("v1.2"), "v1-2.json");
        assert_eq!(json_file_name("trailing/"), "trailing.json");
    }

    #[test]
    fn test_builder_defaults() {
        let dir = TempDir::new().unwrap();
        let tape = Tape::builder()
            .name("orders api")
            .sub_directory("team")
            .tape_root(dir.path())
            .build();
        assert_eq!(tape.name(), "orders api");
        assert!(tape.is_writable());
        assert_eq!(tape.file().unwrap(), dir.path().join("team").join("orders_api.json"));

        let unnamed = Tape::builder().build();
        assert!(!unnamed.name().is_empty());
        assert!(unnamed.file().is_none());
    }

    #[test]
    fn test_upstream_requires_absolute_url() {
        let tape = Tape::builder().routing_url(Some("http://up:81".into())).build();
        assert!(tape.upstream().is_some());

        let tape = Tape::builder().routing_url(Some("/relative".into())).build();
        assert!(tape.upstream().is_none());

        let tape = Tape::builder().routing_url(Some("  ".into())).build();
        assert!(tape.routing_url().is_none());
    }

    #[test]
    fn test_create_interaction_inherits_defaults() {
        let defaults = AttractorGroup::new().with_path(AttractorBit::new("orders").unwrap());
        let tape = Tape::builder().attractors(Some(defaults.clone())).build();

        let inherited = tape.create_interaction(Interaction::new(None));
        assert_eq!(inherited.attractors(), Some(&defaults));

        let own = AttractorGroup::new().with_path(AttractorBit::new("users").unwrap());
        let kept = tape.create_interaction(Interaction::new(None).with_attractors(Some(own.clone())));
        assert_eq!(kept.attractors(), Some(&own));
        assert_eq!(tape.len(), 2);
    }

    #[test]
    fn test_save_filters_runtime_chapters() {
        let dir = TempDir::new().unwrap();
        let tape = Tape::builder()
            .name("mixed")
            .tape_root(dir.path())
            .chapter(Interaction::new(Some("always".into())))
            .chapter(Interaction::new(Some("disabled".into())).with_use_state(UseState::Disabled))
            .chapter(Interaction::new(Some("limited".into())).with_use_state(UseState::Limited(3)))
            .chapter(Interaction::new(Some("spent".into())).with_use_state(UseState::Exhausted))
            .build();

        let path = tape.save().unwrap();
        let reloaded = Tape::load(&path).unwrap();

        let names: Vec<String> = reloaded
            .chapters()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["always", "disabled"]);
        assert_eq!(reloaded.name(), "mixed");
        assert_eq!(reloaded.file(), Some(path.as_path()));
        // in-memory state is untouched
        assert_eq!(tape.len(), 4);
    }

    #[test]
    fn test_save_round_trip_preserves_content() {
        let dir = TempDir::new().unwrap();
        let group = AttractorGroup::new()
            .with_path(AttractorBit::new("users").unwrap())
            .with_param(AttractorBit::new("id=\\d+").unwrap().optional(true));
        let tape = Tape::builder()
            .name("users")
            .tape_root(dir.path())
            .routing_url(Some("http://users.local".into()))
            .attractors(Some(group.clone()))
            .writable(false)
            .build();
        tape.create_interaction(
            Interaction::new(Some("list".into()))
                .with_response(Some(ResponseSnapshot::new(200).with_body("[]"))),
        );

        let reloaded = Tape::load(&tape.save().unwrap()).unwrap();
        assert_eq!(reloaded.attractors(), Some(&group));
        assert_eq!(reloaded.routing_url(), Some("http://users.local"));
        assert!(!reloaded.is_writable());
        let chapter = reloaded.find_chapter("list").unwrap();
        assert_eq!(chapter.response().unwrap().body, "[]");
        assert_eq!(chapter.attractors(), Some(&group));
    }

    #[test]
    fn test_save_without_file_fails() {
        let tape = Tape::builder().name("memory").build();
        assert!(matches!(tape.save(), Err(TapeError::NoBackingFile(_))));
    }

    #[test]
    fn test_load_missing_name_is_generated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("anon.json");
        fs::write(&path, r#"{"routingUrl": null, "chapters": []}"#).unwrap();
        let tape = Tape::load(&path).unwrap();
        assert!(!tape.name().is_empty());
        assert!(tape.is_writable());
    }

    #[test]
    fn test_upsert_and_remove_chapter() {
        let tape = Tape::builder().build();
        let (_, replaced) = tape.upsert_chapter(Interaction::new(Some("a".into())));
        assert!(!replaced);
        let (_, replaced) =
            tape.upsert_chapter(Interaction::new(Some("a".into())).with_use_state(UseState::Disabled));
        assert!(replaced);
        assert_eq!(tape.len(), 1);
        assert_eq!(tape.find_chapter("a").unwrap().use_state(), UseState::Disabled);

        assert!(tape.remove_chapter("a"));
        assert!(!tape.remove_chapter("a"));
    }

    #[test]
    fn test_active_chapters_skip_unselectable() {
        let tape = Tape::builder()
            .chapter(Interaction::new(Some("on".into())))
            .chapter(Interaction::new(Some("off".into())).with_use_state(UseState::Disabled))
            .chapter(Interaction::new(Some("spent".into())).with_use_state(UseState::Exhausted))
            .build();
        let active = tape.active_chapters();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name(), "on");
    }
}
