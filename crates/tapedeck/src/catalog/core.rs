//! The catalog registry and three-tier resolution.

use super::types::{CatalogError, CatalogOptions, IncomingRequest, Resolution, ResolveStatus, Tier};
use crate::attractor::{AttractorGroup, BestMatchSelector, Fingerprint, MatchScore, Selection};
use crate::executor::{Executor, ExecutorError, ForwardRequest};
use crate::metrics;
use crate::tape::{Interaction, ResponseSnapshot, Tape, TapeBuilder, TapeOps};
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A tier-1 candidate: the chapter and the tape that owns it.
type ChapterRef = (Arc<Tape>, Arc<Interaction>);

/// What `resolve` does next, decided from the current catalog state.
enum Plan {
    Replay(ChapterRef, MatchScore),
    /// A chapter was appended to `tape`; its response is still to be fetched.
    Record {
        tape: Arc<Tape>,
        chapter: Arc<Interaction>,
        forward: IncomingRequest,
        tier: Tier,
        score: Option<MatchScore>,
    },
    Done(Resolution),
}

/// Process-wide set of tapes and the resolution entry point.
///
/// The tape list sits behind one `RwLock`; every access takes a short
/// critical section and works on cloned `Arc` handles afterwards, so no lock
/// is held while scoring or while waiting on the upstream.
///
/// Tiers 2 and 3 append under `recording`, after re-checking tier 1, so two
/// requests for the same endpoint never record it twice.
pub struct Catalog {
    tapes: RwLock<Vec<Arc<Tape>>>,
    recording: Mutex<()>,
    selector: BestMatchSelector,
    executor: Arc<dyn Executor>,
    options: CatalogOptions,
}

impl Catalog {
    pub fn new(options: CatalogOptions, executor: Arc<dyn Executor>) -> Self {
        Self {
            tapes: RwLock::new(Vec::new()),
            recording: Mutex::new(()),
            selector: BestMatchSelector::default(),
            executor,
            options,
        }
    }

    /// Create a catalog populated from the tape root.
    pub fn load(options: CatalogOptions, executor: Arc<dyn Executor>) -> Self {
        let catalog = Self::new(options, executor);
        catalog.reload();
        catalog
    }

    pub fn with_selector(mut self, selector: BestMatchSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn options(&self) -> &CatalogOptions {
        &self.options
    }

    /// Replace the in-memory tapes with the files under the tape root.
    /// Returns the number of tapes loaded.
    pub fn reload(&self) -> usize {
        let loaded: Vec<Arc<Tape>> = load_tapes(&self.options.tape_root)
            .into_iter()
            .map(Arc::new)
            .collect();
        let count = loaded.len();
        *self.tapes.write() = loaded;
        metrics::set_tape_count(count);
        info!(
            "Loaded {} tapes from {:?}",
            count, self.options.tape_root
        );
        count
    }

    pub fn tapes(&self) -> Vec<Arc<Tape>> {
        self.tapes.read().clone()
    }

    pub fn len(&self) -> usize {
        self.tapes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tapes.read().is_empty()
    }

    /// Find a tape by name, ignoring case.
    pub fn tape(&self, name: &str) -> Option<Arc<Tape>> {
        let name = name.to_lowercase();
        self.tapes
            .read()
            .iter()
            .find(|t| t.name().to_lowercase() == name)
            .cloned()
    }

    /// Builder for a tape stored under this catalog's tape root.
    pub fn tape_builder(&self) -> TapeBuilder {
        Tape::builder().tape_root(self.options.tape_root.clone())
    }

    pub fn add_tape(&self, tape: Tape) -> Arc<Tape> {
        let tape = Arc::new(tape);
        let count = {
            let mut tapes = self.tapes.write();
            tapes.push(Arc::clone(&tape));
            tapes.len()
        };
        metrics::set_tape_count(count);
        info!("Added tape '{}'", tape.name());
        tape
    }

    /// The tape named `name`, or the one from `build` when there is none.
    /// Lookup and insert share one write guard. The flag is true when the
    /// tape was inserted.
    pub(crate) fn tape_or_insert(
        &self,
        name: &str,
        build: impl FnOnce() -> Tape,
    ) -> (Arc<Tape>, bool) {
        let lowered = name.to_lowercase();
        let (tape, count) = {
            let mut tapes = self.tapes.write();
            if let Some(existing) = tapes.iter().find(|t| t.name().to_lowercase() == lowered) {
                return (Arc::clone(existing), false);
            }
            let tape = Arc::new(build());
            tapes.push(Arc::clone(&tape));
            (tape, tapes.len())
        };
        metrics::set_tape_count(count);
        info!("Added tape '{}'", tape.name());
        (tape, true)
    }

    /// Create a new, named tape. Fails if the name is taken.
    pub fn create_tape(
        &self,
        name: &str,
        routing_url: Option<String>,
        attractors: Option<AttractorGroup>,
        writable: bool,
    ) -> Result<Arc<Tape>, CatalogError> {
        let (tape, created) = self.tape_or_insert(name, || {
            self.tape_builder()
                .name(name)
                .routing_url(routing_url)
                .attractors(attractors.filter(AttractorGroup::has_data))
                .writable(writable)
                .build()
        });
        if created {
            Ok(tape)
        } else {
            Err(CatalogError::TapeExists(name.to_string()))
        }
    }

    /// Drop a tape from memory. The backing file is left alone.
    pub fn remove_tape(&self, name: &str) -> Result<Arc<Tape>, CatalogError> {
        let lowered = name.to_lowercase();
        let (removed, count) = {
            let mut tapes = self.tapes.write();
            let index = tapes
                .iter()
                .position(|t| t.name().to_lowercase() == lowered)
                .ok_or_else(|| CatalogError::TapeNotFound(name.to_string()))?;
            let removed = tapes.remove(index);
            (removed, tapes.len())
        };
        metrics::set_tape_count(count);
        info!("Removed tape '{}'", removed.name());
        Ok(removed)
    }

    pub fn remove_chapter(&self, tape: &str, chapter: &str) -> Result<(), CatalogError> {
        let found = self
            .tape(tape)
            .ok_or_else(|| CatalogError::TapeNotFound(tape.to_string()))?;
        if found.remove_chapter(chapter) {
            Ok(())
        } else {
            Err(CatalogError::ChapterNotFound {
                tape: tape.to_string(),
                chapter: chapter.to_string(),
            })
        }
    }

    pub fn save_tape(&self, name: &str) -> Result<PathBuf, CatalogError> {
        let tape = self
            .tape(name)
            .ok_or_else(|| CatalogError::TapeNotFound(name.to_string()))?;
        let result = tape.save();
        metrics::record_tape_save(result.is_ok());
        Ok(result?)
    }

    /// Resolve an intercepted request: replay, record into an existing tape,
    /// or create a new tape. Never fails; every outcome is a [`Resolution`].
    pub async fn resolve(&self, request: IncomingRequest) -> Resolution {
        let fingerprint = request.fingerprint();

        let resolution = loop {
            let plan = match replay_plan(self.find_replay(&fingerprint)) {
                Some(plan) => plan,
                None => self.plan_recording(&request, &fingerprint),
            };

            match plan {
                Plan::Replay((tape, chapter), score) => {
                    if !chapter.try_consume() {
                        debug!("Chapter '{}' was exhausted concurrently, reselecting", chapter.name());
                        continue;
                    }
                    break self.replay(tape, chapter, score, &request).await;
                }
                Plan::Record {
                    tape,
                    chapter,
                    forward,
                    tier,
                    score,
                } => break self.finish_recording(tape, chapter, forward, tier, score).await,
                Plan::Done(resolution) => break resolution,
            }
        };

        metrics::record_resolution(resolution.tier.as_str(), resolution.status.as_str());
        resolution
    }

    /// Tiers 2 and 3 under the recording lock. Tier 1 is checked again first:
    /// a concurrent request may have recorded this endpoint since the miss.
    fn plan_recording(&self, request: &IncomingRequest, fingerprint: &Fingerprint) -> Plan {
        let _recording = self.recording.lock();

        if let Some(plan) = replay_plan(self.find_replay(fingerprint)) {
            return plan;
        }

        match self.find_recording_tape(fingerprint) {
            Selection::Found { item, score } => {
                info!("Recording into tape '{}'", item.name());
                self.start_recording(item, request, Tier::Record, Some(score))
            }
            Selection::Conflict { tied, score } => {
                let names = tied.iter().map(|t| t.name().to_string()).collect();
                Plan::Done(Resolution::conflict(Tier::Record, names, score))
            }
            Selection::NotFound { .. } => {
                let tape = self.add_tape(self.tape_for_request(request));
                info!("Creating new tape '{}'", tape.name());
                self.start_recording(tape, request, Tier::Create, None)
            }
        }
    }

    /// Tier 1: best selectable chapter across every tape.
    pub fn find_replay(&self, fingerprint: &Fingerprint) -> Selection<ChapterRef> {
        let pool: Vec<ChapterRef> = self
            .tapes()
            .into_iter()
            .flat_map(|tape| {
                tape.active_chapters()
                    .into_iter()
                    .map(move |chapter| (Arc::clone(&tape), chapter))
            })
            .collect();

        self.selector.select(
            pool.iter().map(|(tape, chapter)| {
                ((Arc::clone(tape), Arc::clone(chapter)), chapter.attractors())
            }),
            fingerprint,
            |(_, chapter)| chapter.is_selectable(),
        )
    }

    /// Tier 2: best writable tape by its default attractors. Bodies are not
    /// considered at this tier.
    pub fn find_recording_tape(&self, fingerprint: &Fingerprint) -> Selection<Arc<Tape>> {
        let tapes = self.tapes();
        let fingerprint = fingerprint.without_body();
        self.selector.select(
            tapes.iter().map(|tape| (Arc::clone(tape), tape.match_rule())),
            &fingerprint,
            |tape| TapeOps::is_writable(tape.as_ref()),
        )
    }

    async fn replay(
        &self,
        tape: Arc<Tape>,
        chapter: Arc<Interaction>,
        score: MatchScore,
        request: &IncomingRequest,
    ) -> Resolution {
        info!("Replaying '{}' from tape '{}' ({})", chapter.name(), tape.name(), score);

        let mut resolution = Resolution::new(ResolveStatus::Found, Tier::Replay);
        resolution.tape = Some(tape.name().to_string());
        resolution.score = Some(score);

        if chapter.needs_live_call() {
            let forward = match tape.upstream() {
                Some(base) => request.rehost(&base),
                None => request.clone(),
            };
            match self.call_upstream(ForwardRequest::from(&forward)).await {
                Ok(response) => {
                    if !chapter.is_always_live() {
                        chapter.set_response(response.clone());
                        if chapter.use_state().is_persistent() && tape.file_exists() {
                            self.persist(&tape).await;
                        }
                    }
                    resolution.response = Some(response);
                }
                Err(e) => resolution.error = Some(e),
            }
        } else {
            resolution.response = chapter.response();
        }

        resolution.interaction = Some(chapter);
        resolution
    }

    /// Append a response-less chapter for `request` to `tape`.
    fn start_recording(
        &self,
        tape: Arc<Tape>,
        request: &IncomingRequest,
        tier: Tier,
        score: Option<MatchScore>,
    ) -> Plan {
        let forward = match tape.upstream() {
            Some(base) => request.rehost(&base),
            None => request.clone(),
        };

        let attractors = match forward.derive_attractors() {
            Ok(group) => Some(group),
            Err(e) => {
                warn!("Could not derive attractors for {}: {}", forward.url, e);
                None
            }
        };
        let chapter = tape.record(
            Interaction::new(None)
                .with_request(forward.clone())
                .with_attractors(attractors),
        );

        Plan::Record {
            tape,
            chapter,
            forward,
            tier,
            score,
        }
    }

    /// Fetch the response for a freshly recorded chapter and save its tape.
    async fn finish_recording(
        &self,
        tape: Arc<Tape>,
        chapter: Arc<Interaction>,
        forward: IncomingRequest,
        tier: Tier,
        score: Option<MatchScore>,
    ) -> Resolution {
        let status = match tier {
            Tier::Create => ResolveStatus::NotFound,
            _ => ResolveStatus::Found,
        };
        let mut resolution = Resolution::new(status, tier);
        resolution.tape = Some(tape.name().to_string());
        resolution.score = score;

        match self.call_upstream(ForwardRequest::from(&forward)).await {
            Ok(response) => {
                chapter.set_response(response.clone());
                resolution.response = Some(response);
            }
            Err(e) => resolution.error = Some(e),
        }

        self.persist(&tape).await;
        resolution.interaction = Some(chapter);
        resolution
    }

    /// A fresh tape for a request no writable tape claimed. The request's
    /// scheme and host become the upstream when the URL is absolute.
    fn tape_for_request(&self, request: &IncomingRequest) -> Tape {
        let routing_url = request.absolute_url().and_then(|uri| {
            let scheme = uri.scheme_str()?;
            let authority = uri.authority()?;
            Some(format!("{scheme}://{authority}"))
        });
        self.tape_builder().routing_url(routing_url).build()
    }

    /// Forward upstream, bounded by the configured timeout.
    async fn call_upstream(&self, request: ForwardRequest) -> Result<ResponseSnapshot, ExecutorError> {
        let timeout = self.options.upstream_timeout;
        let url = request.url.clone();
        let start = Instant::now();

        let result = match tokio::time::timeout(timeout, self.executor.forward(request, timeout)).await
        {
            Ok(result) => result,
            Err(_) => Err(ExecutorError::Timeout(timeout)),
        };

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        match &result {
            Ok(response) => {
                debug!("Upstream {} answered {} in {:.1}ms", url, response.code, elapsed_ms);
                metrics::record_upstream("ok", elapsed_ms);
            }
            Err(e) => {
                warn!("Upstream call to {} failed: {}", url, e);
                metrics::record_upstream(e.label(), elapsed_ms);
            }
        }
        result
    }

    /// Save a tape on a blocking task. Waits for completion unless background
    /// persistence is enabled. Failures are logged and never surface.
    pub(crate) async fn persist(&self, tape: &Arc<Tape>) {
        let tape = Arc::clone(tape);
        let task = tokio::task::spawn_blocking(move || save_logged(&tape));
        if !self.options.persist_in_background {
            if let Err(e) = task.await {
                warn!("Tape save task failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("tapes", &self.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Turn a tier-1 selection into a plan. `None` means nothing replays.
fn replay_plan(selection: Selection<ChapterRef>) -> Option<Plan> {
    match selection {
        Selection::Found { item, score } => Some(Plan::Replay(item, score)),
        Selection::Conflict { tied, score } => {
            let names = tied.iter().map(|(_, c)| c.name().to_string()).collect();
            Some(Plan::Done(Resolution::conflict(Tier::Replay, names, score)))
        }
        Selection::NotFound { reason } => {
            debug!("No replayable chapter ({:?})", reason);
            None
        }
    }
}

pub(crate) fn save_logged(tape: &Tape) -> bool {
    match tape.save() {
        Ok(_) => {
            metrics::record_tape_save(true);
            true
        }
        Err(e) => {
            warn!("Failed to save tape '{}': {}", tape.name(), e);
            metrics::record_tape_save(false);
            false
        }
    }
}

/// Read every `*.json` tape under `root`, skipping files that fail to load.
pub fn load_tapes(root: &Path) -> Vec<Tape> {
    if !root.exists() {
        info!("Tape root {:?} does not exist, starting empty", root);
        return Vec::new();
    }

    tape_files(root)
        .into_iter()
        .filter_map(|path| match Tape::load(&path) {
            Ok(tape) => {
                debug!("Loaded tape '{}' ({} chapters)", tape.name(), tape.len());
                Some(tape)
            }
            Err(e) => {
                warn!("Skipping tape file: {}", e);
                None
            }
        })
        .collect()
}

fn tape_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read tape directory {:?}: {}", dir, e);
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if is_tape_file(&path) {
                files.push(path);
            }
        }
    }

    files.sort();
    files
}

fn is_tape_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'));
    !hidden
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}
