//! The document façade
//!
//! [`Document`] is the single entry point for the display layer: it owns
//! the open/close lifecycle, binds exactly one generator per open
//! document, composes the pixmap cache, render scheduler and search
//! engine, and fans out change notifications. Everything here runs on the
//! coordinating context; worker results are marshaled in through
//! [`Document::process_renders`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::warn;
use vellum_cache::{CacheConfig, CacheStats, PixmapCache};
use vellum_generator::{
    Generator, GeneratorProvider, OpenHint, Pixmap, PixmapRequest, RequestKey, RequesterId,
    Rotation,
};
use vellum_scheduler::{
    RenderOutcome, RenderScheduler, SchedulerConfig, SchedulerStats, SubmitStatus,
};

use crate::annotation::{Annotation, AnnotationFlags, AnnotationId};
use crate::error::{DocumentError, DocumentResult};
use crate::events::{AnnotationChange, DocumentEvent, ObserverId, ObserverRegistry};
use crate::form::{FieldValue, FormField, FormFieldId};
use crate::history::{History, Viewport};
use crate::outline::Outline;
use crate::page::{Page, PageTransition};
use crate::persistence;
use crate::search::{SearchEngine, SearchOptions, SearchStatus};

/// Engine configuration, fixed per [`Document`] instance.
#[derive(Debug, Clone, Copy)]
pub struct DocumentConfig {
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
    pub history_capacity: usize,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            scheduler: SchedulerConfig::default(),
            history_capacity: 100,
        }
    }
}

/// Document-level metadata of the open document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub mime_type: Option<String>,
    pub page_count: usize,
    pub path: PathBuf,
}

struct OpenState {
    path: PathBuf,
    generator: Arc<dyn Generator>,
    metadata: DocumentMetadata,
    pages: Vec<Page>,
    outline: Outline,
    scheduler: RenderScheduler,
    search: SearchEngine,
    history: History,
    skipped_sidecar_records: usize,
}

/// The document engine façade.
///
/// Constructed once in the closed state; observers subscribe before the
/// first `open`, and one instance serves any number of sequential
/// documents. Exactly one generator is bound per open document and
/// released on close.
pub struct Document {
    config: DocumentConfig,
    observers: ObserverRegistry,
    cache: PixmapCache,
    state: Option<OpenState>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new(DocumentConfig::default())
    }
}

impl Document {
    pub fn new(config: DocumentConfig) -> Self {
        Self {
            config,
            observers: ObserverRegistry::new(),
            cache: PixmapCache::with_config(&config.cache),
            state: None,
        }
    }

    // ---- observers ----

    pub fn subscribe(&mut self, observer: Box<dyn Fn(&DocumentEvent)>) -> ObserverId {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    // ---- lifecycle ----

    /// Open a source document.
    ///
    /// The provider resolves the source to a backend; resolution policy
    /// (mime sniffing, plugin registries) lives outside the engine. On
    /// failure nothing of the attempt is retained and the document stays
    /// closed. An already-open document is closed first.
    pub fn open(
        &mut self,
        path: &Path,
        hint: OpenHint,
        provider: &dyn GeneratorProvider,
    ) -> DocumentResult<()> {
        if self.state.is_some() {
            self.close();
        }

        let result = self.try_open(path, &hint, provider);
        match &result {
            Ok(()) => self.observers.emit(&DocumentEvent::Opened),
            Err(error) => self.observers.emit(&DocumentEvent::OpenFailed {
                reason: error.clone(),
            }),
        }
        result
    }

    fn try_open(
        &mut self,
        path: &Path,
        hint: &OpenHint,
        provider: &dyn GeneratorProvider,
    ) -> DocumentResult<()> {
        let Some(generator) = provider.provide(path, hint) else {
            return Err(DocumentError::NoSuitableGenerator(
                path.display().to_string(),
            ));
        };

        let geometry = match generator.open(path, hint) {
            Ok(geometry) => geometry,
            Err(error) => {
                generator.close();
                return Err(error.into());
            }
        };
        if geometry.is_empty() {
            generator.close();
            return Err(DocumentError::UnsupportedFormat(
                "document has no pages".to_owned(),
            ));
        }

        let mut pages: Vec<Page> = geometry.iter().map(Page::new).collect();

        let mut skipped_sidecar_records = 0;
        match persistence::load_local_contents(path) {
            Ok(Some(sidecar)) => {
                skipped_sidecar_records = sidecar.skipped_records;
                for data in sidecar.pages {
                    match pages.get_mut(data.page_index) {
                        Some(page) => {
                            page.set_bookmarked(data.bookmark);
                            for annotation in data.annotations {
                                page.add_annotation(annotation);
                            }
                        }
                        None => {
                            warn!(
                                "sidecar references page {} beyond document end",
                                data.page_index
                            );
                            skipped_sidecar_records += 1;
                        }
                    }
                }
            }
            Ok(None) => {}
            Err(error) => {
                // Local contents are an overlay; a broken sidecar must not
                // keep the document from opening.
                warn!("ignoring unreadable sidecar for {}: {error}", path.display());
            }
        }

        let info = generator.document_info();
        let mime_type = hint
            .mime_type
            .clone()
            .or_else(|| generator.describe().mime_types.first().cloned());
        let metadata = DocumentMetadata {
            title: info.title,
            author: info.author,
            mime_type,
            page_count: pages.len(),
            path: path.to_path_buf(),
        };

        let scheduler = RenderScheduler::new(Arc::clone(&generator), self.config.scheduler);
        self.cache.clear();
        self.state = Some(OpenState {
            path: path.to_path_buf(),
            generator,
            metadata,
            pages,
            outline: Outline::default(),
            scheduler,
            search: SearchEngine::new(),
            history: History::with_capacity(self.config.history_capacity),
            skipped_sidecar_records,
        });
        Ok(())
    }

    /// Close the open document: cancel in-flight renders, persist local
    /// contents, flush the cache, release the generator. Closing a closed
    /// document is a no-op.
    pub fn close(&mut self) {
        let Some(mut state) = self.state.take() else {
            return;
        };
        state.scheduler.close();
        if let Err(error) = persistence::save_local_contents(&state.path, &state.pages) {
            warn!(
                "failed to persist local contents for {}: {error}",
                state.path.display()
            );
        }
        state.generator.close();
        self.cache.clear();
        self.observers.emit(&DocumentEvent::Closed);
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    // ---- model access ----

    pub fn page_count(&self) -> usize {
        self.state.as_ref().map_or(0, |state| state.pages.len())
    }

    pub fn page(&self, page_index: usize) -> Option<&Page> {
        self.state.as_ref()?.pages.get(page_index)
    }

    pub fn metadata(&self) -> Option<&DocumentMetadata> {
        self.state.as_ref().map(|state| &state.metadata)
    }

    pub fn outline(&self) -> Option<&Outline> {
        self.state.as_ref().map(|state| &state.outline)
    }

    /// Install the outline tree. Outline construction is a backend or
    /// integration concern; the engine only stores and serves it.
    pub fn set_outline(&mut self, outline: Outline) -> DocumentResult<()> {
        let state = self.open_state_mut()?;
        state.outline = outline;
        Ok(())
    }

    /// Annotation records the last sidecar load had to skip.
    pub fn skipped_sidecar_records(&self) -> usize {
        self.state
            .as_ref()
            .map_or(0, |state| state.skipped_sidecar_records)
    }

    // ---- rendering ----

    /// Submit render requests. Requests whose exact pixmap is already
    /// cached complete immediately with a `PixmapReady` notification; the
    /// rest go to the scheduler, which guarantees at most one in-flight
    /// render per (page, size, rotation, purpose).
    pub fn request_pixmaps(&mut self, requests: &[PixmapRequest]) -> DocumentResult<()> {
        let page_count = self.open_state_mut()?.pages.len();
        if let Some(request) = requests
            .iter()
            .find(|request| request.page_index >= page_count)
        {
            return Err(DocumentError::PageOutOfRange(request.page_index));
        }

        let mut events = Vec::new();
        for request in requests {
            let key = request.key();
            if self.cache.contains(&key) {
                events.push(DocumentEvent::PixmapReady {
                    page_index: key.page_index,
                    purpose: key.purpose,
                });
                continue;
            }
            let status = self
                .state
                .as_mut()
                .map(|state| state.scheduler.submit(*request));
            if status == Some(SubmitStatus::RejectedFailed) {
                events.push(DocumentEvent::PixmapFailed {
                    page_index: key.page_index,
                    purpose: key.purpose,
                    reason: DocumentError::RenderFailed {
                        page: key.page_index,
                        message: "page previously failed to render".to_owned(),
                    }
                    .to_string(),
                });
            }
        }
        self.emit_all(events);
        Ok(())
    }

    /// Dispatch queued renders and publish completed ones, notifying
    /// observers per result. Returns the number of notifications emitted.
    pub fn process_renders(&mut self) -> DocumentResult<usize> {
        // Field-level borrow: the scheduler pumps into the cache, which is
        // a sibling field.
        let Some(state) = self.state.as_mut() else {
            return Err(DocumentError::DocumentClosed);
        };
        let outcomes = state.scheduler.pump(&mut self.cache);

        let events: Vec<DocumentEvent> = outcomes
            .into_iter()
            .map(|outcome| match outcome {
                RenderOutcome::Ready { key, .. } => DocumentEvent::PixmapReady {
                    page_index: key.page_index,
                    purpose: key.purpose,
                },
                RenderOutcome::Failed { key, error, .. } => DocumentEvent::PixmapFailed {
                    page_index: key.page_index,
                    purpose: key.purpose,
                    reason: DocumentError::RenderFailed {
                        page: key.page_index,
                        message: error.to_string(),
                    }
                    .to_string(),
                },
            })
            .collect();
        let count = events.len();
        self.emit_all(events);
        Ok(count)
    }

    /// Whether renders are queued or in flight.
    pub fn has_pending_renders(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|state| state.scheduler.has_work())
    }

    /// Drop a requester's outstanding interest (e.g. the view scrolled
    /// away). A no-op when nothing is outstanding or the document closed.
    pub fn cancel_requests(&mut self, requester: RequesterId) {
        if let Some(state) = self.state.as_mut() {
            state.scheduler.cancel_requester(requester);
        }
    }

    /// Pin the pages currently on screen; the cache spares their visible
    /// entries during eviction.
    pub fn set_visible_pages(&mut self, pages: impl IntoIterator<Item = usize>) {
        self.cache.set_visible_pages(pages);
    }

    /// Exact-key cached pixmap lookup.
    pub fn pixmap(&mut self, key: &RequestKey) -> Option<&Pixmap> {
        self.cache.get(key)
    }

    /// Best cached pixmap for a page at any size, for use as a display
    /// placeholder while the exact size renders.
    pub fn placeholder_pixmap(
        &self,
        page_index: usize,
        rotation: Rotation,
    ) -> Option<(RequestKey, &Pixmap)> {
        self.cache.find_near(page_index, rotation)
    }

    // ---- editing ----

    /// Add an annotation to a page.
    pub fn add_annotation(
        &mut self,
        page_index: usize,
        annotation: Annotation,
    ) -> DocumentResult<AnnotationId> {
        let Some(state) = self.state.as_mut() else {
            return Err(DocumentError::DocumentClosed);
        };
        if page_index >= state.pages.len() {
            return Err(DocumentError::PageOutOfRange(page_index));
        }
        let id = annotation.id;
        state.pages[page_index].add_annotation(annotation);
        Self::invalidate_page_content(state, &mut self.cache, page_index);
        self.emit_all(vec![DocumentEvent::AnnotationChanged {
            page_index,
            annotation_id: id,
            change: AnnotationChange::Added,
        }]);
        Ok(id)
    }

    /// Remove an annotation. Returns `false` when the annotation is
    /// missing or locked against deletion.
    pub fn remove_annotation(
        &mut self,
        page_index: usize,
        id: AnnotationId,
    ) -> DocumentResult<bool> {
        let Some(state) = self.state.as_mut() else {
            return Err(DocumentError::DocumentClosed);
        };
        let page = state
            .pages
            .get_mut(page_index)
            .ok_or(DocumentError::PageOutOfRange(page_index))?;
        match page.annotation(id) {
            None => return Ok(false),
            Some(annotation) if annotation.flags.contains(AnnotationFlags::LOCKED) => {
                return Ok(false)
            }
            Some(_) => {}
        }
        page.remove_annotation(id);
        Self::invalidate_page_content(state, &mut self.cache, page_index);
        self.emit_all(vec![DocumentEvent::AnnotationChanged {
            page_index,
            annotation_id: id,
            change: AnnotationChange::Removed,
        }]);
        Ok(true)
    }

    /// Move an annotation by a normalized delta. The page's cache entries
    /// are invalidated before this returns, so a render request issued
    /// after the move can never be served a pre-move bitmap.
    pub fn translate_annotation(
        &mut self,
        page_index: usize,
        id: AnnotationId,
        dx: f64,
        dy: f64,
    ) -> DocumentResult<bool> {
        let Some(state) = self.state.as_mut() else {
            return Err(DocumentError::DocumentClosed);
        };
        let page = state
            .pages
            .get_mut(page_index)
            .ok_or(DocumentError::PageOutOfRange(page_index))?;
        let Some(annotation) = page.annotation_mut(id) else {
            return Ok(false);
        };
        if annotation.flags.contains(AnnotationFlags::READ_ONLY) {
            return Ok(false);
        }
        annotation.translate(dx, dy);
        Self::invalidate_page_content(state, &mut self.cache, page_index);
        self.emit_all(vec![DocumentEvent::AnnotationChanged {
            page_index,
            annotation_id: id,
            change: AnnotationChange::Modified,
        }]);
        Ok(true)
    }

    /// Install a page's form fields (a backend/integration concern).
    /// Enforces name uniqueness: within the page, and document-wide for
    /// kinds that aggregate values. Violating fields are skipped and the
    /// number actually installed is returned.
    pub fn install_form_fields(
        &mut self,
        page_index: usize,
        fields: Vec<FormField>,
    ) -> DocumentResult<usize> {
        let state = self.open_state_mut()?;
        if page_index >= state.pages.len() {
            return Err(DocumentError::PageOutOfRange(page_index));
        }
        let mut installed = 0;
        for field in fields {
            let duplicate_aggregate = field.aggregates_values()
                && state.pages.iter().enumerate().any(|(index, page)| {
                    index != page_index
                        && page
                            .field_by_name(&field.name)
                            .is_some_and(|existing| existing.aggregates_values())
                });
            if duplicate_aggregate {
                warn!(
                    "skipping form field '{}' on page {page_index}: name already aggregates elsewhere",
                    field.name
                );
                continue;
            }
            match state.pages[page_index].add_form_field(field) {
                Ok(()) => installed += 1,
                Err(rejected) => {
                    warn!(
                        "skipping duplicate form field '{}' on page {page_index}",
                        rejected.name
                    );
                }
            }
        }
        Ok(installed)
    }

    /// Set a form field's value by id. Returns `false` for unknown or
    /// read-only fields. The change propagates to same-name aggregating
    /// widgets on other pages, and every touched page is invalidated.
    pub fn set_field_value(
        &mut self,
        field_id: FormFieldId,
        value: FieldValue,
    ) -> DocumentResult<bool> {
        let Some(state) = self.state.as_mut() else {
            return Err(DocumentError::DocumentClosed);
        };

        let Some((page_index, name, aggregates)) =
            state.pages.iter().enumerate().find_map(|(index, page)| {
                page.form_fields()
                    .iter()
                    .find(|field| field.id == field_id)
                    .map(|field| (index, field.name.clone(), field.aggregates_values()))
            })
        else {
            return Ok(false);
        };

        if !state.pages[page_index].set_field_value(field_id, value.clone()) {
            return Ok(false);
        }
        let mut changed = vec![(page_index, field_id)];

        if aggregates {
            for (index, page) in state.pages.iter_mut().enumerate() {
                if index == page_index {
                    continue;
                }
                let sibling = page
                    .field_by_name(&name)
                    .filter(|field| field.aggregates_values() && !field.read_only)
                    .map(|field| field.id);
                if let Some(id) = sibling {
                    if page.set_field_value(id, value.clone()) {
                        changed.push((index, id));
                    }
                }
            }
        }

        let mut events = Vec::new();
        for (index, id) in changed {
            Self::invalidate_page_content(state, &mut self.cache, index);
            events.push(DocumentEvent::FormFieldValueChanged { field_id: id });
        }
        self.emit_all(events);
        Ok(true)
    }

    /// Toggle a page's bookmark flag; returns the new state.
    pub fn toggle_bookmark(&mut self, page_index: usize) -> DocumentResult<bool> {
        let state = self.open_state_mut()?;
        let page = state
            .pages
            .get_mut(page_index)
            .ok_or(DocumentError::PageOutOfRange(page_index))?;
        let bookmarked = !page.bookmarked();
        page.set_bookmarked(bookmarked);
        self.emit_all(vec![DocumentEvent::BookmarkChanged {
            page_index,
            bookmarked,
        }]);
        Ok(bookmarked)
    }

    /// Attach or clear a page's presentation transition.
    pub fn set_page_transition(
        &mut self,
        page_index: usize,
        transition: Option<PageTransition>,
    ) -> DocumentResult<()> {
        let state = self.open_state_mut()?;
        let page = state
            .pages
            .get_mut(page_index)
            .ok_or(DocumentError::PageOutOfRange(page_index))?;
        page.set_transition(transition);
        Ok(())
    }

    /// Rotate every page, invalidating all cached pixmaps. The display
    /// layer must relayout.
    pub fn set_rotation(&mut self, rotation: Rotation) -> DocumentResult<()> {
        let Some(state) = self.state.as_mut() else {
            return Err(DocumentError::DocumentClosed);
        };
        for index in 0..state.pages.len() {
            state.pages[index].set_rotation(rotation);
            Self::invalidate_page_content(state, &mut self.cache, index);
        }
        self.emit_all(vec![DocumentEvent::LayoutReflowNeeded]);
        Ok(())
    }

    // ---- navigation ----

    /// Record a navigation in the viewport history.
    pub fn set_viewport(&mut self, viewport: Viewport) -> DocumentResult<()> {
        let state = self.open_state_mut()?;
        if viewport.page_index >= state.pages.len() {
            return Err(DocumentError::PageOutOfRange(viewport.page_index));
        }
        state.history.push(viewport);
        Ok(())
    }

    pub fn current_viewport(&self) -> Option<Viewport> {
        self.state.as_ref()?.history.current()
    }

    pub fn history_back(&mut self) -> Option<Viewport> {
        self.state.as_mut()?.history.back()
    }

    pub fn history_forward(&mut self) -> Option<Viewport> {
        self.state.as_mut()?.history.forward()
    }

    // ---- search ----

    /// Begin an incremental search session from a page.
    pub fn start_search(
        &mut self,
        query: &str,
        options: SearchOptions,
        from_page: usize,
    ) -> DocumentResult<()> {
        let state = self.open_state_mut()?;
        let page_count = state.pages.len();
        state.search.start(query, options, from_page, page_count);
        Ok(())
    }

    /// Advance the search by one page, emitting progress, and return the
    /// session status. Call repeatedly while it reports `Searching`; after
    /// a `Found`, calling again resumes past that match.
    pub fn continue_search(&mut self) -> DocumentResult<SearchStatus> {
        let state = self.open_state_mut()?;
        let step = state.search.advance(&mut state.pages, state.generator.as_ref());

        let mut events = Vec::new();
        if let Some(page_index) = step.scanned_page {
            events.push(DocumentEvent::SearchProgress {
                page_index,
                found: step.found_on_page,
            });
        }
        self.emit_all(events);
        Ok(step.status)
    }

    pub fn search_status(&self) -> SearchStatus {
        self.state
            .as_ref()
            .map_or(SearchStatus::Idle, |state| state.search.status().clone())
    }

    // ---- statistics ----

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn scheduler_stats(&self) -> Option<SchedulerStats> {
        self.state.as_ref().map(|state| state.scheduler.stats())
    }

    // ---- internals ----

    fn open_state_mut(&mut self) -> Result<&mut OpenState, DocumentError> {
        self.state.as_mut().ok_or(DocumentError::DocumentClosed)
    }

    /// Couple a content mutation to cache and scheduler invalidation, so
    /// any render request issued after the mutation sees fresh content.
    fn invalidate_page_content(state: &mut OpenState, cache: &mut PixmapCache, page_index: usize) {
        cache.invalidate_page(page_index);
        state.scheduler.invalidate_page(page_index);
    }

    fn emit_all(&self, events: Vec<DocumentEvent>) {
        for event in &events {
            self.observers.emit(event);
        }
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        self.close();
    }
}
