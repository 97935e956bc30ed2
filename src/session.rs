//! Reader session: one open document with its viewport and annotations
//!
//! The session wires the viewport controller to the page renders, the
//! bookmark set, the note board and the sync queue. Annotation edits are
//! applied locally and queued; [`ReaderSession::sync`] pushes them to a store
//! and reverts whatever the store rejects.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use serde::Serialize;

use crate::annotations::{
    BookmarkChange, BookmarkSet, NoteBoard, NoteId, Point, PointerRelease, StickyNote,
};
use crate::document::{Document, DocumentSource, PageSurface, load_document};
use crate::error::{DecodeError, ReaderError};
use crate::jump_list::JumpList;
use crate::notification::{Notification, NotificationManager};
use crate::sync::{AnnotationStore, Rollback, SyncCommand, SyncOutcome, SyncQueue};
use crate::viewport::{Command, Effect, Viewport, ViewportConfig, ViewportState};
use crate::window::RenderWindow;

pub struct ReaderSession<S: DocumentSource> {
    source: S,
    book_id: String,
    viewport: Viewport,
    surfaces: BTreeMap<usize, PageSurface>,
    bookmarks: BookmarkSet,
    notes: NoteBoard,
    /// Local ids already acknowledged by the store
    stored_ids: HashMap<NoteId, NoteId>,
    queue: SyncQueue,
    jumps: JumpList,
    notifications: NotificationManager,
    now: Instant,
}

impl<S: DocumentSource> ReaderSession<S> {
    /// Open a session over an already-decoded source.
    ///
    /// Annotation load failures are not fatal: the session starts with empty
    /// annotations and raises a notification.
    pub fn open<A: AnnotationStore + ?Sized>(
        source: S,
        store: &mut A,
        book_id: impl Into<String>,
        config: ViewportConfig,
        viewport_width: f32,
    ) -> Self {
        let book_id = book_id.into();
        let now = Instant::now();
        let document = load_document(&source);
        let viewport = Viewport::new(document, config, viewport_width);
        let mut notifications = NotificationManager::new();

        let bookmarks = match store.load_bookmarks(&book_id) {
            Ok(pages) => {
                let count = viewport.document().page_count;
                BookmarkSet::from_pages(pages.into_iter().filter(|&p| p >= 1 && p <= count))
            }
            Err(e) => {
                log::error!("Failed to load bookmarks for {book_id}: {e}");
                notifications.error(format!("Bookmarks unavailable: {e}"), now);
                BookmarkSet::new()
            }
        };

        let notes = match store.load_notes(&book_id) {
            Ok(notes) => NoteBoard::with_notes(notes),
            Err(e) => {
                log::error!("Failed to load notes for {book_id}: {e}");
                notifications.error(format!("Notes unavailable: {e}"), now);
                NoteBoard::new()
            }
        };

        log::info!(
            "Opened {book_id}: {} pages, {} bookmarks, {} notes",
            viewport.document().page_count,
            bookmarks.len(),
            notes.notes().len()
        );

        let mut session = Self {
            source,
            queue: SyncQueue::new(book_id.clone()),
            book_id,
            viewport,
            surfaces: BTreeMap::new(),
            bookmarks,
            notes,
            stored_ids: HashMap::new(),
            jumps: JumpList::default(),
            notifications,
            now,
        };
        let initial: Vec<usize> = session.viewport.window().pages().collect();
        for page in initial {
            session.render(page);
        }
        session
    }

    /// Decode with `opener`, then open.
    ///
    /// A decode failure is terminal: no session is created and the caller
    /// shows its "unable to load" state.
    pub fn load<A, F>(
        opener: F,
        store: &mut A,
        book_id: impl Into<String>,
        config: ViewportConfig,
        viewport_width: f32,
    ) -> Result<Self, ReaderError>
    where
        A: AnnotationStore + ?Sized,
        F: FnOnce() -> Result<S, DecodeError>,
    {
        let source = opener().inspect_err(|e| log::error!("{e}"))?;
        Ok(Self::open(source, store, book_id, config, viewport_width))
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    pub fn document(&self) -> &Document {
        self.viewport.document()
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn state(&self) -> ViewportState {
        self.viewport.state()
    }

    pub fn window(&self) -> RenderWindow {
        self.viewport.window()
    }

    /// Pixels of a mounted page, if its render succeeded
    pub fn surface(&self, page: usize) -> Option<&PageSurface> {
        self.surfaces.get(&page)
    }

    pub fn rendered_pages(&self) -> Vec<usize> {
        self.surfaces.keys().copied().collect()
    }

    pub fn bookmarks(&self) -> &BookmarkSet {
        &self.bookmarks
    }

    pub fn notes(&self) -> &NoteBoard {
        &self.notes
    }

    pub fn notifications(&self) -> &NotificationManager {
        &self.notifications
    }

    pub fn pending_sync(&self) -> usize {
        self.queue.len()
    }

    pub fn is_closed(&self) -> bool {
        self.viewport.is_closed()
    }

    /// Apply a viewport command and carry out the render effects
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match &cmd {
            Command::Visibility { now, .. } | Command::Tick(now) => self.advance_clock(*now),
            _ => {}
        }

        let effects = self.viewport.apply(cmd);
        for effect in &effects {
            match effect {
                Effect::Mount(page) | Effect::RenderPage(page) => self.render(*page),
                Effect::Unmount(page) => {
                    self.surfaces.remove(page);
                }
                Effect::UnmountAll => self.surfaces.clear(),
                Effect::ScrollIntoView { .. }
                | Effect::CurrentPageChanged(_)
                | Effect::ResizePlaceholders(_)
                | Effect::RelayoutAnnotations
                | Effect::ScheduleCommit(_) => {}
            }
        }
        effects
    }

    pub fn toggle_bookmark(&mut self) -> Option<BookmarkChange> {
        self.toggle_bookmark_at(self.state().current_page)
    }

    /// Toggle a page; the store sees only the minimal difference
    pub fn toggle_bookmark_at(&mut self, page: usize) -> Option<BookmarkChange> {
        if self.is_closed() || page == 0 || page > self.document().page_count {
            return None;
        }
        let before = self.bookmarks.clone();
        let change = self.bookmarks.toggle(page);
        self.queue
            .enqueue_bookmark_diff(&BookmarkSet::diff(&before, &self.bookmarks));
        log::debug!("Bookmark {change:?}");
        Some(change)
    }

    /// Navigate to a page, remembering where the jump started
    pub fn jump_to_bookmark(&mut self, page: usize) -> Vec<Effect> {
        if self.is_closed() || self.document().is_empty() {
            return vec![];
        }
        self.jumps.push(self.state().current_page);
        self.apply(Command::ScrollToPage(page))
    }

    pub fn jump_to_next_bookmark(&mut self) -> Vec<Effect> {
        match self.bookmarks.next_after(self.state().current_page) {
            Some(page) => self.jump_to_bookmark(page),
            None => vec![],
        }
    }

    pub fn jump_to_prev_bookmark(&mut self) -> Vec<Effect> {
        match self.bookmarks.prev_before(self.state().current_page) {
            Some(page) => self.jump_to_bookmark(page),
            None => vec![],
        }
    }

    pub fn jump_back(&mut self) -> Vec<Effect> {
        match self.jumps.jump_back(self.state().current_page) {
            Some(page) => self.apply(Command::ScrollToPage(page)),
            None => vec![],
        }
    }

    pub fn jump_forward(&mut self) -> Vec<Effect> {
        match self.jumps.jump_forward() {
            Some(page) => self.apply(Command::ScrollToPage(page)),
            None => vec![],
        }
    }

    /// Create an empty note on the current page and start editing it.
    ///
    /// An unsaved draft on another note is saved first.
    pub fn create_note(&mut self) -> Option<NoteId> {
        if self.is_closed() || self.document().is_empty() {
            return None;
        }
        if self.notes.has_unsaved_draft() {
            self.save_note();
        }
        let id = self.notes.create(self.state().current_page)?;
        let note = self.notes.get(&id)?.to_new();
        self.queue.enqueue(SyncCommand::InsertNote {
            local_id: id.clone(),
            note,
        });
        Some(id)
    }

    pub fn edit_note(&mut self, id: &NoteId) -> bool {
        if self.is_closed() {
            return false;
        }
        let id = self.resolve(id);
        self.notes.begin_edit(&id)
    }

    pub fn set_note_draft(&mut self, text: impl Into<String>) {
        self.notes.set_draft(text);
    }

    pub fn cancel_note_edit(&mut self) {
        self.notes.cancel_edit();
    }

    /// Save the draft of the note being edited
    pub fn save_note(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        let Some(update) = self.notes.save() else {
            return false;
        };
        self.queue.enqueue(SyncCommand::UpdateNote {
            id: update.id,
            patch: update.patch,
            previous: update.previous,
        });
        true
    }

    pub fn delete_note(&mut self, id: &NoteId) -> bool {
        if self.is_closed() {
            return false;
        }
        let id = self.resolve(id);
        let Some(note) = self.notes.delete(&id) else {
            return false;
        };
        self.queue.enqueue(SyncCommand::DeleteNote { note });
        true
    }

    pub fn pointer_down(&mut self, id: &NoteId, pointer: Point) -> bool {
        if self.is_closed() {
            return false;
        }
        let id = self.resolve(id);
        self.notes.pointer_down(&id, pointer)
    }

    /// Drag the active note using the page's current rendered size
    pub fn pointer_move(&mut self, pointer: Point) -> Option<(f32, f32)> {
        let page_size = self.viewport.page_rendered_size();
        self.notes.pointer_move(pointer, page_size)
    }

    /// End the drag session; a click enters edit mode, a drag is queued for saving
    pub fn pointer_up(&mut self) -> Option<PointerRelease> {
        let release = self.notes.pointer_up()?;
        match &release {
            PointerRelease::Click(id) => {
                self.notes.begin_edit(id);
            }
            PointerRelease::Dragged(update) => {
                self.queue.enqueue(SyncCommand::UpdateNote {
                    id: update.id.clone(),
                    patch: update.patch.clone(),
                    previous: update.previous.clone(),
                });
            }
        }
        Some(release)
    }

    /// Pixel position of a note at the current zoom
    pub fn note_pixel_position(&self, id: &NoteId) -> Option<Point> {
        let note = self.notes.get(&self.resolve(id))?;
        Some(note.pixel_position(self.viewport.page_rendered_size()))
    }

    /// Push queued annotation changes to `store`, reverting failures
    pub fn sync<A: AnnotationStore + ?Sized>(&mut self, store: &mut A) -> Vec<SyncOutcome> {
        let outcomes = self.queue.flush(store);
        for outcome in &outcomes {
            match outcome {
                SyncOutcome::NoteStored { local, stored } => {
                    self.notes.assign_stored_id(local, stored.clone());
                    self.stored_ids.insert(local.clone(), stored.clone());
                }
                SyncOutcome::Failed { error, rollback } => {
                    self.rollback(rollback.clone());
                    self.notifications
                        .error(format!("Could not save annotation: {error}"), self.now);
                }
                SyncOutcome::Applied | SyncOutcome::Skipped => {}
            }
        }
        outcomes
    }

    /// Tear down; later ticks and visibility reports are ignored
    pub fn close(&mut self) -> Vec<Effect> {
        self.notes.cancel_drag();
        self.notes.cancel_edit();
        self.apply(Command::Close)
    }

    /// Current view of the session for display or logging
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let window = self.window();
        SessionSnapshot {
            book_id: self.book_id.clone(),
            page_count: self.document().page_count,
            title: self.document().metadata.title.clone(),
            state: self.state(),
            window_first: window.first(),
            window_last: window.last(),
            rendered_pages: self.rendered_pages(),
            bookmarks: self.bookmarks.pages().to_vec(),
            notes: self.notes.notes().to_vec(),
            notifications: self.notifications.all().to_vec(),
            pending_sync: self.queue.len(),
            closed: self.is_closed(),
        }
    }

    fn advance_clock(&mut self, now: Instant) {
        if now > self.now {
            self.now = now;
        }
        self.notifications.update(self.now);
    }

    fn render(&mut self, page: usize) {
        let mut surface = self.surfaces.remove(&page).unwrap_or_default();
        match self.viewport.render_into(&self.source, page, &mut surface) {
            Ok(()) => {
                self.surfaces.insert(page, surface);
            }
            Err(e) => {
                self.notifications.warn(e.to_string(), self.now);
            }
        }
    }

    fn rollback(&mut self, rollback: Rollback) {
        match rollback {
            Rollback::Bookmark(change) => self.bookmarks.apply(change),
            Rollback::RemoveNote(id) => {
                self.notes.delete(&id);
            }
            Rollback::RevertNote { id, patch } => {
                self.notes.patch(&id, &patch);
            }
            Rollback::RestoreNote(note) => self.notes.restore(note),
        }
    }

    /// Follow a local id to its stored id once the store has acknowledged it
    fn resolve(&self, id: &NoteId) -> NoteId {
        self.stored_ids.get(id).cloned().unwrap_or_else(|| id.clone())
    }
}

/// Serializable summary of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub book_id: String,
    pub page_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub state: ViewportState,
    pub window_first: usize,
    pub window_last: usize,
    pub rendered_pages: Vec<usize>,
    pub bookmarks: Vec<usize>,
    pub notes: Vec<StickyNote>,
    pub notifications: Vec<Notification>,
    pub pending_sync: usize,
    pub closed: bool,
}
