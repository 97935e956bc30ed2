pub mod test_helpers {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use crate::annotations::{NewNote, NoteId, NotePatch, StickyNote};
    use crate::error::PersistenceError;
    use crate::event_source::{ReaderEvent, ScriptedEventSource};
    use crate::sync::AnnotationStore;

    /// A store call as recorded by [`MemoryStore`]
    #[derive(Debug, Clone, PartialEq)]
    pub enum StoreCall {
        InsertBookmark(String, usize),
        DeleteBookmark(String, usize),
        InsertNote(String, usize),
        UpdateNote(String),
        DeleteNote(String),
    }

    /// In-memory annotation store with failure injection
    #[derive(Debug, Default)]
    pub struct MemoryStore {
        bookmarks: BTreeMap<String, Vec<usize>>,
        notes: BTreeMap<String, Vec<StickyNote>>,
        next_id: u64,
        fail_all: bool,
        fail_next: usize,
        calls: Vec<StoreCall>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every call fails with `PersistenceError::Unavailable`
        pub fn failing(mut self) -> Self {
            self.fail_all = true;
            self
        }

        /// The next `count` mutating calls fail
        pub fn fail_next(&mut self, count: usize) {
            self.fail_next = count;
        }

        pub fn set_failing(&mut self, failing: bool) {
            self.fail_all = failing;
        }

        pub fn with_bookmarks(mut self, book_id: &str, pages: &[usize]) -> Self {
            self.bookmarks.insert(book_id.to_string(), pages.to_vec());
            self
        }

        pub fn with_note(mut self, book_id: &str, page: usize, x_pct: f32, y_pct: f32, content: &str) -> Self {
            let id = self.allocate_id();
            self.notes
                .entry(book_id.to_string())
                .or_default()
                .push(StickyNote {
                    id: NoteId::Stored(id),
                    page,
                    x_pct,
                    y_pct,
                    content: content.to_string(),
                    updated_at: Utc::now(),
                });
            self
        }

        /// Mutating calls that reached the store, in order
        pub fn calls(&self) -> &[StoreCall] {
            &self.calls
        }

        fn allocate_id(&mut self) -> String {
            let id = format!("note-{}", self.next_id);
            self.next_id += 1;
            id
        }

        fn check(&mut self) -> Result<(), PersistenceError> {
            if self.fail_all {
                return Err(PersistenceError::unavailable("injected failure"));
            }
            if self.fail_next > 0 {
                self.fail_next -= 1;
                return Err(PersistenceError::unavailable("injected failure"));
            }
            Ok(())
        }

        fn find_note(&mut self, id: &str) -> Option<&mut StickyNote> {
            let target = NoteId::Stored(id.to_string());
            self.notes
                .values_mut()
                .flat_map(|notes| notes.iter_mut())
                .find(|n| n.id == target)
        }
    }

    impl AnnotationStore for MemoryStore {
        fn load_bookmarks(&mut self, book_id: &str) -> Result<Vec<usize>, PersistenceError> {
            if self.fail_all {
                return Err(PersistenceError::unavailable("injected failure"));
            }
            Ok(self.bookmarks.get(book_id).cloned().unwrap_or_default())
        }

        fn insert_bookmark(&mut self, book_id: &str, page: usize) -> Result<(), PersistenceError> {
            self.check()?;
            self.calls
                .push(StoreCall::InsertBookmark(book_id.to_string(), page));
            let pages = self.bookmarks.entry(book_id.to_string()).or_default();
            if let Err(idx) = pages.binary_search(&page) {
                pages.insert(idx, page);
            }
            Ok(())
        }

        fn delete_bookmark(&mut self, book_id: &str, page: usize) -> Result<(), PersistenceError> {
            self.check()?;
            self.calls
                .push(StoreCall::DeleteBookmark(book_id.to_string(), page));
            if let Some(pages) = self.bookmarks.get_mut(book_id) {
                pages.retain(|&p| p != page);
            }
            Ok(())
        }

        fn load_notes(&mut self, book_id: &str) -> Result<Vec<StickyNote>, PersistenceError> {
            if self.fail_all {
                return Err(PersistenceError::unavailable("injected failure"));
            }
            Ok(self.notes.get(book_id).cloned().unwrap_or_default())
        }

        fn insert_note(&mut self, book_id: &str, note: &NewNote) -> Result<String, PersistenceError> {
            self.check()?;
            self.calls
                .push(StoreCall::InsertNote(book_id.to_string(), note.page));
            let id = self.allocate_id();
            self.notes
                .entry(book_id.to_string())
                .or_default()
                .push(StickyNote {
                    id: NoteId::Stored(id.clone()),
                    page: note.page,
                    x_pct: note.x_pct,
                    y_pct: note.y_pct,
                    content: note.content.clone(),
                    updated_at: Utc::now(),
                });
            Ok(id)
        }

        fn update_note(&mut self, id: &str, patch: &NotePatch) -> Result<(), PersistenceError> {
            self.check()?;
            self.calls.push(StoreCall::UpdateNote(id.to_string()));
            let note = self
                .find_note(id)
                .ok_or_else(|| PersistenceError::not_found(format!("note {id}")))?;
            note.apply_patch(patch);
            Ok(())
        }

        fn delete_note(&mut self, id: &str) -> Result<(), PersistenceError> {
            self.check()?;
            self.calls.push(StoreCall::DeleteNote(id.to_string()));
            let target = NoteId::Stored(id.to_string());
            for notes in self.notes.values_mut() {
                if let Some(idx) = notes.iter().position(|n| n.id == target) {
                    notes.remove(idx);
                    return Ok(());
                }
            }
            Err(PersistenceError::not_found(format!("note {id}")))
        }
    }

    /// Builder for scripted reader sessions
    #[derive(Default)]
    pub struct ScenarioBuilder {
        events: Vec<ReaderEvent>,
    }

    impl ScenarioBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        /// Report visibility ratios for mounted pages
        pub fn visible(mut self, ratios: &[(usize, f32)]) -> Self {
            self.events.push(ReaderEvent::Visibility {
                ratios: ratios.to_vec(),
            });
            self
        }

        /// Let simulated time pass
        pub fn wait_ms(mut self, ms: u64) -> Self {
            self.events.push(ReaderEvent::Advance { ms });
            self
        }

        pub fn go_to(mut self, page: usize) -> Self {
            self.events.push(ReaderEvent::ScrollToPage { page });
            self
        }

        pub fn toggle_bookmark(mut self) -> Self {
            self.events.push(ReaderEvent::ToggleBookmark);
            self
        }

        pub fn create_note(mut self, text: &str) -> Self {
            self.events.push(ReaderEvent::CreateNote);
            self.events.push(ReaderEvent::SetDraft {
                text: text.to_string(),
            });
            self.events.push(ReaderEvent::SaveNote);
            self
        }

        pub fn sync(mut self) -> Self {
            self.events.push(ReaderEvent::Sync);
            self
        }

        pub fn then(mut self, event: ReaderEvent) -> Self {
            self.events.push(event);
            self
        }

        pub fn build(self) -> ScriptedEventSource {
            ScriptedEventSource::new(self.events)
        }
    }
}
