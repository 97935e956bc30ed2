//! Persistence contract and optimistic reconciliation
//!
//! Annotation edits are applied locally first, then queued here as
//! [`SyncCommand`]s. Flushing the queue executes them against an
//! [`AnnotationStore`] in order; each failure comes back as a [`Rollback`]
//! telling the owner how to undo the optimistic change.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::annotations::{BookmarkChange, BookmarkDiff, NewNote, NoteId, NotePatch, StickyNote};
use crate::error::PersistenceError;

/// Remote store of bookmarks and notes, keyed by book id
pub trait AnnotationStore {
    /// Bookmarked pages, ascending
    fn load_bookmarks(&mut self, book_id: &str) -> Result<Vec<usize>, PersistenceError>;

    fn insert_bookmark(&mut self, book_id: &str, page: usize) -> Result<(), PersistenceError>;

    fn delete_bookmark(&mut self, book_id: &str, page: usize) -> Result<(), PersistenceError>;

    /// Notes of a book; every returned id is [`NoteId::Stored`]
    fn load_notes(&mut self, book_id: &str) -> Result<Vec<StickyNote>, PersistenceError>;

    /// Insert a note and return the id the store assigned
    fn insert_note(&mut self, book_id: &str, note: &NewNote) -> Result<String, PersistenceError>;

    fn update_note(&mut self, id: &str, patch: &NotePatch) -> Result<(), PersistenceError>;

    fn delete_note(&mut self, id: &str) -> Result<(), PersistenceError>;
}

/// A store call waiting to be executed
#[derive(Clone, Debug, PartialEq)]
pub enum SyncCommand {
    InsertBookmark { page: usize },
    DeleteBookmark { page: usize },
    InsertNote { local_id: NoteId, note: NewNote },
    UpdateNote {
        id: NoteId,
        patch: NotePatch,
        previous: NotePatch,
    },
    DeleteNote { note: StickyNote },
}

impl SyncCommand {
    /// Note this command touches, if any
    pub fn note_id(&self) -> Option<&NoteId> {
        match self {
            SyncCommand::InsertNote { local_id, .. } => Some(local_id),
            SyncCommand::UpdateNote { id, .. } => Some(id),
            SyncCommand::DeleteNote { note } => Some(&note.id),
            SyncCommand::InsertBookmark { .. } | SyncCommand::DeleteBookmark { .. } => None,
        }
    }
}

/// How to undo an optimistic change whose store call failed
#[derive(Clone, Debug, PartialEq)]
pub enum Rollback {
    /// Apply this change to the bookmark set
    Bookmark(BookmarkChange),
    /// Remove a note whose insert failed
    RemoveNote(NoteId),
    /// Apply this patch to restore the note
    RevertNote { id: NoteId, patch: NotePatch },
    /// Put a deleted note back
    RestoreNote(StickyNote),
}

/// Result of executing one command
#[derive(Clone, Debug, PartialEq)]
pub enum SyncOutcome {
    Applied,
    /// Insert acknowledged; swap the local id for the stored one
    NoteStored { local: NoteId, stored: NoteId },
    /// Command targeted a note whose insert already failed
    Skipped,
    Failed { error: String, rollback: Rollback },
}

/// FIFO of pending store calls for one book
#[derive(Debug)]
pub struct SyncQueue {
    book_id: String,
    pending: VecDeque<SyncCommand>,
    /// Local note ids the store has acknowledged
    stored_ids: HashMap<NoteId, String>,
    failed_inserts: HashSet<NoteId>,
}

impl SyncQueue {
    #[must_use]
    pub fn new(book_id: impl Into<String>) -> Self {
        Self {
            book_id: book_id.into(),
            pending: VecDeque::new(),
            stored_ids: HashMap::new(),
            failed_inserts: HashSet::new(),
        }
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &SyncCommand> {
        self.pending.iter()
    }

    /// Queue a command.
    ///
    /// A bookmark delete that cancels an unflushed insert of the same page
    /// (or the reverse) removes both, so a double toggle costs no store calls.
    pub fn enqueue(&mut self, command: SyncCommand) {
        let opposite = match &command {
            SyncCommand::InsertBookmark { page } => Some(SyncCommand::DeleteBookmark { page: *page }),
            SyncCommand::DeleteBookmark { page } => Some(SyncCommand::InsertBookmark { page: *page }),
            _ => None,
        };
        if let Some(opposite) = opposite {
            if let Some(idx) = self.pending.iter().rposition(|c| *c == opposite) {
                self.pending.remove(idx);
                log::trace!("Coalesced {command:?} with pending {opposite:?}");
                return;
            }
        }
        let command = match command {
            SyncCommand::UpdateNote {
                id,
                patch,
                previous,
            } => match self.squash_update(&id, &patch, previous) {
                Some(previous) => SyncCommand::UpdateNote {
                    id,
                    patch,
                    previous,
                },
                None => return,
            },
            other => other,
        };
        self.pending.push_back(command);
    }

    /// Fold an update into the last unflushed command for the same note when
    /// that command is an update.
    ///
    /// One store call then carries both changes and its revert patch holds the
    /// values from before the first one. Returns `previous` back when there is
    /// nothing to fold into.
    fn squash_update(
        &mut self,
        id: &NoteId,
        patch: &NotePatch,
        previous: NotePatch,
    ) -> Option<NotePatch> {
        let last = self.pending.iter().rposition(|c| c.note_id() == Some(id));
        let Some(SyncCommand::UpdateNote {
            patch: last_patch,
            previous: last_previous,
            ..
        }) = last.and_then(|idx| self.pending.get_mut(idx))
        else {
            return Some(previous);
        };
        last_patch.overlay(patch);
        let mut merged = previous;
        merged.overlay(last_previous);
        *last_previous = merged;
        log::trace!("Squashed update of note {id} into pending update");
        None
    }

    /// Queue the store calls for a bookmark sequence change
    pub fn enqueue_bookmark_diff(&mut self, diff: &BookmarkDiff) {
        for &page in &diff.added {
            self.enqueue(SyncCommand::InsertBookmark { page });
        }
        for &page in &diff.removed {
            self.enqueue(SyncCommand::DeleteBookmark { page });
        }
    }

    /// Execute every pending command in order
    pub fn flush<S: AnnotationStore + ?Sized>(&mut self, store: &mut S) -> Vec<SyncOutcome> {
        let mut outcomes = Vec::with_capacity(self.pending.len());
        while let Some(command) = self.pending.pop_front() {
            let outcome = self.execute(store, command);
            if let SyncOutcome::Failed { error, rollback } = &outcome {
                log::error!("Annotation sync failed for book {}: {error}; reverting {rollback:?}", self.book_id);
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    fn execute<S: AnnotationStore + ?Sized>(
        &mut self,
        store: &mut S,
        command: SyncCommand,
    ) -> SyncOutcome {
        match command {
            SyncCommand::InsertBookmark { page } => {
                match store.insert_bookmark(&self.book_id, page) {
                    Ok(()) => SyncOutcome::Applied,
                    Err(e) => failed(e, Rollback::Bookmark(BookmarkChange::Removed(page))),
                }
            }

            SyncCommand::DeleteBookmark { page } => {
                match store.delete_bookmark(&self.book_id, page) {
                    Ok(()) => SyncOutcome::Applied,
                    Err(e) => failed(e, Rollback::Bookmark(BookmarkChange::Added(page))),
                }
            }

            SyncCommand::InsertNote { local_id, note } => {
                match store.insert_note(&self.book_id, &note) {
                    Ok(stored) => {
                        self.stored_ids.insert(local_id.clone(), stored.clone());
                        SyncOutcome::NoteStored {
                            local: local_id,
                            stored: NoteId::Stored(stored),
                        }
                    }
                    Err(e) => {
                        self.failed_inserts.insert(local_id.clone());
                        failed(e, Rollback::RemoveNote(local_id))
                    }
                }
            }

            SyncCommand::UpdateNote {
                id,
                patch,
                previous,
            } => {
                let Some(store_id) = self.resolve(&id) else {
                    return SyncOutcome::Skipped;
                };
                match store.update_note(&store_id, &patch) {
                    Ok(()) => SyncOutcome::Applied,
                    Err(e) => failed(
                        e,
                        Rollback::RevertNote {
                            id: NoteId::Stored(store_id),
                            patch: previous,
                        },
                    ),
                }
            }

            SyncCommand::DeleteNote { mut note } => {
                let Some(store_id) = self.resolve(&note.id) else {
                    return SyncOutcome::Skipped;
                };
                match store.delete_note(&store_id) {
                    Ok(()) => SyncOutcome::Applied,
                    Err(e) => {
                        note.id = NoteId::Stored(store_id);
                        failed(e, Rollback::RestoreNote(note))
                    }
                }
            }
        }
    }

    /// Store id for a note, following acknowledged local ids
    fn resolve(&self, id: &NoteId) -> Option<String> {
        match id {
            NoteId::Stored(stored) => Some(stored.clone()),
            local @ NoteId::Local(_) => {
                let resolved = self.stored_ids.get(local).cloned();
                if resolved.is_none() && !self.failed_inserts.contains(local) {
                    log::warn!("Note {local} has no stored id; dropping command");
                }
                resolved
            }
        }
    }
}

fn failed(error: PersistenceError, rollback: Rollback) -> SyncOutcome {
    SyncOutcome::Failed {
        error: error.to_string(),
        rollback,
    }
}
