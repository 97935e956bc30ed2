//! Sticky notes anchored by page percentage
//!
//! A note's position is stored as a percentage of its page's rendered width
//! and height. Pixel positions are derived on demand from the page's current
//! rendered size, so zooming never moves a note relative to the page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::PageSize;

/// Offset (in percent) of a freshly created note from the page's top-left corner
pub const NEW_NOTE_OFFSET_PCT: f32 = 5.0;

/// Upper bound of both anchor percentages; keeps the anchor point on the page
pub const MAX_ANCHOR_PCT: f32 = 95.0;

/// Clamp an anchor percentage to `[0, MAX_ANCHOR_PCT]`
#[must_use]
pub fn clamp_pct(pct: f32) -> f32 {
    if pct.is_nan() {
        0.0
    } else {
        pct.clamp(0.0, MAX_ANCHOR_PCT)
    }
}

/// Identity of a note: local until the store acknowledges the insert
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteId {
    Local(u64),
    Stored(String),
}

impl NoteId {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored(_))
    }
}

impl std::fmt::Display for NoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(n) => write!(f, "local-{n}"),
            Self::Stored(id) => f.write_str(id),
        }
    }
}

/// A pointer position in viewport pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StickyNote {
    pub id: NoteId,
    pub page: usize,
    pub x_pct: f32,
    pub y_pct: f32,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

impl StickyNote {
    /// Top-left of the note on a page rendered at `rendered` size
    pub fn pixel_position(&self, rendered: PageSize) -> Point {
        Point {
            x: self.x_pct / 100.0 * rendered.width,
            y: self.y_pct / 100.0 * rendered.height,
        }
    }

    /// Fields of this note as they would be sent to the store
    pub fn to_new(&self) -> NewNote {
        NewNote {
            page: self.page,
            x_pct: self.x_pct,
            y_pct: self.y_pct,
            content: self.content.clone(),
        }
    }

    /// Apply a partial update, returning the patch that undoes it
    pub fn apply_patch(&mut self, patch: &NotePatch) -> NotePatch {
        let mut previous = NotePatch::default();
        if let Some(page) = patch.page {
            previous.page = Some(self.page);
            self.page = page;
        }
        if let Some(x) = patch.x_pct {
            previous.x_pct = Some(self.x_pct);
            self.x_pct = clamp_pct(x);
        }
        if let Some(y) = patch.y_pct {
            previous.y_pct = Some(self.y_pct);
            self.y_pct = clamp_pct(y);
        }
        if let Some(content) = &patch.content {
            previous.content = Some(std::mem::replace(&mut self.content, content.clone()));
        }
        self.updated_at = Utc::now();
        previous
    }
}

/// Note fields for an insert
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewNote {
    pub page: usize,
    pub x_pct: f32,
    pub y_pct: f32,
    pub content: String,
}

/// Partial note update
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NotePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_pct: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_pct: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl NotePatch {
    pub fn position(x_pct: f32, y_pct: f32) -> Self {
        Self {
            x_pct: Some(x_pct),
            y_pct: Some(y_pct),
            ..Self::default()
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.page.is_none() && self.x_pct.is_none() && self.y_pct.is_none() && self.content.is_none()
    }

    /// Take every field `other` sets, keep the rest
    pub fn overlay(&mut self, other: &NotePatch) {
        if other.page.is_some() {
            self.page = other.page;
        }
        if other.x_pct.is_some() {
            self.x_pct = other.x_pct;
        }
        if other.y_pct.is_some() {
            self.y_pct = other.y_pct;
        }
        if other.content.is_some() {
            self.content.clone_from(&other.content);
        }
    }
}

/// Change produced by an explicit save or a finished drag
#[derive(Clone, Debug, PartialEq)]
pub struct NoteUpdate {
    pub id: NoteId,
    pub patch: NotePatch,
    /// Patch restoring the state before the update
    pub previous: NotePatch,
}

/// How a pointer-down/up cycle on a note ended
#[derive(Clone, Debug, PartialEq)]
pub enum PointerRelease {
    /// No move fired: treat as a click (enter edit mode)
    Click(NoteId),
    /// At least one move fired: the note was repositioned
    Dragged(NoteUpdate),
}

#[derive(Clone, Debug)]
struct DragSession {
    id: NoteId,
    start_pointer: Point,
    start_pct: (f32, f32),
    original_pct: (f32, f32),
    moved: bool,
}

#[derive(Clone, Debug)]
struct EditState {
    id: NoteId,
    draft: String,
}

/// Sticky notes of one book plus the transient edit and drag state
#[derive(Debug, Default)]
pub struct NoteBoard {
    notes: Vec<StickyNote>,
    editing: Option<EditState>,
    drag: Option<DragSession>,
    next_local_id: u64,
}

impl NoteBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Board populated with notes loaded from the store
    pub fn with_notes(notes: Vec<StickyNote>) -> Self {
        let mut board = Self::new();
        board.notes = notes;
        board.sort_notes();
        board
    }

    pub fn notes(&self) -> &[StickyNote] {
        &self.notes
    }

    pub fn get(&self, id: &NoteId) -> Option<&StickyNote> {
        self.notes.iter().find(|n| &n.id == id)
    }

    pub fn notes_on(&self, page: usize) -> impl Iterator<Item = &StickyNote> {
        self.notes.iter().filter(move |n| n.page == page)
    }

    pub fn editing(&self) -> Option<&NoteId> {
        self.editing.as_ref().map(|e| &e.id)
    }

    pub fn draft(&self) -> Option<&str> {
        self.editing.as_ref().map(|e| e.draft.as_str())
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Whether the note being edited has a draft that differs from its content
    pub fn has_unsaved_draft(&self) -> bool {
        self.editing.as_ref().is_some_and(|edit| {
            self.get(&edit.id)
                .is_some_and(|note| note.content != edit.draft)
        })
    }

    /// Create an empty note on `page` and start editing it.
    ///
    /// Refused while another note has an unsaved draft; save or cancel it first.
    pub fn create(&mut self, page: usize) -> Option<NoteId> {
        if self.has_unsaved_draft() {
            log::debug!("Not creating a note on page {page}: unsaved draft pending");
            return None;
        }
        let id = NoteId::Local(self.next_local_id);
        self.next_local_id += 1;

        self.notes.push(StickyNote {
            id: id.clone(),
            page,
            x_pct: NEW_NOTE_OFFSET_PCT,
            y_pct: NEW_NOTE_OFFSET_PCT,
            content: String::new(),
            updated_at: Utc::now(),
        });
        self.sort_notes();
        self.editing = Some(EditState {
            id: id.clone(),
            draft: String::new(),
        });

        log::debug!("Created note {id} on page {page}");
        Some(id)
    }

    /// Enter edit mode with the note's current content as draft
    pub fn begin_edit(&mut self, id: &NoteId) -> bool {
        let Some(note) = self.get(id) else {
            return false;
        };
        self.editing = Some(EditState {
            id: id.clone(),
            draft: note.content.clone(),
        });
        true
    }

    /// Replace the draft text; nothing is saved until [`NoteBoard::save`]
    pub fn set_draft(&mut self, text: impl Into<String>) {
        if let Some(edit) = &mut self.editing {
            edit.draft = text.into();
        }
    }

    /// Commit the draft locally and leave edit mode
    pub fn save(&mut self) -> Option<NoteUpdate> {
        let edit = self.editing.take()?;
        let note = self.notes.iter_mut().find(|n| n.id == edit.id)?;
        let patch = NotePatch::content(edit.draft);
        let previous = note.apply_patch(&patch);
        Some(NoteUpdate {
            id: edit.id,
            patch,
            previous,
        })
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    /// Remove a note, returning it so it can be restored
    pub fn delete(&mut self, id: &NoteId) -> Option<StickyNote> {
        let idx = self.notes.iter().position(|n| &n.id == id)?;
        if self.editing.as_ref().is_some_and(|e| &e.id == id) {
            self.editing = None;
        }
        if self.drag.as_ref().is_some_and(|d| &d.id == id) {
            self.drag = None;
        }
        Some(self.notes.remove(idx))
    }

    /// Put a deleted note back
    pub fn restore(&mut self, note: StickyNote) {
        if self.get(&note.id).is_none() {
            self.notes.push(note);
            self.sort_notes();
        }
    }

    /// Apply a patch to a note (used to revert a failed update)
    pub fn patch(&mut self, id: &NoteId, patch: &NotePatch) -> bool {
        match self.notes.iter_mut().find(|n| &n.id == id) {
            Some(note) => {
                note.apply_patch(patch);
                true
            }
            None => false,
        }
    }

    /// Swap a local id for the one the store assigned
    pub fn assign_stored_id(&mut self, local: &NoteId, stored: NoteId) {
        if let Some(note) = self.notes.iter_mut().find(|n| &n.id == local) {
            note.id = stored.clone();
        }
        if let Some(edit) = self.editing.as_mut().filter(|e| &e.id == local) {
            edit.id = stored.clone();
        }
        if let Some(drag) = self.drag.as_mut().filter(|d| &d.id == local) {
            drag.id = stored;
        }
    }

    /// Begin a drag on a note that is not being edited
    pub fn pointer_down(&mut self, id: &NoteId, pointer: Point) -> bool {
        if self.drag.is_some() || self.editing.as_ref().is_some_and(|e| &e.id == id) {
            return false;
        }
        let Some(note) = self.get(id) else {
            return false;
        };
        self.drag = Some(DragSession {
            id: id.clone(),
            start_pointer: pointer,
            start_pct: (note.x_pct, note.y_pct),
            original_pct: (note.x_pct, note.y_pct),
            moved: false,
        });
        true
    }

    /// Reposition the dragged note; `page_size` is the page's current rendered size
    pub fn pointer_move(&mut self, pointer: Point, page_size: PageSize) -> Option<(f32, f32)> {
        let drag = self.drag.as_mut()?;
        drag.moved = true;
        if !page_size.is_usable() {
            return None;
        }

        let x_pct = clamp_pct(
            drag.start_pct.0 + (pointer.x - drag.start_pointer.x) / page_size.width * 100.0,
        );
        let y_pct = clamp_pct(
            drag.start_pct.1 + (pointer.y - drag.start_pointer.y) / page_size.height * 100.0,
        );

        let id = drag.id.clone();
        let note = self.notes.iter_mut().find(|n| n.id == id)?;
        note.x_pct = x_pct;
        note.y_pct = y_pct;
        Some((x_pct, y_pct))
    }

    /// End the drag session, wherever the pointer is
    pub fn pointer_up(&mut self) -> Option<PointerRelease> {
        let drag = self.drag.take()?;
        if !drag.moved {
            return Some(PointerRelease::Click(drag.id));
        }

        let note = self.notes.iter_mut().find(|n| n.id == drag.id)?;
        note.updated_at = Utc::now();
        Some(PointerRelease::Dragged(NoteUpdate {
            id: drag.id,
            patch: NotePatch::position(note.x_pct, note.y_pct),
            previous: NotePatch::position(drag.original_pct.0, drag.original_pct.1),
        }))
    }

    /// Abort a drag, putting the note back where it started
    pub fn cancel_drag(&mut self) {
        if let Some(drag) = self.drag.take() {
            if let Some(note) = self.notes.iter_mut().find(|n| n.id == drag.id) {
                note.x_pct = drag.original_pct.0;
                note.y_pct = drag.original_pct.1;
            }
        }
    }

    fn sort_notes(&mut self) {
        self.notes
            .sort_by(|a, b| a.page.cmp(&b.page).then(a.updated_at.cmp(&b.updated_at)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_at(x_pct: f32, y_pct: f32) -> StickyNote {
        StickyNote {
            id: NoteId::Stored("n1".into()),
            page: 1,
            x_pct,
            y_pct,
            content: "hello".into(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn pixel_position_is_zoom_invariant() {
        let note = note_at(10.0, 20.0);
        assert_eq!(
            note.pixel_position(PageSize::new(600.0, 900.0)),
            Point::new(60.0, 180.0)
        );
        assert_eq!(
            note.pixel_position(PageSize::new(1200.0, 1800.0)),
            Point::new(120.0, 360.0)
        );
        assert_eq!((note.x_pct, note.y_pct), (10.0, 20.0));
    }

    #[test]
    fn create_starts_editing_at_default_anchor() {
        let mut board = NoteBoard::new();
        let id = board.create(4).unwrap();
        let note = board.get(&id).unwrap();
        assert_eq!(note.page, 4);
        assert_eq!((note.x_pct, note.y_pct), (5.0, 5.0));
        assert!(note.content.is_empty());
        assert_eq!(board.editing(), Some(&note.id));
    }

    #[test]
    fn save_is_explicit() {
        let mut board = NoteBoard::with_notes(vec![note_at(1.0, 1.0)]);
        let id = NoteId::Stored("n1".into());
        assert!(board.begin_edit(&id));
        board.set_draft("updated");
        assert_eq!(board.get(&id).unwrap().content, "hello");

        let update = board.save().unwrap();
        assert_eq!(update.patch, NotePatch::content("updated"));
        assert_eq!(update.previous, NotePatch::content("hello"));
        assert_eq!(board.get(&id).unwrap().content, "updated");
        assert!(board.editing().is_none());
    }

    #[test]
    fn drag_moves_by_percentage_of_rendered_size() {
        let mut board = NoteBoard::with_notes(vec![note_at(10.0, 10.0)]);
        let id = NoteId::Stored("n1".into());
        let page = PageSize::new(600.0, 900.0);

        assert!(board.pointer_down(&id, Point::new(100.0, 100.0)));
        assert_eq!(
            board.pointer_move(Point::new(160.0, 190.0), page),
            Some((20.0, 20.0))
        );

        let release = board.pointer_up().unwrap();
        assert_eq!(
            release,
            PointerRelease::Dragged(NoteUpdate {
                id: id.clone(),
                patch: NotePatch::position(20.0, 20.0),
                previous: NotePatch::position(10.0, 10.0),
            })
        );
        assert!(!board.is_dragging());
    }

    #[test]
    fn drag_clamps_to_page() {
        let mut board = NoteBoard::with_notes(vec![note_at(50.0, 50.0)]);
        let id = NoteId::Stored("n1".into());
        let page = PageSize::new(100.0, 100.0);

        board.pointer_down(&id, Point::new(0.0, 0.0));
        assert_eq!(
            board.pointer_move(Point::new(400.0, -400.0), page),
            Some((95.0, 0.0))
        );
        assert_eq!(
            board.pointer_move(Point::new(-400.0, 400.0), page),
            Some((0.0, 95.0))
        );
        assert_eq!(
            board.pointer_move(Point::new(45.0, -50.0), page),
            Some((95.0, 0.0))
        );
    }

    #[test]
    fn click_without_move_is_not_a_drag() {
        let mut board = NoteBoard::with_notes(vec![note_at(10.0, 10.0)]);
        let id = NoteId::Stored("n1".into());
        board.pointer_down(&id, Point::new(5.0, 5.0));
        assert_eq!(board.pointer_up(), Some(PointerRelease::Click(id)));
    }

    #[test]
    fn zero_net_drag_is_still_a_drag() {
        let mut board = NoteBoard::with_notes(vec![note_at(10.0, 10.0)]);
        let id = NoteId::Stored("n1".into());
        let page = PageSize::new(100.0, 100.0);
        board.pointer_down(&id, Point::new(5.0, 5.0));
        board.pointer_move(Point::new(30.0, 30.0), page);
        board.pointer_move(Point::new(5.0, 5.0), page);
        assert!(matches!(
            board.pointer_up(),
            Some(PointerRelease::Dragged(_))
        ));
    }

    #[test]
    fn editing_note_cannot_be_dragged() {
        let mut board = NoteBoard::with_notes(vec![note_at(10.0, 10.0)]);
        let id = NoteId::Stored("n1".into());
        board.begin_edit(&id);
        assert!(!board.pointer_down(&id, Point::new(0.0, 0.0)));
        assert_eq!(board.pointer_up(), None);
    }

    #[test]
    fn delete_and_restore() {
        let mut board = NoteBoard::with_notes(vec![note_at(10.0, 10.0)]);
        let id = NoteId::Stored("n1".into());
        let removed = board.delete(&id).unwrap();
        assert!(board.notes().is_empty());
        board.restore(removed);
        assert_eq!(board.notes().len(), 1);
    }

    #[test]
    fn create_refused_while_draft_unsaved() {
        let mut board = NoteBoard::new();
        let first = board.create(1).unwrap();
        board.set_draft("half a thought");
        assert!(board.has_unsaved_draft());
        assert_eq!(board.create(2), None);
        assert_eq!(board.editing(), Some(&first));
        assert_eq!(board.draft(), Some("half a thought"));

        board.save();
        assert!(!board.has_unsaved_draft());
        assert!(board.create(2).is_some());
        assert_eq!(board.notes().len(), 2);
    }

    #[test]
    fn assign_stored_id_follows_editing() {
        let mut board = NoteBoard::new();
        let local = board.create(1).unwrap();
        let stored = NoteId::Stored("abc".into());
        board.assign_stored_id(&local, stored.clone());
        assert_eq!(board.editing(), Some(&stored));
        assert!(board.get(&stored).is_some());
        assert!(board.get(&local).is_none());
    }

    #[test]
    fn cancel_drag_restores_position() {
        let mut board = NoteBoard::with_notes(vec![note_at(10.0, 10.0)]);
        let id = NoteId::Stored("n1".into());
        board.pointer_down(&id, Point::new(0.0, 0.0));
        board.pointer_move(Point::new(50.0, 50.0), PageSize::new(100.0, 100.0));
        board.cancel_drag();
        let note = board.get(&id).unwrap();
        assert_eq!((note.x_pct, note.y_pct), (10.0, 10.0));
    }
}
