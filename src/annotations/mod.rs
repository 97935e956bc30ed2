//! Bookmarks and sticky notes anchored to document pages

mod bookmarks;
mod notes;

pub use bookmarks::{BookmarkChange, BookmarkDiff, BookmarkSet};
pub use notes::{
    MAX_ANCHOR_PCT, NEW_NOTE_OFFSET_PCT, NewNote, NoteBoard, NoteId, NotePatch, NoteUpdate,
    Point, PointerRelease, StickyNote, clamp_pct,
};
