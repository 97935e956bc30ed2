use std::time::{Duration, Instant};

use pagekeeper::annotations::{NoteId, Point, PointerRelease, StickyNote};
use pagekeeper::document::{FALLBACK_PAGE_SIZE, FixedGeometrySource, PageSize};
use pagekeeper::sync::{AnnotationStore, Rollback, SyncOutcome};
use pagekeeper::test_utils::test_helpers::{MemoryStore, StoreCall};
use pagekeeper::window::PageSlot;
use pagekeeper::{Command, ReaderSession, ViewportConfig};

const BOOK: &str = "book-under-test";

fn open(pages: usize, store: &mut MemoryStore) -> ReaderSession<FixedGeometrySource> {
    ReaderSession::open(
        FixedGeometrySource::new(pages, PageSize::new(600.0, 900.0)),
        store,
        BOOK,
        ViewportConfig::default(),
        1280.0,
    )
}

#[test]
fn jump_to_seven_renders_five_through_nine() {
    let mut store = MemoryStore::new();
    let mut session = open(10, &mut store);

    session.apply(Command::ScrollToPage(7));

    assert_eq!(session.state().current_page, 7);
    assert_eq!(session.rendered_pages(), vec![5, 6, 7, 8, 9]);

    let layout = session.viewport().layout();
    for page in [1, 2, 3, 4, 10] {
        assert_eq!(
            layout.slot(page),
            Some(&PageSlot::Placeholder {
                page,
                size: PageSize::new(600.0, 900.0)
            })
        );
    }
    assert_eq!(layout.rendered_count(), 5);
}

#[test]
fn dominant_page_becomes_current_after_commit() {
    let mut store = MemoryStore::new();
    let mut session = open(10, &mut store);
    let t0 = Instant::now();

    session.apply(Command::Visibility {
        ratios: vec![(1, 0.3), (2, 0.7), (3, 0.5)],
        now: t0,
    });
    assert_eq!(session.state().current_page, 1);

    session.apply(Command::Tick(t0 + Duration::from_millis(100)));
    assert_eq!(session.state().current_page, 2);
    assert_eq!(session.rendered_pages(), vec![1, 2, 3, 4]);
}

#[test]
fn oscillating_pages_never_flicker() {
    let mut store = MemoryStore::new();
    let mut session = open(10, &mut store);
    let mut now = Instant::now();

    for step in 0..20 {
        let (a, b) = if step % 2 == 0 { (0.45, 0.55) } else { (0.55, 0.45) };
        session.apply(Command::Visibility {
            ratios: vec![(1, a), (2, b)],
            now,
        });
        now += Duration::from_millis(60);
        session.apply(Command::Tick(now));
        assert_eq!(session.state().current_page, 1);
    }
}

#[test]
fn unmounted_page_cannot_win() {
    let mut store = MemoryStore::new();
    let mut session = open(10, &mut store);
    let t0 = Instant::now();

    session.apply(Command::Visibility {
        ratios: vec![(1, 0.9)],
        now: t0,
    });
    session.apply(Command::ScrollToPage(7));
    assert_eq!(session.viewport().resolver().ratio(1), None);

    session.apply(Command::Visibility {
        ratios: vec![(1, 1.0), (7, 0.2)],
        now: t0 + Duration::from_millis(10),
    });
    session.apply(Command::Tick(t0 + Duration::from_millis(500)));
    assert_eq!(session.state().current_page, 7);
}

#[test]
fn note_pixels_follow_zoom_but_anchor_does_not() {
    let mut store = MemoryStore::new().with_note(BOOK, 1, 10.0, 20.0, "margin note");
    let mut session = open(3, &mut store);
    let id = session.notes().notes()[0].id.clone();

    assert_eq!(session.note_pixel_position(&id), Some(Point::new(60.0, 180.0)));

    session.apply(Command::SetZoom(2.0));
    assert_eq!(
        session.note_pixel_position(&id),
        Some(Point::new(120.0, 360.0))
    );
    let note = session.notes().get(&id).unwrap();
    assert_eq!((note.x_pct, note.y_pct), (10.0, 20.0));
}

#[test]
fn dragged_note_is_clamped_and_persisted() {
    let mut store = MemoryStore::new().with_note(BOOK, 1, 50.0, 50.0, "");
    let mut session = open(3, &mut store);
    let id = session.notes().notes()[0].id.clone();

    assert!(session.pointer_down(&id, Point::new(0.0, 0.0)));
    assert_eq!(
        session.pointer_move(Point::new(1000.0, -1000.0)),
        Some((95.0, 0.0))
    );
    assert!(matches!(
        session.pointer_up(),
        Some(PointerRelease::Dragged(_))
    ));

    session.sync(&mut store);
    let stored = &store.load_notes(BOOK).unwrap()[0];
    assert_eq!((stored.x_pct, stored.y_pct), (95.0, 0.0));
}

#[test]
fn double_toggle_costs_one_insert_and_one_delete() {
    let mut store = MemoryStore::new();
    let mut session = open(10, &mut store);
    session.apply(Command::ScrollToPage(5));

    session.toggle_bookmark();
    session.sync(&mut store);
    session.toggle_bookmark();
    session.sync(&mut store);

    assert!(session.bookmarks().is_empty());
    assert_eq!(
        store.calls(),
        &[
            StoreCall::InsertBookmark(BOOK.into(), 5),
            StoreCall::DeleteBookmark(BOOK.into(), 5)
        ]
    );
}

#[test]
fn batched_double_toggle_costs_nothing() {
    let mut store = MemoryStore::new();
    let mut session = open(10, &mut store);

    session.toggle_bookmark();
    session.toggle_bookmark();
    assert!(session.sync(&mut store).is_empty());
    assert!(store.calls().is_empty());
}

#[test]
fn geometry_failure_falls_back_to_letter_size() {
    let mut store = MemoryStore::new();
    let session = ReaderSession::open(
        FixedGeometrySource::new(4, PageSize::new(600.0, 900.0)).with_failing_geometry(),
        &mut store,
        BOOK,
        ViewportConfig::default(),
        1280.0,
    );

    let document = session.document();
    assert!(document.geometry_fallback);
    assert_eq!(document.reference_page_size, FALLBACK_PAGE_SIZE);
    assert_eq!(
        session.viewport().page_rendered_size(),
        PageSize::new(612.0, 792.0)
    );
    assert_eq!(session.notifications().count(), 0);
}

#[test]
fn failed_note_insert_removes_the_note() {
    let mut store = MemoryStore::new();
    let mut session = open(3, &mut store);
    let local = session.create_note().unwrap();
    session.set_note_draft("never saved");
    assert!(session.save_note());

    store.set_failing(true);
    let outcomes = session.sync(&mut store);
    assert!(matches!(
        &outcomes[0],
        SyncOutcome::Failed {
            rollback: Rollback::RemoveNote(id),
            ..
        } if *id == local
    ));
    assert_eq!(outcomes[1], SyncOutcome::Skipped);
    assert!(session.notes().notes().is_empty());
    assert_eq!(session.notifications().count(), 1);
}

#[test]
fn failed_note_delete_restores_it() {
    let mut store = MemoryStore::new().with_note(BOOK, 2, 30.0, 30.0, "keep");
    let mut session = open(3, &mut store);
    let id = session.notes().notes()[0].id.clone();

    assert!(session.delete_note(&id));
    assert!(session.notes().notes().is_empty());

    store.fail_next(1);
    session.sync(&mut store);
    assert_eq!(session.notes().get(&id).unwrap().content, "keep");
}

#[test]
fn saved_content_reaches_store_under_stored_id() {
    let mut store = MemoryStore::new();
    let mut session = open(3, &mut store);
    session.apply(Command::NextPage);
    session.create_note();
    session.set_note_draft("page two thoughts");
    session.save_note();

    let outcomes = session.sync(&mut store);
    let SyncOutcome::NoteStored { stored, .. } = &outcomes[0] else {
        panic!("expected NoteStored, got {:?}", outcomes[0]);
    };
    assert!(matches!(stored, NoteId::Stored(_)));

    let notes = store.load_notes(BOOK).unwrap();
    assert_eq!(notes[0].page, 2);
    assert_eq!(notes[0].content, "page two thoughts");
    assert_eq!((notes[0].x_pct, notes[0].y_pct), (5.0, 5.0));
    assert_eq!(session.notes().notes()[0].id, *stored);
}

#[test]
fn dark_mode_inverts_rendered_surfaces() {
    let mut store = MemoryStore::new();
    let mut session = open(3, &mut store);
    let shade = FixedGeometrySource::shade_for(2);
    assert_eq!(session.surface(2).unwrap().pixels[0], shade);

    session.apply(Command::ToggleDarkMode);
    assert!(session.state().dark_mode);
    assert_eq!(session.surface(2).unwrap().pixels[0], 255 - shade);
}

#[test]
fn stored_bookmarks_load_sorted_and_in_range() {
    let mut store = MemoryStore::new().with_bookmarks(BOOK, &[9, 2, 40, 2]);
    let session = open(10, &mut store);
    assert_eq!(session.bookmarks().pages(), &[2, 9]);
}

fn drag_by(session: &mut ReaderSession<FixedGeometrySource>, id: &NoteId, dx: f32, dy: f32) {
    assert!(session.pointer_down(id, Point::new(0.0, 0.0)));
    session.pointer_move(Point::new(dx, dy));
    assert!(matches!(
        session.pointer_up(),
        Some(PointerRelease::Dragged(_))
    ));
}

fn position(note: &StickyNote) -> (f32, f32) {
    (note.x_pct, note.y_pct)
}

#[test]
fn failed_repeated_drag_leaves_note_matching_store() {
    let mut store = MemoryStore::new().with_note(BOOK, 1, 10.0, 10.0, "");
    let mut session = open(3, &mut store);
    let id = session.notes().notes()[0].id.clone();

    drag_by(&mut session, &id, 60.0, 90.0);
    drag_by(&mut session, &id, 60.0, 90.0);
    assert_eq!(position(session.notes().get(&id).unwrap()), (30.0, 30.0));
    assert_eq!(session.pending_sync(), 1);

    store.fail_next(1);
    let outcomes = session.sync(&mut store);
    assert!(matches!(
        &outcomes[..],
        [SyncOutcome::Failed {
            rollback: Rollback::RevertNote { .. },
            ..
        }]
    ));

    let local = position(session.notes().get(&id).unwrap());
    let remote = position(&store.load_notes(BOOK).unwrap()[0]);
    assert_eq!(local, (10.0, 10.0));
    assert_eq!(local, remote);
}

#[test]
fn repeated_drag_reaches_store_in_one_update() {
    let mut store = MemoryStore::new().with_note(BOOK, 1, 10.0, 10.0, "");
    let mut session = open(3, &mut store);
    let id = session.notes().notes()[0].id.clone();

    drag_by(&mut session, &id, 60.0, 90.0);
    session.toggle_bookmark();
    drag_by(&mut session, &id, 60.0, 90.0);

    assert_eq!(
        session.sync(&mut store),
        vec![SyncOutcome::Applied, SyncOutcome::Applied]
    );
    let NoteId::Stored(stored) = &id else {
        panic!("loaded notes carry stored ids");
    };
    assert_eq!(
        store.calls(),
        &[
            StoreCall::UpdateNote(stored.clone()),
            StoreCall::InsertBookmark(BOOK.into(), 1)
        ]
    );
    let remote = position(&store.load_notes(BOOK).unwrap()[0]);
    assert_eq!(remote, (30.0, 30.0));
    assert_eq!(position(session.notes().get(&id).unwrap()), remote);
}
