use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::annotations::{NoteId, Point};
use crate::document::DocumentSource;
use crate::session::ReaderSession;
use crate::sync::AnnotationStore;
use crate::viewport::Command;

/// Input to a reader session.
///
/// Time never advances on its own: `Advance` moves the simulated clock and
/// fires any commit that became due.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReaderEvent {
    Visibility { ratios: Vec<(usize, f32)> },
    Advance { ms: u64 },
    ScrollToPage { page: usize },
    NextPage,
    PrevPage,
    SetZoom { scale: f32 },
    ZoomIn,
    ZoomOut,
    ToggleDarkMode,
    ToggleBookmark,
    ToggleBookmarkAt { page: usize },
    JumpToBookmark { page: usize },
    NextBookmark,
    PrevBookmark,
    JumpBack,
    JumpForward,
    CreateNote,
    EditNote { note: NoteId },
    SetDraft { text: String },
    SaveNote,
    CancelEdit,
    DeleteNote { note: NoteId },
    PointerDown { note: NoteId, x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    PointerUp,
    Sync,
    Close,
}

/// Trait for abstracting event sources to enable testing
pub trait EventSource {
    /// Next event, or `None` once the source is exhausted
    fn next_event(&mut self) -> Result<Option<ReaderEvent>>;
}

/// Fixed list of events, typically loaded from a JSON script
pub struct ScriptedEventSource {
    events: VecDeque<ReaderEvent>,
}

impl ScriptedEventSource {
    pub fn new(events: Vec<ReaderEvent>) -> Self {
        Self {
            events: events.into(),
        }
    }

    /// Parse a JSON array of events
    pub fn from_json(json: &str) -> Result<Self> {
        let events: Vec<ReaderEvent> =
            serde_json::from_str(json).context("Failed to parse event script")?;
        Ok(Self::new(events))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event script {}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl EventSource for ScriptedEventSource {
    fn next_event(&mut self) -> Result<Option<ReaderEvent>> {
        Ok(self.events.pop_front())
    }
}

/// Events pushed from another thread; exhausted when every sender is dropped
pub struct ChannelEventSource {
    rx: flume::Receiver<ReaderEvent>,
}

impl ChannelEventSource {
    pub fn new(rx: flume::Receiver<ReaderEvent>) -> Self {
        Self { rx }
    }

    pub fn channel() -> (flume::Sender<ReaderEvent>, Self) {
        let (tx, rx) = flume::unbounded();
        (tx, Self::new(rx))
    }
}

impl EventSource for ChannelEventSource {
    fn next_event(&mut self) -> Result<Option<ReaderEvent>> {
        Ok(self.rx.recv().ok())
    }
}

/// Drive `session` with events until the source is exhausted or a `Close`
/// event arrives. Returns the number of events handled.
pub fn run_events<S, E, A>(
    session: &mut ReaderSession<S>,
    events: &mut E,
    store: &mut A,
    start: Instant,
) -> Result<usize>
where
    S: DocumentSource,
    E: EventSource + ?Sized,
    A: AnnotationStore + ?Sized,
{
    let mut clock = start;
    let mut handled = 0;

    while let Some(event) = events.next_event()? {
        handled += 1;
        log::trace!("Event {event:?} at +{:?}", clock - start);
        match event {
            ReaderEvent::Visibility { ratios } => {
                session.apply(Command::Visibility { ratios, now: clock });
            }
            ReaderEvent::Advance { ms } => {
                clock += Duration::from_millis(ms);
                session.apply(Command::Tick(clock));
            }
            ReaderEvent::ScrollToPage { page } => {
                session.apply(Command::ScrollToPage(page));
            }
            ReaderEvent::NextPage => {
                session.apply(Command::NextPage);
            }
            ReaderEvent::PrevPage => {
                session.apply(Command::PrevPage);
            }
            ReaderEvent::SetZoom { scale } => {
                session.apply(Command::SetZoom(scale));
            }
            ReaderEvent::ZoomIn => {
                session.apply(Command::ZoomIn);
            }
            ReaderEvent::ZoomOut => {
                session.apply(Command::ZoomOut);
            }
            ReaderEvent::ToggleDarkMode => {
                session.apply(Command::ToggleDarkMode);
            }
            ReaderEvent::ToggleBookmark => {
                session.toggle_bookmark();
            }
            ReaderEvent::ToggleBookmarkAt { page } => {
                session.toggle_bookmark_at(page);
            }
            ReaderEvent::JumpToBookmark { page } => {
                session.jump_to_bookmark(page);
            }
            ReaderEvent::NextBookmark => {
                session.jump_to_next_bookmark();
            }
            ReaderEvent::PrevBookmark => {
                session.jump_to_prev_bookmark();
            }
            ReaderEvent::JumpBack => {
                session.jump_back();
            }
            ReaderEvent::JumpForward => {
                session.jump_forward();
            }
            ReaderEvent::CreateNote => {
                session.create_note();
            }
            ReaderEvent::EditNote { note } => {
                session.edit_note(&note);
            }
            ReaderEvent::SetDraft { text } => session.set_note_draft(text),
            ReaderEvent::SaveNote => {
                session.save_note();
            }
            ReaderEvent::CancelEdit => session.cancel_note_edit(),
            ReaderEvent::DeleteNote { note } => {
                session.delete_note(&note);
            }
            ReaderEvent::PointerDown { note, x, y } => {
                session.pointer_down(&note, Point::new(x, y));
            }
            ReaderEvent::PointerMove { x, y } => {
                session.pointer_move(Point::new(x, y));
            }
            ReaderEvent::PointerUp => {
                session.pointer_up();
            }
            ReaderEvent::Sync => {
                session.sync(store);
            }
            ReaderEvent::Close => {
                session.close();
                break;
            }
        }
    }

    Ok(handled)
}
