//! File-backed annotation store
//!
//! One YAML file per book, named after the md5 of the book id. Note ids carry
//! the book hash as a prefix so updates and deletes can find their file
//! without being told the book.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::annotations::{NewNote, NoteId, NotePatch, StickyNote, clamp_pct};
use crate::error::PersistenceError;
use crate::sync::AnnotationStore;

const ANNOTATIONS_DIR_ENV: &str = "PAGEKEEPER_ANNOTATIONS_DIR";
const DEFAULT_ANNOTATIONS_DIR: &str = ".pagekeeper_annotations";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NoteRecord {
    id: String,
    page: usize,
    x_pct: f32,
    y_pct: f32,
    #[serde(default)]
    content: String,
    updated_at: DateTime<Utc>,
}

impl NoteRecord {
    fn to_note(&self) -> StickyNote {
        StickyNote {
            id: NoteId::Stored(self.id.clone()),
            page: self.page,
            x_pct: clamp_pct(self.x_pct),
            y_pct: clamp_pct(self.y_pct),
            content: self.content.clone(),
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BookAnnotations {
    #[serde(default)]
    bookmarks: Vec<usize>,
    #[serde(default)]
    notes: Vec<NoteRecord>,
    #[serde(default)]
    next_note: u64,
}

pub struct YamlAnnotationStore {
    dir: PathBuf,
}

impl YamlAnnotationStore {
    /// Open a store rooted at `dir`, or at the env/default location when `None`
    pub fn new(dir: Option<&Path>) -> anyhow::Result<Self> {
        let dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => Self::default_dir()?,
        };
        if !dir.exists() {
            fs::create_dir_all(&dir).context("Failed to create annotations directory")?;
        }
        log::debug!("Annotation store at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding a book's annotations
    pub fn book_file(&self, book_id: &str) -> PathBuf {
        self.file_for_hash(&book_hash(book_id))
    }

    fn default_dir() -> anyhow::Result<PathBuf> {
        if let Ok(custom_dir) = std::env::var(ANNOTATIONS_DIR_ENV) {
            return Ok(PathBuf::from(custom_dir));
        }
        Ok(std::env::current_dir()
            .context("Could not determine current directory")?
            .join(DEFAULT_ANNOTATIONS_DIR))
    }

    fn file_for_hash(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("book_{hash}.yaml"))
    }

    fn load(&self, path: &Path) -> Result<BookAnnotations, PersistenceError> {
        if !path.exists() {
            return Ok(BookAnnotations::default());
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(BookAnnotations::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    fn save(&self, path: &Path, annotations: &BookAnnotations) -> Result<(), PersistenceError> {
        let yaml = serde_yaml::to_string(annotations)?;
        fs::write(path, yaml)?;
        Ok(())
    }

    /// Load, mutate and write back one book file
    fn modify<T>(
        &self,
        path: &Path,
        f: impl FnOnce(&mut BookAnnotations) -> Result<T, PersistenceError>,
    ) -> Result<T, PersistenceError> {
        let mut annotations = self.load(path)?;
        let result = f(&mut annotations)?;
        self.save(path, &annotations)?;
        Ok(result)
    }

    fn note_file(&self, id: &str) -> Result<PathBuf, PersistenceError> {
        let (hash, _) = id
            .split_once('-')
            .ok_or_else(|| PersistenceError::not_found(format!("note {id}")))?;
        Ok(self.file_for_hash(hash))
    }
}

impl AnnotationStore for YamlAnnotationStore {
    fn load_bookmarks(&mut self, book_id: &str) -> Result<Vec<usize>, PersistenceError> {
        let mut pages = self.load(&self.book_file(book_id))?.bookmarks;
        pages.sort_unstable();
        pages.dedup();
        Ok(pages)
    }

    fn insert_bookmark(&mut self, book_id: &str, page: usize) -> Result<(), PersistenceError> {
        self.modify(&self.book_file(book_id), |book| {
            if let Err(idx) = book.bookmarks.binary_search(&page) {
                book.bookmarks.insert(idx, page);
            }
            Ok(())
        })
    }

    fn delete_bookmark(&mut self, book_id: &str, page: usize) -> Result<(), PersistenceError> {
        self.modify(&self.book_file(book_id), |book| {
            book.bookmarks.retain(|&p| p != page);
            Ok(())
        })
    }

    fn load_notes(&mut self, book_id: &str) -> Result<Vec<StickyNote>, PersistenceError> {
        let book = self.load(&self.book_file(book_id))?;
        Ok(book.notes.iter().map(NoteRecord::to_note).collect())
    }

    fn insert_note(&mut self, book_id: &str, note: &NewNote) -> Result<String, PersistenceError> {
        let hash = book_hash(book_id);
        self.modify(&self.file_for_hash(&hash), |book| {
            let id = format!("{hash}-{}", book.next_note);
            book.next_note += 1;
            book.notes.push(NoteRecord {
                id: id.clone(),
                page: note.page,
                x_pct: clamp_pct(note.x_pct),
                y_pct: clamp_pct(note.y_pct),
                content: note.content.clone(),
                updated_at: Utc::now(),
            });
            book.notes
                .sort_by(|a, b| a.page.cmp(&b.page).then(a.updated_at.cmp(&b.updated_at)));
            Ok(id)
        })
    }

    fn update_note(&mut self, id: &str, patch: &NotePatch) -> Result<(), PersistenceError> {
        self.modify(&self.note_file(id)?, |book| {
            let record = book
                .notes
                .iter_mut()
                .find(|n| n.id == id)
                .ok_or_else(|| PersistenceError::not_found(format!("note {id}")))?;
            if let Some(page) = patch.page {
                record.page = page;
            }
            if let Some(x) = patch.x_pct {
                record.x_pct = clamp_pct(x);
            }
            if let Some(y) = patch.y_pct {
                record.y_pct = clamp_pct(y);
            }
            if let Some(content) = &patch.content {
                record.content.clone_from(content);
            }
            record.updated_at = Utc::now();
            Ok(())
        })
    }

    fn delete_note(&mut self, id: &str) -> Result<(), PersistenceError> {
        self.modify(&self.note_file(id)?, |book| {
            let before = book.notes.len();
            book.notes.retain(|n| n.id != id);
            if book.notes.len() == before {
                return Err(PersistenceError::not_found(format!("note {id}")));
            }
            Ok(())
        })
    }
}

fn book_hash(book_id: &str) -> String {
    let digest = md5::compute(book_id.as_bytes());
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn create_store() -> (TempDir, YamlAnnotationStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = YamlAnnotationStore::new(Some(&temp_dir.path().join("notes"))).unwrap();
        (temp_dir, store)
    }

    fn new_note(page: usize, content: &str) -> NewNote {
        NewNote {
            page,
            x_pct: 5.0,
            y_pct: 5.0,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_bookmarks_persist_sorted() {
        let (_temp_dir, mut store) = create_store();
        store.insert_bookmark("book-a", 9).unwrap();
        store.insert_bookmark("book-a", 3).unwrap();
        store.insert_bookmark("book-a", 9).unwrap();
        assert_eq!(store.load_bookmarks("book-a").unwrap(), vec![3, 9]);

        store.delete_bookmark("book-a", 9).unwrap();
        assert_eq!(store.load_bookmarks("book-a").unwrap(), vec![3]);
        assert!(store.load_bookmarks("book-b").unwrap().is_empty());
    }

    #[test]
    fn test_note_lifecycle() {
        let (_temp_dir, mut store) = create_store();
        let id = store.insert_note("book", &new_note(2, "")).unwrap();

        store
            .update_note(&id, &NotePatch::content("remember this"))
            .unwrap();
        store
            .update_note(&id, &NotePatch::position(120.0, 40.0))
            .unwrap();

        let notes = store.load_notes("book").unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, NoteId::Stored(id.clone()));
        assert_eq!(notes[0].content, "remember this");
        assert_eq!((notes[0].x_pct, notes[0].y_pct), (95.0, 40.0));

        store.delete_note(&id).unwrap();
        assert!(store.load_notes("book").unwrap().is_empty());
    }

    #[test]
    fn test_ids_are_unique_after_delete() {
        let (_temp_dir, mut store) = create_store();
        let first = store.insert_note("book", &new_note(1, "a")).unwrap();
        store.delete_note(&first).unwrap();
        let second = store.insert_note("book", &new_note(1, "b")).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_unknown_note_is_not_found() {
        let (_temp_dir, mut store) = create_store();
        assert!(matches!(
            store.update_note("nope", &NotePatch::content("x")),
            Err(PersistenceError::NotFound { .. })
        ));
        let id = store.insert_note("book", &new_note(1, "a")).unwrap();
        store.delete_note(&id).unwrap();
        assert!(matches!(
            store.delete_note(&id),
            Err(PersistenceError::NotFound { .. })
        ));
    }

    #[test]
    fn test_corrupt_file_is_format_error() {
        let (_temp_dir, mut store) = create_store();
        fs::write(store.book_file("book"), "bookmarks: [not, numbers").unwrap();
        assert!(matches!(
            store.load_bookmarks("book"),
            Err(PersistenceError::Format(_))
        ));
    }

    #[test]
    fn test_reopen_reads_existing_file() {
        let (temp_dir, mut store) = create_store();
        store.insert_bookmark("book", 4).unwrap();
        let id = store.insert_note("book", &new_note(4, "kept")).unwrap();

        let mut reopened = YamlAnnotationStore::new(Some(&temp_dir.path().join("notes"))).unwrap();
        assert_eq!(reopened.load_bookmarks("book").unwrap(), vec![4]);
        assert_eq!(
            reopened.load_notes("book").unwrap()[0].id,
            NoteId::Stored(id)
        );
    }

    #[test]
    #[serial]
    fn test_env_dir_is_used_by_default() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("from-env");
        // SAFETY: serialized with other env-touching tests
        unsafe { std::env::set_var(ANNOTATIONS_DIR_ENV, &dir) };
        let store = YamlAnnotationStore::new(None).unwrap();
        unsafe { std::env::remove_var(ANNOTATIONS_DIR_ENV) };

        assert_eq!(store.dir(), dir.as_path());
        assert!(dir.exists());
    }
}
