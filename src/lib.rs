pub mod annotations;
pub mod document;
pub mod error;
pub mod event_source;
pub mod jump_list;
pub mod notification;
pub mod panic_handler;
#[cfg(feature = "pdf")]
pub mod pdf;
pub mod session;
pub mod settings;
pub mod store;
pub mod sync;
pub mod viewport;
pub mod visibility;
pub mod window;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use document::{Document, DocumentSource, FixedGeometrySource, PageSize, load_document};
pub use error::{DecodeError, GeometryError, PersistenceError, ReaderError, RenderError};
pub use session::{ReaderSession, SessionSnapshot};
pub use store::YamlAnnotationStore;
pub use sync::{AnnotationStore, SyncQueue};
pub use viewport::{Command, Effect, Viewport, ViewportConfig, ViewportState};
