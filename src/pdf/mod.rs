//! MuPDF-backed document source
//!
//! Compiled with the `pdf` feature.

mod mupdf_source;

pub use mupdf_source::MupdfSource;
