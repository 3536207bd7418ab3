//! Pipeline stages for HTML-snapshot-to-PDF conversion.
//!
//! Each submodule implements exactly one step. The stages are plain async
//! functions over injected dependencies; memoisation and the per-item error
//! policy live one level up in [`crate::sync`].
//!
//! ## Data Flow
//!
//! ```text
//! discover ──▶ render ──▶ upload
//! (listing)    (chrome)   (Web API)
//! ```
//!
//! 1. [`discover`] — keep `text/html` attachments and resolve the link their
//!    content is downloaded from
//! 2. [`render`]   — download the snapshot, normalise it, print it to PDF
//! 3. [`upload`]   — attach the PDF to the parent item

pub mod discover;
pub mod render;
pub mod upload;
