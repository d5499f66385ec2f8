//! Pipeline stages for document-to-audio conversion.
//!
//! Each submodule implements exactly one transformation step and depends on
//! one injected capability, so every stage is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ translate ──▶ synthesize
//! (text/OCR)  (chunked)     (chunked, stitched)
//! ```
//!
//! 1. [`extract`]    — turn the source artifact into plain text; optical
//!    sources go through the OCR capability, with bounded polling for
//!    multi-page documents
//! 2. [`translate`]  — chunk below the translation limit and translate
//!    sequentially
//! 3. [`synthesize`] — chunk below the speech limit, synthesise with the
//!    language's voice, and stitch the MP3 segments ([`audio`])
//!
//! [`chunk`] is the shared splitter both chunked stages use.

pub mod audio;
pub mod chunk;
pub mod extract;
pub mod synthesize;
pub mod translate;
