//! Adapters between the question loop and the outside world.
//!
//! ```text
//! input ──▶ render ──▶ encode        (page store side)
//! prompts ──▶ llm ──▶ parse          (reasoning side)
//! ```
//!
//! 1. [`input`]   canonicalise a path, URL or byte buffer to a local PDF
//! 2. [`render`]  pdfium text extraction and page rasterisation, run in
//!    `spawn_blocking`
//! 3. [`encode`]  PNG-encode and base64-wrap rendered pages
//! 4. [`llm`]     the `edgequake-llm` reasoning backend with retry/backoff
//! 5. [`parse`]   tolerant parsing of page lists, summaries and citations

pub mod encode;
pub mod input;
pub mod llm;
pub mod parse;
pub mod render;
