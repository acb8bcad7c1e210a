//! Pipeline stages for document conversion and field extraction.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the orchestration in [`crate::process`] stays linear.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ extract
//! (path/URL) (pdfium/   (JPEG,    (VLM tool call)
//!             image)     base64)
//! ```
//!
//! 1. [`input`]: read a local file or download a URL into memory
//! 2. [`render`]: one image per selected PDF page, or the single decoded
//!    image; PDF work runs in `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]: JPEG-encode each image and base64-wrap it for the request
//! 4. [`extract`]: the VLM call with timeout and retry; the only stage with
//!    network I/O

pub mod encode;
pub mod extract;
pub mod input;
pub mod render;
