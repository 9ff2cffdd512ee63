//! Conversion strategies and the pieces they share.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ classify ──▶ strategy ──────────────▶ output_dir/{millis}-{base}.pdf
//!  (path)  (extension)   image | text | office | passthrough
//! ```
//!
//! 1. [`classify`] maps the extension to an [`classify::InputKind`] and its
//!    one [`classify::Strategy`].
//! 2. [`image`] embeds PNG/JPEG on a page of the image's size.
//! 3. [`text`] lays plain text out on A4 pages.
//! 4. [`office`] delegates to an external converter (LibreOffice by default).
//! 5. [`passthrough`] copies PDFs unchanged.
//!
//! [`pdf`] holds the page-tree assembly used by the image and text
//! strategies. Every strategy writes through [`crate::store`], so an output
//! path either holds a complete PDF or does not exist.

pub mod classify;
pub mod image;
pub mod office;
pub mod passthrough;
pub mod pdf;
pub mod text;
