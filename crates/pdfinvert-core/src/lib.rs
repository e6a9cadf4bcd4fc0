//! PDF color inversion
//!
//! This crate inverts the colors of every page of a PDF without rasterizing
//! it, using lopdf. Each page is transcluded into a new document as a Form
//! XObject and covered by an opaque white polygon annotation blended with
//! `Difference`, so every channel `c` renders as `1 - c` while text and
//! vector art stay sharp.
//!
//! - [`invert`] / [`invert_with_options`]: bytes in, file out, all or nothing
//! - [`invert_document`]: bytes in, bytes out

pub mod destination;
pub mod error;
pub mod geometry;
pub mod input;
pub mod invert;
pub mod output;
pub mod overlay;
pub mod source;
pub mod transclude;

pub use destination::DestinationDocument;
pub use error::InvertError;
pub use geometry::{PageGeometry, PdfRect};
pub use input::{default_inverted_path, InputFile};
pub use invert::{invert, invert_document, invert_with_options, InvertOptions, InvertSummary};
pub use output::OutputFile;
pub use overlay::{BlendMode, Overlay, Rgb};
pub use source::{SourceDocument, SourcePage};
pub use transclude::PageImporter;
