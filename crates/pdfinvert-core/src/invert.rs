//! Page Inverter pipeline
//!
//! For each source page, in order:
//! 1. Read its geometry (visible rectangle and rotation)
//! 2. Append a destination page with the same displayed size
//! 3. Transclude the source page as a Form XObject drawn over the full page
//! 4. Layer an opaque white Difference-blend polygon over everything
//!
//! The result is serialized in memory and only then written to disk. A run
//! that fails at any stage leaves no file at the output path, including one
//! left there by an earlier run.

use crate::destination::DestinationDocument;
use crate::error::InvertError;
use crate::output::{remove_output, OutputFile};
use crate::overlay::Overlay;
use crate::source::{SourceDocument, SourcePage};
use crate::transclude::PageImporter;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InvertOptions {
    /// Compress streams before saving
    pub compress: bool,
}

impl Default for InvertOptions {
    fn default() -> Self {
        Self { compress: true }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvertSummary {
    pub page_count: u32,
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
    pub processing_time_ms: u64,
}

/// Invert `source_bytes` and write the result to `output_path`.
pub fn invert(source_bytes: &[u8], output_path: &Path) -> Result<InvertSummary, InvertError> {
    invert_with_options(source_bytes, output_path, &InvertOptions::default())
}

pub fn invert_with_options(
    source_bytes: &[u8],
    output_path: &Path,
    options: &InvertOptions,
) -> Result<InvertSummary, InvertError> {
    let started = Instant::now();

    let (bytes, page_count) = match build(source_bytes, options) {
        Ok(built) => built,
        Err(e) => {
            remove_output(output_path);
            return Err(e);
        }
    };
    let written = write_output(output_path, &bytes)?;

    tracing::debug!("Wrote {} bytes to {}", bytes.len(), written.display());

    Ok(InvertSummary {
        page_count,
        input_size_bytes: source_bytes.len(),
        output_size_bytes: bytes.len(),
        processing_time_ms: started.elapsed().as_millis() as u64,
    })
}

/// In-memory variant: returns the inverted document's bytes.
pub fn invert_document(source_bytes: &[u8], options: &InvertOptions) -> Result<Vec<u8>, InvertError> {
    build(source_bytes, options).map(|(bytes, _)| bytes)
}

fn build(source_bytes: &[u8], options: &InvertOptions) -> Result<(Vec<u8>, u32), InvertError> {
    let source = SourceDocument::from_bytes(source_bytes)?;
    let mut dest = DestinationDocument::new();
    let mut importer = PageImporter::new(&source);

    let total = source.page_count();
    tracing::info!("Processing {} pages...", total);

    for page in source.pages() {
        invert_page(&mut dest, &mut importer, page)?;
        tracing::info!("Page {}/{} inverted", page.number, total);
    }
    tracing::debug!("Imported {} objects from source", importer.imported_count());

    debug_assert_eq!(dest.page_count(), total);
    let bytes = dest.to_bytes(options.compress)?;
    Ok((bytes, total))
}

fn invert_page(
    dest: &mut DestinationDocument,
    importer: &mut PageImporter<'_>,
    page: &SourcePage,
) -> Result<(), InvertError> {
    let geometry = page.geometry;
    let page_id = dest.append_page(&geometry)?;

    let form_id = importer.form_xobject(dest.document_mut(), page)?;
    dest.show_page(page_id, form_id, &geometry)?;

    let overlay = Overlay::inversion(geometry.width(), geometry.height());
    let annot_id = overlay
        .annotation(dest.document_mut(), page_id)
        .map_err(|e| InvertError::page(page.number, e.to_string()))?;
    dest.add_annotation(page_id, annot_id)
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<std::path::PathBuf, InvertError> {
    let mut output = OutputFile::create(path)?;
    output.write_all(bytes)?;
    output.commit()
}
