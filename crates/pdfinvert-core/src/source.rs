//! Read-only view of the document being inverted

use crate::error::InvertError;
use crate::geometry::{inherited_attribute, PageGeometry};
use lopdf::{Dictionary, Document, Object, ObjectId};

/// A page of the source document
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourcePage {
    /// 1-based position in the page tree
    pub number: u32,
    pub id: ObjectId,
    pub geometry: PageGeometry,
}

/// Source PDF opened from an in-memory byte buffer.
///
/// Pages and their geometry are resolved once at open time; the underlying
/// document is never mutated.
pub struct SourceDocument {
    doc: Document,
    pages: Vec<SourcePage>,
}

impl SourceDocument {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InvertError> {
        let doc =
            Document::load_mem(bytes).map_err(|e| InvertError::DocumentParse(e.to_string()))?;
        doc.catalog()
            .and_then(|catalog| catalog.get(b"Pages"))
            .map_err(|_| InvertError::DocumentParse("document has no page tree".into()))?;

        let mut pages = Vec::new();
        for (number, id) in doc.get_pages() {
            let geometry = PageGeometry::resolve(&doc, id, number)?;
            pages.push(SourcePage {
                number,
                id,
                geometry,
            });
        }

        Ok(Self { doc, pages })
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn pages(&self) -> impl Iterator<Item = &SourcePage> {
        self.pages.iter()
    }

    /// Page by 1-based number
    pub fn page(&self, number: u32) -> Option<&SourcePage> {
        number
            .checked_sub(1)
            .and_then(|index| self.pages.get(index as usize))
    }

    pub(crate) fn inner(&self) -> &Document {
        &self.doc
    }

    /// Decoded content of every content stream of `page`, joined with newlines
    /// so operators at stream boundaries stay separated.
    pub fn content(&self, page: &SourcePage) -> Result<Vec<u8>, InvertError> {
        let dict = self
            .doc
            .get_dictionary(page.id)
            .map_err(|e| InvertError::page(page.number, e.to_string()))?;

        // /Contents may itself be a reference to an array of streams.
        let contents = match dict.get(b"Contents") {
            Ok(Object::Reference(id)) => match self.doc.get_object(*id) {
                Ok(resolved) => Some(resolved),
                Err(_) => {
                    tracing::warn!("Page {} references missing contents {:?}", page.number, id);
                    None
                }
            },
            Ok(direct) => Some(direct),
            Err(_) => None,
        };
        let streams: Vec<&Object> = match contents {
            Some(Object::Array(items)) => items.iter().collect(),
            Some(other) => vec![other],
            None => Vec::new(),
        };

        let mut content = Vec::new();
        for item in streams {
            let object = match item {
                Object::Reference(id) => match self.doc.get_object(*id) {
                    Ok(object) => object,
                    Err(_) => {
                        tracing::warn!(
                            "Page {} references missing content stream {:?}",
                            page.number,
                            id
                        );
                        continue;
                    }
                },
                other => other,
            };
            let stream = object.as_stream().map_err(|_| {
                InvertError::page(page.number, "Contents entry is not a stream")
            })?;
            let data = if stream.dict.has(b"Filter") {
                stream.decompressed_content().map_err(|e| {
                    InvertError::page(page.number, format!("cannot decode content stream: {}", e))
                })?
            } else {
                stream.content.clone()
            };
            if !content.is_empty() {
                content.push(b'\n');
            }
            content.extend_from_slice(&data);
        }
        Ok(content)
    }

    /// Effective `/Resources` of `page`, including ones inherited from the
    /// page tree.
    pub fn resources(&self, page: &SourcePage) -> Option<&Dictionary> {
        inherited_attribute(&self.doc, page.id, b"Resources").and_then(|obj| obj.as_dict().ok())
    }
}
