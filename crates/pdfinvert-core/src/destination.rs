//! The document being built
//!
//! Pages are only ever appended. Each page shows one transcluded form at its
//! full rectangle and carries annotations layered above it.

use crate::error::InvertError;
use crate::geometry::PageGeometry;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// Resource name under which a page's transcluded form is registered
const FORM_NAME: &str = "Fm0";

pub struct DestinationDocument {
    doc: Document,
    pages_id: ObjectId,
    page_ids: Vec<ObjectId>,
}

impl Default for DestinationDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl DestinationDocument {
    /// An empty PDF 1.7 document with a catalog and an empty page tree
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Kids", Object::Array(vec![]));
        pages.set("Count", Object::Integer(0));
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        let catalog_id = doc.add_object(Object::Dictionary(catalog));
        doc.trailer.set("Root", Object::Reference(catalog_id));

        Self {
            doc,
            pages_id,
            page_ids: Vec::new(),
        }
    }

    pub fn page_count(&self) -> u32 {
        self.page_ids.len() as u32
    }

    /// Mutable access for building objects (forms, annotations) that pages
    /// will reference.
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Append an empty page sized to the displayed dimensions of `geometry`.
    pub fn append_page(&mut self, geometry: &PageGeometry) -> Result<ObjectId, InvertError> {
        let mut page = Dictionary::new();
        page.set("Type", Object::Name(b"Page".to_vec()));
        page.set("Parent", Object::Reference(self.pages_id));
        page.set("MediaBox", geometry.page_rect().to_object());
        page.set("Resources", Object::Dictionary(Dictionary::new()));
        let page_id = self.doc.add_object(Object::Dictionary(page));

        self.page_ids.push(page_id);
        self.update_page_tree()?;
        Ok(page_id)
    }

    /// Draw the form `form_id` over the whole of `page_id`, placed with the
    /// transform that `geometry` (of the source page) prescribes.
    pub fn show_page(
        &mut self,
        page_id: ObjectId,
        form_id: ObjectId,
        geometry: &PageGeometry,
    ) -> Result<(), InvertError> {
        let matrix = geometry
            .placement_matrix()
            .iter()
            .map(|&v| Object::Real(v as f32))
            .collect();
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new("cm", matrix),
                Operation::new("Do", vec![Object::Name(FORM_NAME.as_bytes().to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let number = self.page_number(page_id)?;
        let encoded = content
            .encode()
            .map_err(|e| InvertError::page(number, e.to_string()))?;
        let content_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), encoded));

        let page = self.page_dict_mut(page_id)?;

        let mut xobjects = Dictionary::new();
        xobjects.set(FORM_NAME, Object::Reference(form_id));
        let mut resources = Dictionary::new();
        resources.set("XObject", Object::Dictionary(xobjects));

        page.set("Resources", Object::Dictionary(resources));
        page.set("Contents", Object::Reference(content_id));
        Ok(())
    }

    pub fn add_annotation(
        &mut self,
        page_id: ObjectId,
        annot_id: ObjectId,
    ) -> Result<(), InvertError> {
        let page_dict = self.page_dict_mut(page_id)?;
        if let Ok(Object::Array(ref mut arr)) = page_dict.get_mut(b"Annots") {
            arr.push(Object::Reference(annot_id));
        } else {
            page_dict.set("Annots", Object::Array(vec![Object::Reference(annot_id)]));
        }
        Ok(())
    }

    /// Serialize the document, optionally compressing its streams first.
    pub fn to_bytes(&mut self, compress: bool) -> Result<Vec<u8>, InvertError> {
        if compress {
            self.doc.compress();
        }
        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| InvertError::Serialization(format!("Failed to save PDF: {}", e)))?;
        Ok(buffer)
    }

    /// 1-based position of `page_id` in this document
    fn page_number(&self, page_id: ObjectId) -> Result<u32, InvertError> {
        self.page_ids
            .iter()
            .position(|&id| id == page_id)
            .map(|index| index as u32 + 1)
            .ok_or_else(|| {
                InvertError::Serialization(format!("{:?} is not a page of this document", page_id))
            })
    }

    fn page_dict_mut(&mut self, page_id: ObjectId) -> Result<&mut Dictionary, InvertError> {
        let number = self.page_number(page_id)?;
        self.doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| InvertError::page(number, format!("destination page: {}", e)))
    }

    fn update_page_tree(&mut self) -> Result<(), InvertError> {
        let kids = self
            .page_ids
            .iter()
            .map(|&id| Object::Reference(id))
            .collect::<Vec<_>>();

        if let Some(Object::Dictionary(ref mut pages_dict)) = self.doc.objects.get_mut(&self.pages_id) {
            pages_dict.set("Kids", Object::Array(kids));
            pages_dict.set("Count", Object::Integer(self.page_ids.len() as i64));
            Ok(())
        } else {
            Err(InvertError::Serialization(
                "Invalid pages dictionary".into(),
            ))
        }
    }
}
