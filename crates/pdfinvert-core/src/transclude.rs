//! Page transclusion
//!
//! Wraps a source page as a Form XObject inside the destination document.
//! Every object the page's resources reach (fonts, images, nested forms,
//! color spaces) is copied at the object level under a fresh id, so the
//! embedded content stays vector and resolution independent.
//!
//! Visible annotations are part of what a page renders, so their normal
//! appearance streams are flattened into the form above the page content.
//! Without this an overlay added by an earlier inversion would be dropped
//! and inverting twice would not give the original back.

use crate::error::InvertError;
use crate::geometry::{appearance_matrix, as_number, PdfRect};
use crate::source::{SourceDocument, SourcePage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;

const ANNOT_FLAG_HIDDEN: i64 = 1 << 1;
const ANNOT_FLAG_NO_VIEW: i64 = 1 << 5;

const IDENTITY: [f64; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// An annotation appearance already imported into the destination
struct Appearance {
    form: Object,
    matrix: [f64; 6],
}

/// Copies pages of one source document into one destination document.
///
/// The id table is kept across pages so resources shared between pages are
/// imported once.
pub struct PageImporter<'a> {
    source: &'a SourceDocument,
    imported: BTreeMap<ObjectId, ObjectId>,
}

impl<'a> PageImporter<'a> {
    pub fn new(source: &'a SourceDocument) -> Self {
        Self {
            source,
            imported: BTreeMap::new(),
        }
    }

    /// Number of source objects copied so far
    pub fn imported_count(&self) -> usize {
        self.imported.len()
    }

    /// Build a Form XObject in `dest` that renders `page` exactly as its
    /// visible rectangle shows it, and return the form's id.
    pub fn form_xobject(
        &mut self,
        dest: &mut Document,
        page: &SourcePage,
    ) -> Result<ObjectId, InvertError> {
        let source = self.source;
        let content = source.content(page)?;
        let resources = match source.resources(page) {
            Some(resources) => Some(self.import(dest, &Object::Dictionary(resources.clone()))),
            None => None,
        };
        let content_form = dest.add_object(form_stream(&page.geometry.rect, resources, content));

        let appearances = self.appearances(dest, page);
        if appearances.is_empty() {
            return Ok(content_form);
        }

        // Page content first, then each appearance in /Annots order.
        let mut xobjects = Dictionary::new();
        xobjects.set("Content", Object::Reference(content_form));
        let mut operations = vec![
            Operation::new("q", vec![]),
            Operation::new("Do", vec![Object::Name(b"Content".to_vec())]),
            Operation::new("Q", vec![]),
        ];
        for (index, appearance) in appearances.into_iter().enumerate() {
            let name = format!("Annot{}", index);
            xobjects.set(name.as_bytes().to_vec(), appearance.form);
            operations.extend([
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    appearance
                        .matrix
                        .iter()
                        .map(|&v| Object::Real(v as f32))
                        .collect(),
                ),
                Operation::new("Do", vec![Object::Name(name.into_bytes())]),
                Operation::new("Q", vec![]),
            ]);
        }
        let content = Content { operations }
            .encode()
            .map_err(|e| InvertError::page(page.number, e.to_string()))?;

        let mut resources = Dictionary::new();
        resources.set("XObject", Object::Dictionary(xobjects));
        Ok(dest.add_object(form_stream(
            &page.geometry.rect,
            Some(Object::Dictionary(resources)),
            content,
        )))
    }

    /// Import the normal appearance of every visible annotation on `page`.
    /// Annotations without a usable appearance are skipped.
    fn appearances(&mut self, dest: &mut Document, page: &SourcePage) -> Vec<Appearance> {
        let source = self.source;
        let doc = source.inner();
        let annots = match doc
            .get_dictionary(page.id)
            .ok()
            .and_then(|dict| dict.get(b"Annots").ok())
            .and_then(|annots| deref(doc, annots))
            .and_then(|annots| annots.as_array().ok())
        {
            Some(annots) => annots,
            None => return Vec::new(),
        };

        let mut found = Vec::new();
        for annot in annots {
            let Some(annot) = deref(doc, annot).and_then(|a| a.as_dict().ok()) else {
                continue;
            };
            let flags = annot.get(b"F").ok().and_then(as_number).unwrap_or(0.0) as i64;
            if flags & (ANNOT_FLAG_HIDDEN | ANNOT_FLAG_NO_VIEW) != 0 {
                continue;
            }
            let Some((stream_object, stream)) = normal_appearance(doc, annot) else {
                continue;
            };
            let rect = annot
                .get(b"Rect")
                .ok()
                .and_then(|r| deref(doc, r))
                .and_then(|r| r.as_array().ok())
                .and_then(|r| PdfRect::from_array(r));
            let bbox = stream
                .dict
                .get(b"BBox")
                .ok()
                .and_then(|b| b.as_array().ok())
                .and_then(|b| PdfRect::from_array(b));
            let form_matrix = stream
                .dict
                .get(b"Matrix")
                .ok()
                .and_then(|m| m.as_array().ok())
                .and_then(|m| to_matrix(m))
                .unwrap_or(IDENTITY);
            let Some(matrix) = rect
                .zip(bbox)
                .and_then(|(rect, bbox)| appearance_matrix(&bbox, &form_matrix, &rect))
            else {
                tracing::warn!("Page {}: skipping annotation with degenerate appearance", page.number);
                continue;
            };

            let form = match self.import(dest, stream_object) {
                Object::Stream(inline) => Object::Reference(dest.add_object(inline)),
                reference => reference,
            };
            found.push(Appearance { form, matrix });
        }
        found
    }

    /// Copy `object` and everything it references into `dest`, returning the
    /// object rewritten to point at the destination ids.
    pub fn import(&mut self, dest: &mut Document, object: &Object) -> Object {
        let source = self.source;
        let mut pending = Vec::new();
        let root = self.remap(dest, object, &mut pending);

        while let Some(source_id) = pending.pop() {
            let copy = match source.inner().get_object(source_id) {
                Ok(found) => self.remap(dest, found, &mut pending),
                Err(_) => {
                    tracing::warn!("Dangling reference {:?} imported as null", source_id);
                    Object::Null
                }
            };
            let dest_id = self.imported[&source_id];
            dest.objects.insert(dest_id, copy);
        }

        root
    }

    /// Rewrite references inside a direct object. Referenced objects not yet
    /// seen are assigned a destination id and queued for copying.
    fn remap(
        &mut self,
        dest: &mut Document,
        object: &Object,
        pending: &mut Vec<ObjectId>,
    ) -> Object {
        match object {
            Object::Reference(id) => {
                let dest_id = match self.imported.get(id) {
                    Some(existing) => *existing,
                    None => {
                        let fresh = dest.new_object_id();
                        self.imported.insert(*id, fresh);
                        pending.push(*id);
                        fresh
                    }
                };
                Object::Reference(dest_id)
            }
            Object::Array(items) => Object::Array(
                items
                    .iter()
                    .map(|item| self.remap(dest, item, pending))
                    .collect(),
            ),
            Object::Dictionary(dict) => Object::Dictionary(self.remap_dict(dest, dict, pending)),
            Object::Stream(stream) => {
                let dict = self.remap_dict(dest, &stream.dict, pending);
                let mut copy = Stream::new(dict, stream.content.clone());
                copy.allows_compression = stream.allows_compression;
                Object::Stream(copy)
            }
            other => other.clone(),
        }
    }

    fn remap_dict(
        &mut self,
        dest: &mut Document,
        dict: &Dictionary,
        pending: &mut Vec<ObjectId>,
    ) -> Dictionary {
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            // Back links into the source page tree would drag every page along.
            if key.as_slice() == b"Parent" {
                continue;
            }
            copy.set(key.clone(), self.remap(dest, value, pending));
        }
        copy
    }
}

fn form_stream(bbox: &PdfRect, resources: Option<Object>, content: Vec<u8>) -> Stream {
    let mut form = Dictionary::new();
    form.set("Type", Object::Name(b"XObject".to_vec()));
    form.set("Subtype", Object::Name(b"Form".to_vec()));
    form.set("FormType", Object::Integer(1));
    form.set("BBox", bbox.to_object());
    if let Some(resources) = resources {
        form.set("Resources", resources);
    }
    Stream::new(form, content)
}

fn deref<'d>(doc: &'d Document, object: &'d Object) -> Option<&'d Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// The `/AP /N` stream of an annotation, picking the `/AS` state when the
/// normal appearance is a state dictionary. Returns the object as it should
/// be imported (a reference, or the stream itself when inline) together with
/// the resolved stream.
fn normal_appearance<'d>(doc: &'d Document, annot: &'d Dictionary) -> Option<(&'d Object, &'d Stream)> {
    let ap = annot.get(b"AP").ok().and_then(|ap| deref(doc, ap))?.as_dict().ok()?;
    let normal = ap.get(b"N").ok()?;
    match deref(doc, normal)? {
        Object::Stream(stream) => Some((normal, stream)),
        Object::Dictionary(states) => {
            let state = annot.get(b"AS").ok()?.as_name().ok()?;
            let chosen = states.get(state).ok()?;
            match deref(doc, chosen)? {
                Object::Stream(stream) => Some((chosen, stream)),
                _ => None,
            }
        }
        _ => None,
    }
}

fn to_matrix(values: &[Object]) -> Option<[f64; 6]> {
    if values.len() != 6 {
        return None;
    }
    let mut m = [0.0; 6];
    for (slot, value) in m.iter_mut().zip(values) {
        *slot = as_number(value)?;
    }
    Some(m)
}
