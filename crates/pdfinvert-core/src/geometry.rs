//! Page geometry
//!
//! Resolves the visible rectangle and rotation of a source page and derives
//! the transform that places its content on a fresh, unrotated page.

use crate::error::InvertError;
use lopdf::{Document, Object, ObjectId};

/// Parent chains deeper than this are treated as malformed.
const MAX_INHERITANCE_DEPTH: usize = 64;

/// Rectangle in PDF user space, stored as origin plus size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PdfRect {
    /// US Letter at 72 DPI, used when a page carries no MediaBox at all.
    pub const LETTER: PdfRect = PdfRect {
        x: 0.0,
        y: 0.0,
        width: 612.0,
        height: 792.0,
    };

    /// Build a rectangle from two opposite corners given in any order.
    pub fn from_corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x: x0.min(x1),
            y: y0.min(y1),
            width: (x1 - x0).abs(),
            height: (y1 - y0).abs(),
        }
    }

    /// Parse a PDF rectangle array `[llx lly urx ury]`.
    pub fn from_array(values: &[Object]) -> Option<Self> {
        if values.len() != 4 {
            return None;
        }
        let mut n = [0.0; 4];
        for (slot, value) in n.iter_mut().zip(values) {
            *slot = as_number(value)?;
        }
        Some(Self::from_corners(n[0], n[1], n[2], n[3]))
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Overlap of two rectangles, `None` when they do not share any area.
    pub fn intersect(&self, other: &PdfRect) -> Option<PdfRect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.top().min(other.top());
        let rect = PdfRect::from_corners(x0, y0, x1, y1);
        if x1 <= x0 || y1 <= y0 {
            None
        } else {
            Some(rect)
        }
    }

    pub fn to_object(&self) -> Object {
        Object::Array(vec![
            Object::Real(self.x as f32),
            Object::Real(self.y as f32),
            Object::Real(self.right() as f32),
            Object::Real(self.top() as f32),
        ])
    }
}

/// Visible rectangle and display rotation of a page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// CropBox clipped to the MediaBox, in the source page's user space
    pub rect: PdfRect,
    /// Clockwise display rotation, one of 0, 90, 180, 270
    pub rotation: u16,
}

impl PageGeometry {
    pub fn new(rect: PdfRect, rotation: i64) -> Self {
        Self {
            rect,
            rotation: normalize_rotation(rotation),
        }
    }

    /// Resolve the geometry of `page_id`, honoring inherited attributes.
    ///
    /// `number` is the 1-based page number used in error messages.
    pub fn resolve(doc: &Document, page_id: ObjectId, number: u32) -> Result<Self, InvertError> {
        let media = match inherited_attribute(doc, page_id, b"MediaBox") {
            Some(obj) => parse_box(doc, obj)
                .filter(|rect| !rect.is_empty())
                .ok_or_else(|| InvertError::page(number, "malformed MediaBox"))?,
            None => {
                tracing::warn!("Page {} has no MediaBox, assuming US Letter", number);
                PdfRect::LETTER
            }
        };

        let rect = match inherited_attribute(doc, page_id, b"CropBox") {
            Some(obj) => match parse_box(doc, obj) {
                Some(crop) => crop.intersect(&media).unwrap_or(media),
                None => {
                    tracing::warn!("Page {} has a malformed CropBox, using MediaBox", number);
                    media
                }
            },
            None => media,
        };

        let rotation = match inherited_attribute(doc, page_id, b"Rotate") {
            Some(obj) => as_number(obj).map(|r| r as i64).unwrap_or(0),
            None => 0,
        };
        if rotation % 90 != 0 {
            tracing::warn!(
                "Page {} has rotation {} which is not a multiple of 90, ignoring",
                number,
                rotation
            );
        }

        Ok(Self::new(rect, rotation))
    }

    fn is_sideways(&self) -> bool {
        self.rotation == 90 || self.rotation == 270
    }

    /// Displayed width, after rotation
    pub fn width(&self) -> f64 {
        if self.is_sideways() {
            self.rect.height
        } else {
            self.rect.width
        }
    }

    /// Displayed height, after rotation
    pub fn height(&self) -> f64 {
        if self.is_sideways() {
            self.rect.width
        } else {
            self.rect.height
        }
    }

    /// The destination page rectangle `[0 0 width height]`.
    pub fn page_rect(&self) -> PdfRect {
        PdfRect {
            x: 0.0,
            y: 0.0,
            width: self.width(),
            height: self.height(),
        }
    }

    /// `cm` operands mapping the visible rectangle onto `page_rect()` as it
    /// appears on screen.
    pub fn placement_matrix(&self) -> [f64; 6] {
        let PdfRect {
            x,
            y,
            width: w,
            height: h,
        } = self.rect;
        match self.rotation {
            90 => [0.0, -1.0, 1.0, 0.0, -y, x + w],
            180 => [-1.0, 0.0, 0.0, -1.0, x + w, y + h],
            270 => [0.0, 1.0, -1.0, 0.0, y + h, -x],
            _ => [1.0, 0.0, 0.0, 1.0, -x, -y],
        }
    }
}

/// Apply a PDF transformation matrix to a point.
pub fn transform_point(m: &[f64; 6], x: f64, y: f64) -> (f64, f64) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

/// Matrix that places an annotation appearance form on the page.
///
/// The form's `bbox` is transformed by its own `matrix`; the result is then
/// scaled and translated onto the annotation's `rect`. `None` when the
/// transformed box has no area.
pub fn appearance_matrix(bbox: &PdfRect, matrix: &[f64; 6], rect: &PdfRect) -> Option<[f64; 6]> {
    let corners = [
        transform_point(matrix, bbox.x, bbox.y),
        transform_point(matrix, bbox.right(), bbox.y),
        transform_point(matrix, bbox.right(), bbox.top()),
        transform_point(matrix, bbox.x, bbox.top()),
    ];
    let x0 = corners.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let x1 = corners.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    let y0 = corners.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let y1 = corners.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
    if x1 - x0 <= f64::EPSILON || y1 - y0 <= f64::EPSILON {
        return None;
    }
    let sx = rect.width / (x1 - x0);
    let sy = rect.height / (y1 - y0);
    Some([sx, 0.0, 0.0, sy, rect.x - x0 * sx, rect.y - y0 * sy])
}

fn normalize_rotation(degrees: i64) -> u16 {
    match degrees.rem_euclid(360) {
        90 => 90,
        180 => 180,
        270 => 270,
        _ => 0,
    }
}

pub(crate) fn as_number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn parse_box(doc: &Document, obj: &Object) -> Option<PdfRect> {
    let values = obj.as_array().ok()?;
    let resolved: Vec<Object> = values
        .iter()
        .map(|value| match value {
            Object::Reference(id) => doc.get_object(*id).cloned().unwrap_or(Object::Null),
            other => other.clone(),
        })
        .collect();
    PdfRect::from_array(&resolved)
}

/// Look up `key` on a page, walking `/Parent` links for inheritable
/// attributes. Indirect values are dereferenced.
pub(crate) fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(value) = node.get(key) {
            return match value {
                Object::Reference(id) => doc.get_object(*id).ok(),
                other => Some(other),
            };
        }
        let parent_id = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent_id).ok()?;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn apply(m: [f64; 6], x: f64, y: f64) -> (f64, f64) {
        transform_point(&m, x, y)
    }

    fn corners(rect: &PdfRect) -> [(f64, f64); 4] {
        [
            (rect.x, rect.y),
            (rect.right(), rect.y),
            (rect.right(), rect.top()),
            (rect.x, rect.top()),
        ]
    }

    #[test]
    fn test_from_array_normalizes_corner_order() {
        let rect = PdfRect::from_array(&[
            Object::Integer(612),
            Object::Real(792.0),
            Object::Integer(0),
            Object::Integer(0),
        ])
        .unwrap();
        assert_eq!(rect, PdfRect::LETTER);
    }

    #[test]
    fn test_from_array_rejects_wrong_length_and_non_numbers() {
        assert!(PdfRect::from_array(&[Object::Integer(0), Object::Integer(0)]).is_none());
        assert!(PdfRect::from_array(&[
            Object::Integer(0),
            Object::Integer(0),
            Object::Name(b"Letter".to_vec()),
            Object::Integer(10),
        ])
        .is_none());
    }

    #[test]
    fn test_intersect_disjoint_is_none() {
        let a = PdfRect::from_corners(0.0, 0.0, 10.0, 10.0);
        let b = PdfRect::from_corners(20.0, 20.0, 30.0, 30.0);
        assert!(a.intersect(&b).is_none());
        assert_eq!(
            a.intersect(&PdfRect::from_corners(5.0, -5.0, 15.0, 5.0)),
            Some(PdfRect::from_corners(5.0, 0.0, 10.0, 5.0))
        );
    }

    #[test]
    fn test_rotation_normalization() {
        assert_eq!(PageGeometry::new(PdfRect::LETTER, -90).rotation, 270);
        assert_eq!(PageGeometry::new(PdfRect::LETTER, 450).rotation, 90);
        assert_eq!(PageGeometry::new(PdfRect::LETTER, 45).rotation, 0);
    }

    #[test]
    fn test_sideways_pages_swap_dimensions() {
        let geometry = PageGeometry::new(PdfRect::LETTER, 90);
        assert_eq!(geometry.width(), 792.0);
        assert_eq!(geometry.height(), 612.0);
    }

    #[test]
    fn test_resolve_inherits_from_parent_and_clips_crop_box() {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "CropBox" => vec![(-10).into(), 100.into(), 300.into(), 900.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Rotate" => 180,
            }),
        );

        let geometry = PageGeometry::resolve(&doc, page_id, 1).unwrap();
        assert_eq!(geometry.rect, PdfRect::from_corners(0.0, 100.0, 300.0, 792.0));
        assert_eq!(geometry.rotation, 180);
    }

    #[test]
    fn test_resolve_malformed_media_box_is_page_error() {
        let mut doc = Document::with_version("1.7");
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0.into(), 0.into(), 0.into(), 792.into()],
        });
        let err = PageGeometry::resolve(&doc, page_id, 3).unwrap_err();
        assert!(matches!(err, InvertError::PageProcessing { page: 3, .. }));
    }

    #[test]
    fn test_resolve_missing_media_box_defaults_to_letter() {
        let mut doc = Document::with_version("1.7");
        let page_id = doc.add_object(dictionary! { "Type" => "Page" });
        let geometry = PageGeometry::resolve(&doc, page_id, 1).unwrap();
        assert_eq!(geometry.rect, PdfRect::LETTER);
    }

    #[test]
    fn test_appearance_matrix_fits_bbox_to_rect() {
        let bbox = PdfRect::from_corners(0.0, 0.0, 50.0, 20.0);
        let rect = PdfRect::from_corners(100.0, 200.0, 200.0, 240.0);
        let identity = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];
        let m = appearance_matrix(&bbox, &identity, &rect).unwrap();
        assert_eq!(apply(m, 0.0, 0.0), (100.0, 200.0));
        assert_eq!(apply(m, 50.0, 20.0), (200.0, 240.0));
    }

    #[test]
    fn test_appearance_matrix_accounts_for_form_matrix() {
        // Form rotated 90 degrees: its 50x20 box occupies 20x50 after /Matrix.
        let bbox = PdfRect::from_corners(0.0, 0.0, 50.0, 20.0);
        let rotate = [0.0, 1.0, -1.0, 0.0, 0.0, 0.0];
        let rect = PdfRect::from_corners(0.0, 0.0, 20.0, 50.0);
        let m = appearance_matrix(&bbox, &rotate, &rect).unwrap();
        assert_eq!(m, [1.0, 0.0, 0.0, 1.0, 20.0, 0.0]);
    }

    #[test]
    fn test_appearance_matrix_rejects_empty_bbox() {
        let bbox = PdfRect::from_corners(0.0, 0.0, 0.0, 20.0);
        let identity = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];
        assert!(appearance_matrix(&bbox, &identity, &PdfRect::LETTER).is_none());
    }

    proptest! {
        #[test]
        fn placement_maps_visible_rect_onto_page_rect(
            x in -500.0f64..500.0,
            y in -500.0f64..500.0,
            w in 1.0f64..2000.0,
            h in 1.0f64..2000.0,
            quarter in 0i64..4,
        ) {
            let geometry = PageGeometry::new(PdfRect { x, y, width: w, height: h }, quarter * 90);
            let m = geometry.placement_matrix();
            let mapped: Vec<(f64, f64)> = corners(&geometry.rect)
                .iter()
                .map(|&(cx, cy)| apply(m, cx, cy))
                .collect();
            let min_x = mapped.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
            let max_x = mapped.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
            let min_y = mapped.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
            let max_y = mapped.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(min_x.abs() < 1e-6 && min_y.abs() < 1e-6);
            prop_assert!((max_x - geometry.width()).abs() < 1e-6);
            prop_assert!((max_y - geometry.height()).abs() < 1e-6);
        }

        #[test]
        fn clockwise_rotation_moves_top_left_corner(quarter in 0i64..4) {
            let rect = PdfRect { x: 10.0, y: 20.0, width: 100.0, height: 200.0 };
            let geometry = PageGeometry::new(rect, quarter * 90);
            let (tx, ty) = apply(geometry.placement_matrix(), rect.x, rect.top());
            let expected = match quarter {
                0 => (0.0, geometry.height()),
                1 => (geometry.width(), geometry.height()),
                2 => (geometry.width(), 0.0),
                _ => (0.0, 0.0),
            };
            prop_assert!((tx - expected.0).abs() < 1e-9);
            prop_assert!((ty - expected.1).abs() < 1e-9);
        }
    }
}
