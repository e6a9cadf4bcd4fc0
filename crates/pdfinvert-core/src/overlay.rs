//! Overlay shapes
//!
//! A full-page polygon annotation painted above the transcluded content.
//! With a white fill and the Difference blend mode it turns every channel
//! `c` underneath into `|c - 1| = 1 - c`, i.e. an exact inversion that
//! needs no rasterization.

use crate::error::InvertError;
use crate::geometry::PdfRect;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// Annotation flag bit 3: print the annotation with the page.
const ANNOT_FLAG_PRINT: i64 = 4;

/// Resource name of the graphics state inside the appearance stream
const GSTATE_NAME: &str = "GS0";

/// Color with channels normalized to `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub const BLACK: Rgb = Rgb {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
        }
    }

    pub fn to_rgb8(self) -> (u8, u8, u8) {
        let quantize = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        (quantize(self.r), quantize(self.g), quantize(self.b))
    }

    fn operands(self) -> Vec<Object> {
        vec![
            Object::Real(self.r),
            Object::Real(self.g),
            Object::Real(self.b),
        ]
    }
}

/// Separable blend modes used by overlays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Normal,
    Difference,
}

impl BlendMode {
    pub fn pdf_name(self) -> &'static [u8] {
        match self {
            BlendMode::Normal => b"Normal",
            BlendMode::Difference => b"Difference",
        }
    }

    /// Blend one channel of `source` (the overlay) onto `backdrop`.
    pub fn blend_channel(self, backdrop: f32, source: f32) -> f32 {
        match self {
            BlendMode::Normal => source,
            BlendMode::Difference => (backdrop - source).abs(),
        }
    }

    /// Composite an overlay color with `opacity` over `backdrop`.
    pub fn composite(self, backdrop: Rgb, source: Rgb, opacity: f32) -> Rgb {
        let mix = |cb: f32, cs: f32| {
            (1.0 - opacity) * cb + opacity * self.blend_channel(cb, cs)
        };
        Rgb {
            r: mix(backdrop.r, source.r),
            g: mix(backdrop.g, source.g),
            b: mix(backdrop.b, source.b),
        }
    }
}

/// A filled polygon painted above page content
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    /// Polygon vertices in destination page space
    pub vertices: Vec<(f64, f64)>,
    pub fill: Rgb,
    pub blend_mode: BlendMode,
    pub opacity: f32,
    pub border_width: f32,
}

impl Overlay {
    /// The inversion overlay for a `width` x `height` page: corners in
    /// top-left, top-right, bottom-right, bottom-left order, opaque white,
    /// Difference blending, no border.
    pub fn inversion(width: f64, height: f64) -> Self {
        Self {
            vertices: vec![(0.0, height), (width, height), (width, 0.0), (0.0, 0.0)],
            fill: Rgb::WHITE,
            blend_mode: BlendMode::Difference,
            opacity: 1.0,
            border_width: 0.0,
        }
    }

    /// Bounding rectangle of the vertices
    pub fn bounds(&self) -> PdfRect {
        let xs = self.vertices.iter().map(|v| v.0);
        let ys = self.vertices.iter().map(|v| v.1);
        let x0 = xs.clone().fold(f64::INFINITY, f64::min);
        let x1 = xs.fold(f64::NEG_INFINITY, f64::max);
        let y0 = ys.clone().fold(f64::INFINITY, f64::min);
        let y1 = ys.fold(f64::NEG_INFINITY, f64::max);
        PdfRect::from_corners(x0, y0, x1, y1)
    }

    /// Commit the overlay as a Polygon annotation of `page_id`, including the
    /// appearance stream viewers render. Returns the annotation's id; the
    /// caller attaches it to the page's `/Annots`.
    pub fn annotation(&self, doc: &mut Document, page_id: ObjectId) -> Result<ObjectId, InvertError> {
        if self.vertices.len() < 3 {
            return Err(InvertError::Serialization(format!(
                "overlay polygon needs at least 3 vertices, got {}",
                self.vertices.len()
            )));
        }

        let bounds = self.bounds();
        let appearance_id = doc.add_object(self.appearance_stream(&bounds)?);

        let mut ap = Dictionary::new();
        ap.set("N", Object::Reference(appearance_id));

        let mut bs = Dictionary::new();
        bs.set("W", Object::Real(self.border_width));

        let vertices = self
            .vertices
            .iter()
            .flat_map(|&(x, y)| [Object::Real(x as f32), Object::Real(y as f32)])
            .collect();

        let mut annot = Dictionary::new();
        annot.set("Type", Object::Name(b"Annot".to_vec()));
        annot.set("Subtype", Object::Name(b"Polygon".to_vec()));
        annot.set("Rect", bounds.to_object());
        annot.set("Vertices", Object::Array(vertices));
        annot.set("IC", Object::Array(self.fill.operands()));
        annot.set("BS", Object::Dictionary(bs));
        annot.set("CA", Object::Real(self.opacity));
        annot.set("BM", Object::Name(self.blend_mode.pdf_name().to_vec()));
        annot.set("F", Object::Integer(ANNOT_FLAG_PRINT));
        annot.set("P", Object::Reference(page_id));
        annot.set("AP", Object::Dictionary(ap));

        Ok(doc.add_object(Object::Dictionary(annot)))
    }

    fn appearance_stream(&self, bounds: &PdfRect) -> Result<Stream, InvertError> {
        let mut gstate = Dictionary::new();
        gstate.set("Type", Object::Name(b"ExtGState".to_vec()));
        gstate.set("BM", Object::Name(self.blend_mode.pdf_name().to_vec()));
        gstate.set("CA", Object::Real(self.opacity));
        gstate.set("ca", Object::Real(self.opacity));

        let mut states = Dictionary::new();
        states.set(GSTATE_NAME, Object::Dictionary(gstate));
        let mut resources = Dictionary::new();
        resources.set("ExtGState", Object::Dictionary(states));

        let mut operations = vec![
            Operation::new("q", vec![]),
            Operation::new("gs", vec![Object::Name(GSTATE_NAME.as_bytes().to_vec())]),
            Operation::new("rg", self.fill.operands()),
        ];
        for (index, &(x, y)) in self.vertices.iter().enumerate() {
            let op = if index == 0 { "m" } else { "l" };
            operations.push(Operation::new(
                op,
                vec![Object::Real(x as f32), Object::Real(y as f32)],
            ));
        }
        operations.push(Operation::new("h", vec![]));
        operations.push(Operation::new("f", vec![]));
        operations.push(Operation::new("Q", vec![]));

        let content = Content { operations }
            .encode()
            .map_err(|e| InvertError::Serialization(e.to_string()))?;

        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Form".to_vec()));
        dict.set("FormType", Object::Integer(1));
        dict.set("BBox", bounds.to_object());
        dict.set("Resources", Object::Dictionary(resources));

        Ok(Stream::new(dict, content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn annotation_dict(doc: &Document, id: ObjectId) -> &Dictionary {
        doc.get_object(id).unwrap().as_dict().unwrap()
    }

    fn real(obj: &Object) -> f32 {
        match obj {
            Object::Real(v) => *v,
            Object::Integer(v) => *v as f32,
            other => panic!("not a number: {:?}", other),
        }
    }

    #[test]
    fn test_inversion_overlay_properties() {
        let overlay = Overlay::inversion(612.0, 792.0);
        assert_eq!(
            overlay.vertices,
            vec![(0.0, 792.0), (612.0, 792.0), (612.0, 0.0), (0.0, 0.0)]
        );
        assert_eq!(overlay.fill, Rgb::WHITE);
        assert_eq!(overlay.blend_mode, BlendMode::Difference);
        assert_eq!(overlay.opacity, 1.0);
        assert_eq!(overlay.border_width, 0.0);
        assert_eq!(overlay.bounds(), PdfRect::LETTER);
    }

    #[test]
    fn test_annotation_dictionary() {
        let mut doc = Document::with_version("1.7");
        let page_id = doc.new_object_id();
        let overlay = Overlay::inversion(200.0, 100.0);
        let annot_id = overlay.annotation(&mut doc, page_id).unwrap();
        let annot = annotation_dict(&doc, annot_id);

        assert_eq!(annot.get(b"Subtype").unwrap().as_name().unwrap(), b"Polygon");
        assert_eq!(annot.get(b"BM").unwrap().as_name().unwrap(), b"Difference");
        assert_eq!(real(annot.get(b"CA").unwrap()), 1.0);
        assert_eq!(annot.get(b"F").unwrap().as_i64().unwrap(), 4);
        assert_eq!(annot.get(b"P").unwrap().as_reference().unwrap(), page_id);

        let fill: Vec<f32> = annot
            .get(b"IC")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(real)
            .collect();
        assert_eq!(fill, vec![1.0, 1.0, 1.0]);

        let bs = annot.get(b"BS").unwrap().as_dict().unwrap();
        assert_eq!(real(bs.get(b"W").unwrap()), 0.0);

        let vertices: Vec<f32> = annot
            .get(b"Vertices")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(real)
            .collect();
        assert_eq!(vertices, vec![0.0, 100.0, 200.0, 100.0, 200.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_appearance_stream_paints_blended_fill() {
        let mut doc = Document::with_version("1.7");
        let page_id = doc.new_object_id();
        let annot_id = Overlay::inversion(200.0, 100.0)
            .annotation(&mut doc, page_id)
            .unwrap();
        let ap_id = annotation_dict(&doc, annot_id)
            .get(b"AP")
            .and_then(Object::as_dict)
            .and_then(|ap| ap.get(b"N"))
            .and_then(Object::as_reference)
            .unwrap();
        let stream = doc.get_object(ap_id).unwrap().as_stream().unwrap();

        let gstate = stream
            .dict
            .get(b"Resources")
            .and_then(Object::as_dict)
            .and_then(|r| r.get(b"ExtGState"))
            .and_then(Object::as_dict)
            .and_then(|g| g.get(GSTATE_NAME.as_bytes()))
            .and_then(Object::as_dict)
            .unwrap();
        assert_eq!(gstate.get(b"BM").unwrap().as_name().unwrap(), b"Difference");
        assert_eq!(real(gstate.get(b"ca").unwrap()), 1.0);

        let content = Content::decode(&stream.content).unwrap();
        let operators: Vec<&str> = content
            .operations
            .iter()
            .map(|op| op.operator.as_str())
            .collect();
        assert_eq!(
            operators,
            vec!["q", "gs", "rg", "m", "l", "l", "l", "h", "f", "Q"]
        );
    }

    #[test]
    fn test_degenerate_polygon_is_rejected() {
        let mut doc = Document::with_version("1.7");
        let page_id = doc.new_object_id();
        let mut overlay = Overlay::inversion(10.0, 10.0);
        overlay.vertices.truncate(2);
        assert!(overlay.annotation(&mut doc, page_id).is_err());
    }

    #[test]
    fn test_difference_with_white_inverts_rgb8() {
        let inverted = BlendMode::Difference.composite(Rgb::from_rgb8(200, 200, 200), Rgb::WHITE, 1.0);
        assert_eq!(inverted.to_rgb8(), (55, 55, 55));
        let inverted = BlendMode::Difference.composite(Rgb::from_rgb8(10, 10, 10), Rgb::WHITE, 1.0);
        assert_eq!(inverted.to_rgb8(), (245, 245, 245));
        assert_eq!(
            BlendMode::Difference.composite(Rgb::BLACK, Rgb::WHITE, 1.0),
            Rgb::WHITE
        );
    }

    #[test]
    fn test_zero_opacity_leaves_backdrop() {
        let backdrop = Rgb::from_rgb8(12, 34, 56);
        assert_eq!(
            BlendMode::Difference.composite(backdrop, Rgb::WHITE, 0.0),
            backdrop
        );
    }

    proptest! {
        #[test]
        fn difference_with_white_is_involution(r: u8, g: u8, b: u8) {
            let original = Rgb::from_rgb8(r, g, b);
            let once = BlendMode::Difference.composite(original, Rgb::WHITE, 1.0);
            let twice = BlendMode::Difference.composite(once, Rgb::WHITE, 1.0);
            prop_assert_eq!(once.to_rgb8(), (255 - r, 255 - g, 255 - b));
            prop_assert_eq!(twice.to_rgb8(), (r, g, b));
        }
    }
}
