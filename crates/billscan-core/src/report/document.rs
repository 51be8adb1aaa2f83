//! Minimal page-description layer over lopdf.
//!
//! Coordinates are millimetres from the top-left corner of an A4 page, as the
//! layout code thinks about them; conversion to PDF user space happens here.

use std::io::Cursor;

use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use super::layout::{string_width, MM_PER_PT};
use crate::error::ReportError;

/// A4 page size in millimetres.
pub const PAGE_WIDTH: f32 = 210.0;
pub const PAGE_HEIGHT: f32 = 297.0;

/// Page margin in millimetres.
pub const MARGIN: f32 = 10.0;

const PT_PER_MM: f32 = 1.0 / MM_PER_PT;

/// Font face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource_name(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

/// Horizontal text alignment inside a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

/// RGB colour with components in `0.0..=1.0`.
pub type Rgb = (f32, f32, f32);

/// Map text onto the single-byte WinAnsi encoding of the built-in fonts.
///
/// Anything outside printable Latin-1 becomes `?`.
pub fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            code @ (0x20..=0x7E | 0xA0..=0xFF) => code as u8,
            _ => b'?',
        })
        .collect()
}

/// Content of one page under construction.
#[derive(Debug, Default)]
pub struct Page {
    operations: Vec<Operation>,
    images: Vec<(String, ObjectId)>,
}

fn x_pt(x: f32) -> Object {
    (x * PT_PER_MM).into()
}

fn y_pt(y: f32) -> Object {
    ((PAGE_HEIGHT - y) * PT_PER_MM).into()
}

fn len_pt(l: f32) -> Object {
    (l * PT_PER_MM).into()
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    fn op(&mut self, operator: &str, operands: Vec<Object>) {
        self.operations.push(Operation::new(operator, operands));
    }

    #[cfg(test)]
    pub(crate) fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Draw a single line of text with its baseline at `y`.
    pub fn text(&mut self, x: f32, y: f32, font: Font, size: f32, text: &str) {
        self.op("BT", vec![]);
        self.op("Tf", vec![Object::Name(font.resource_name().into()), size.into()]);
        self.op("Td", vec![x_pt(x), y_pt(y)]);
        self.op(
            "Tj",
            vec![Object::String(encode_text(text), StringFormat::Literal)],
        );
        self.op("ET", vec![]);
    }

    /// Draw text rotated counter-clockwise by `degrees` around its origin.
    pub fn text_rotated(&mut self, x: f32, y: f32, degrees: f32, size: f32, text: &str) {
        let (sin, cos) = degrees.to_radians().sin_cos();
        self.op("BT", vec![]);
        self.op("Tf", vec![Object::Name(Font::Regular.resource_name().into()), size.into()]);
        self.op(
            "Tm",
            vec![cos.into(), sin.into(), (-sin).into(), cos.into(), x_pt(x), y_pt(y)],
        );
        self.op(
            "Tj",
            vec![Object::String(encode_text(text), StringFormat::Literal)],
        );
        self.op("ET", vec![]);
    }

    /// Draw text vertically centred in a box of the given height, aligned
    /// horizontally within the box width.
    #[allow(clippy::too_many_arguments)]
    pub fn text_in_box(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        font: Font,
        size: f32,
        align: Align,
        text: &str,
    ) {
        let text_width = string_width(text, size);
        let padding = 1.0;
        let left = match align {
            Align::Left => x + padding,
            Align::Center => x + (width - text_width) / 2.0,
            Align::Right => x + width - padding - text_width,
        };
        let baseline = y + height / 2.0 + 0.3 * size * MM_PER_PT;
        self.text(left, baseline, font, size, text);
    }

    /// Stroke a rectangle outline.
    pub fn rect(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.op("re", vec![x_pt(x), y_pt(y + height), len_pt(width), len_pt(height)]);
        self.op("S", vec![]);
    }

    /// Fill a rectangle.
    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgb) {
        self.set_fill(color);
        self.op("re", vec![x_pt(x), y_pt(y + height), len_pt(width), len_pt(height)]);
        self.op("f", vec![]);
    }

    /// Stroke a straight line.
    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.op("m", vec![x_pt(x1), y_pt(y1)]);
        self.op("l", vec![x_pt(x2), y_pt(y2)]);
        self.op("S", vec![]);
    }

    /// Stroke a polyline through the given points.
    pub fn polyline(&mut self, points: &[(f32, f32)]) {
        let Some(((x0, y0), rest)) = points.split_first() else {
            return;
        };
        self.op("m", vec![x_pt(*x0), y_pt(*y0)]);
        for (x, y) in rest {
            self.op("l", vec![x_pt(*x), y_pt(*y)]);
        }
        self.op("S", vec![]);
    }

    pub fn set_fill(&mut self, (r, g, b): Rgb) {
        self.op("rg", vec![r.into(), g.into(), b.into()]);
    }

    pub fn set_stroke(&mut self, (r, g, b): Rgb) {
        self.op("RG", vec![r.into(), g.into(), b.into()]);
    }

    pub fn set_line_width(&mut self, width: f32) {
        self.op("w", vec![len_pt(width)]);
    }

    /// Start a path at a point.
    pub fn move_to(&mut self, x: f32, y: f32) {
        self.op("m", vec![x_pt(x), y_pt(y)]);
    }

    pub fn line_to(&mut self, x: f32, y: f32) {
        self.op("l", vec![x_pt(x), y_pt(y)]);
    }

    /// Cubic Bézier to `(x, y)` with control points `c1` and `c2`.
    pub fn curve_to(&mut self, c1: (f32, f32), c2: (f32, f32), x: f32, y: f32) {
        self.op(
            "c",
            vec![
                x_pt(c1.0),
                y_pt(c1.1),
                x_pt(c2.0),
                y_pt(c2.1),
                x_pt(x),
                y_pt(y),
            ],
        );
    }

    /// Close the current path, then fill and stroke it.
    pub fn close_fill_stroke(&mut self) {
        self.op("b", vec![]);
    }

    /// Close the current path and fill it.
    pub fn close_fill(&mut self) {
        self.op("h", vec![]);
        self.op("f", vec![]);
    }

    /// Paint a registered image into a box.
    pub fn image(&mut self, image: ImageRef, x: f32, y: f32, width: f32, height: f32) {
        let name = format!("Im{}", self.images.len() + 1);
        self.op("q", vec![]);
        self.op(
            "cm",
            vec![
                len_pt(width),
                0.into(),
                0.into(),
                len_pt(height),
                x_pt(x),
                y_pt(y + height),
            ],
        );
        self.op("Do", vec![Object::Name(name.clone().into_bytes())]);
        self.op("Q", vec![]);
        self.images.push((name, image.0));
    }
}

/// Handle to an image embedded in a [`ReportDocument`].
#[derive(Debug, Clone, Copy)]
pub struct ImageRef(ObjectId);

/// PDF document assembled page by page.
pub struct ReportDocument {
    doc: Document,
    pages_id: ObjectId,
    fonts_id: ObjectId,
    page_ids: Vec<ObjectId>,
}

impl ReportDocument {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let regular = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let bold = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        let fonts_id = doc.add_object(dictionary! {
            Font::Regular.resource_name() => regular,
            Font::Bold.resource_name() => bold,
        });

        Self {
            doc,
            pages_id,
            fonts_id,
            page_ids: Vec::new(),
        }
    }

    /// Embed an image as a JPEG XObject.
    pub fn add_jpeg(&mut self, image: &DynamicImage) -> Result<ImageRef, image::ImageError> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let mut data = Vec::new();
        DynamicImage::ImageRgb8(rgb).write_to(&mut Cursor::new(&mut data), image::ImageFormat::Jpeg)?;

        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            data,
        )
        .with_compression(false);
        Ok(ImageRef(self.doc.add_object(stream)))
    }

    /// Append a finished page.
    pub fn add_page(&mut self, page: Page) -> Result<(), ReportError> {
        let content = Content {
            operations: page.operations,
        };
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let mut xobjects = Dictionary::new();
        for (name, id) in page.images {
            xobjects.set(name, id);
        }

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => self.fonts_id,
                "XObject" => xobjects,
            },
        });
        self.page_ids.push(page_id);
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Write the page tree and catalog, then serialize.
    pub fn finish(mut self) -> Result<Vec<u8>, ReportError> {
        let kids: Vec<Object> = self.page_ids.iter().map(|id| (*id).into()).collect();
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => self.page_ids.len() as i64,
                "MediaBox" => vec![
                    0.into(),
                    0.into(),
                    (PAGE_WIDTH * PT_PER_MM).into(),
                    (PAGE_HEIGHT * PT_PER_MM).into(),
                ],
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        self.doc
            .save_to(&mut out)
            .map_err(|e| ReportError::Serialize(e.to_string()))?;
        Ok(out)
    }
}
