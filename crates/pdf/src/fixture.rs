//! Small real PDFs built with lopdf, for exercising `LopdfBackend` end to end.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};

const PAGE_TOP: i64 = 780;
const ROW_HEIGHT: i64 = 18;
const LEFT_MARGIN: i64 = 36;
const COLUMN_WIDTH: i64 = 70;

/// How a statement table's cells are laid out in the content stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellLayout {
    /// Every cell is its own `BT ... ET` block positioned with `Td`.
    SeparateBlocks,
    /// One `BT ... ET` block per page, moving between cells with `Td`.
    SingleBlock,
}

/// Embedded raster for a scanned page.
#[derive(Debug, Clone)]
pub struct ScanImage {
    pub width: i64,
    pub height: i64,
    pub color_space: &'static str,
    pub filters: Vec<&'static str>,
    pub decode_parms: Option<Dictionary>,
    pub data: Vec<u8>,
}

/// One page: its resource dictionary and its content operations.
#[derive(Debug, Clone, Default)]
pub struct FixturePage {
    resources: Dictionary,
    operations: Vec<Operation>,
    image: Option<ScanImage>,
}

impl FixturePage {
    /// A page with a text layer; each row is a list of cells drawn left to right
    /// on one baseline, cells emitted in the order given.
    pub fn table(rows: &[Vec<&str>], layout: CellLayout) -> Self {
        let mut ops = Vec::new();
        if layout == CellLayout::SingleBlock {
            ops.push(Operation::new("BT", vec![]));
            ops.push(Operation::new("Tf", vec!["F1".into(), 9.into()]));
        }
        // Td is relative to the previous line start inside one text object.
        let mut origin = (0, 0);
        for (row, cells) in rows.iter().enumerate() {
            let y = PAGE_TOP - ROW_HEIGHT * row as i64;
            for (column, cell) in cells.iter().enumerate() {
                let x = LEFT_MARGIN + COLUMN_WIDTH * column as i64;
                match layout {
                    CellLayout::SeparateBlocks => {
                        ops.push(Operation::new("BT", vec![]));
                        ops.push(Operation::new("Tf", vec!["F1".into(), 9.into()]));
                        ops.push(Operation::new("Td", vec![x.into(), y.into()]));
                        ops.push(Operation::new("Tj", vec![Object::string_literal(*cell)]));
                        ops.push(Operation::new("ET", vec![]));
                    }
                    CellLayout::SingleBlock => {
                        ops.push(Operation::new("Td", vec![(x - origin.0).into(), (y - origin.1).into()]));
                        ops.push(Operation::new("Tj", vec![Object::string_literal(*cell)]));
                        origin = (x, y);
                    }
                }
            }
        }
        if layout == CellLayout::SingleBlock {
            ops.push(Operation::new("ET", vec![]));
        }

        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        };
        Self {
            resources: dictionary! { "Font" => dictionary! { "F1" => font } },
            operations: ops,
            image: None,
        }
    }

    /// A page with no text layer, only a full-page image.
    pub fn scanned(image: ScanImage) -> Self {
        let ops = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![595.into(), 0.into(), 0.into(), 842.into(), 0.into(), 0.into()],
            ),
            Operation::new("Do", vec!["Im1".into()]),
            Operation::new("Q", vec![]),
        ];
        Self { resources: Dictionary::new(), operations: ops, image: Some(image) }
    }

    /// A page with neither text nor images.
    pub fn blank() -> Self {
        Self::default()
    }
}

/// Serialize `pages` as an unencrypted PDF.
pub fn document(pages: Vec<FixturePage>) -> lopdf::Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for page in pages {
        let mut resources = page.resources;
        if let Some(image) = page.image {
            let mut dict = dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width,
                "Height" => image.height,
                "ColorSpace" => image.color_space,
                "BitsPerComponent" => 8,
            };
            match image.filters.as_slice() {
                [] => {}
                [single] => dict.set("Filter", *single),
                many => dict.set(
                    "Filter",
                    many.iter().map(|f| Object::from(*f)).collect::<Vec<_>>(),
                ),
            }
            if let Some(parms) = image.decode_parms {
                dict.set("DecodeParms", parms);
            }
            let image_id = doc.add_object(Stream::new(dict, image.data));
            resources.set("XObject", dictionary! { "Im1" => image_id });
        }

        let content = Content { operations: page.operations }.encode()?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => Object::Array(vec![0.into(), 0.into(), 595.into(), 842.into()]),
            "Contents" => content_id,
            "Resources" => resources,
        });
        kids.push(Object::from(page_id));
    }

    let count = kids.len() as i64;
    doc.set_object(pages_id, dictionary! { "Type" => "Pages", "Kids" => kids, "Count" => count });
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}
