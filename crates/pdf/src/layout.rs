use std::collections::BTreeMap;

use lopdf::content::Operation;
use lopdf::{Document, Encoding, Object, ObjectId};

/// Runs whose baselines are closer than this (in points) share a line.
const BASELINE_TOLERANCE: f32 = 2.0;

/// TJ adjustments wider than this (thousandths of an em) read as a gap.
const WORD_GAP: f32 = 100.0;

/// Affine transform `[a b c d e f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f32, ty: f32) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    fn from_operands(operands: &[Object]) -> Option<Self> {
        if operands.len() != 6 {
            return None;
        }
        let mut m = [0.0; 6];
        for (slot, operand) in m.iter_mut().zip(operands) {
            *slot = operand.as_float().ok()?;
        }
        Some(Matrix(m))
    }

    /// `self` followed by `next`.
    fn then(self, next: Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = next.0;
        Matrix([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
struct TextRun {
    x: f32,
    y: f32,
    text: String,
}

/// Text state machine over one page's content stream.
struct PageWalker<'d> {
    encodings: BTreeMap<Vec<u8>, Encoding<'d>>,
    font: Option<Vec<u8>>,
    ctm: Matrix,
    saved: Vec<Matrix>,
    tm: Matrix,
    tlm: Matrix,
    leading: f32,
    /// Set after a show operator; cleared by any positioning operator.
    continuing: bool,
    runs: Vec<TextRun>,
}

impl<'d> PageWalker<'d> {
    fn new(encodings: BTreeMap<Vec<u8>, Encoding<'d>>) -> Self {
        Self {
            encodings,
            font: None,
            ctm: Matrix::IDENTITY,
            saved: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            leading: 0.0,
            continuing: false,
            runs: Vec::new(),
        }
    }

    fn apply(&mut self, op: &Operation) {
        let operands = op.operands.as_slice();
        let number = |i: usize| operands.get(i).and_then(|o| o.as_float().ok());
        match op.operator.as_str() {
            "q" => self.saved.push(self.ctm),
            "Q" => {
                if let Some(ctm) = self.saved.pop() {
                    self.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    self.ctm = m.then(self.ctm);
                }
            }
            "BT" => {
                self.tm = Matrix::IDENTITY;
                self.tlm = Matrix::IDENTITY;
                self.continuing = false;
            }
            "ET" => self.continuing = false,
            "Tf" => {
                self.font = operands
                    .first()
                    .and_then(|o| o.as_name().ok())
                    .map(<[u8]>::to_vec);
            }
            "TL" => {
                if let Some(leading) = number(0) {
                    self.leading = leading;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (number(0), number(1)) {
                    self.move_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (number(0), number(1)) {
                    self.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    self.tm = m;
                    self.tlm = m;
                    self.continuing = false;
                }
            }
            "T*" => self.move_line(0.0, -self.leading),
            "Tj" | "TJ" => self.show(operands),
            "'" => {
                self.move_line(0.0, -self.leading);
                self.show(operands);
            }
            "\"" => {
                self.move_line(0.0, -self.leading);
                self.show(operands.get(2..).unwrap_or(&[]));
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).then(self.tlm);
        self.tm = self.tlm;
        self.continuing = false;
    }

    fn show(&mut self, operands: &[Object]) {
        let mut text = String::new();
        self.decode_operands(operands, &mut text);
        if text.is_empty() {
            return;
        }
        if self.continuing {
            if let Some(run) = self.runs.last_mut() {
                run.text.push_str(&text);
                return;
            }
        }
        let origin = self.tm.then(self.ctm);
        self.runs.push(TextRun { x: origin.0[4], y: origin.0[5], text });
        self.continuing = true;
    }

    fn decode_operands(&self, operands: &[Object], out: &mut String) {
        for operand in operands {
            match operand {
                Object::String(bytes, _) => out.push_str(&self.decode(bytes)),
                Object::Array(items) => self.decode_operands(items, out),
                Object::Integer(_) | Object::Real(_) => {
                    if operand.as_float().is_ok_and(|adjust| adjust < -WORD_GAP) {
                        out.push(' ');
                    }
                }
                _ => {}
            }
        }
    }

    fn decode(&self, bytes: &[u8]) -> String {
        self.font
            .as_ref()
            .and_then(|font| self.encodings.get(font))
            .and_then(|encoding| Document::decode_text(encoding, bytes).ok())
            .unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Visual lines of a page, top to bottom. Runs on one baseline are joined
/// left to right with a single space, however the content stream orders them.
pub(crate) fn page_lines(doc: &Document, page_id: ObjectId) -> lopdf::Result<Vec<String>> {
    let encodings = doc
        .get_page_fonts(page_id)?
        .into_iter()
        .filter_map(|(name, font)| match font.get_font_encoding(doc) {
            Ok(encoding) => Some((name, encoding)),
            Err(e) => {
                tracing::debug!(
                    font = %String::from_utf8_lossy(&name),
                    error = %e,
                    "font encoding unreadable, decoding as raw bytes"
                );
                None
            }
        })
        .collect();

    let content = doc.get_and_decode_page_content(page_id)?;
    let mut walker = PageWalker::new(encodings);
    for op in &content.operations {
        walker.apply(op);
    }
    Ok(group_lines(walker.runs))
}

fn group_lines(mut runs: Vec<TextRun>) -> Vec<String> {
    runs.sort_by(|a, b| b.y.total_cmp(&a.y));

    let mut rows: Vec<(f32, Vec<TextRun>)> = Vec::new();
    for run in runs {
        match rows.last_mut() {
            Some((y, row)) if (*y - run.y).abs() <= BASELINE_TOLERANCE => row.push(run),
            _ => rows.push((run.y, vec![run])),
        }
    }

    rows.into_iter()
        .map(|(_, mut row)| {
            row.sort_by(|a, b| a.x.total_cmp(&b.x));
            row.iter()
                .map(|r| r.text.trim())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|line| !line.is_empty())
        .collect()
}
