//! Text extraction from PDF using lopdf
//!
//! This module extracts per-page plain text and per-page positioned text
//! spans. Span boxes are reported in top-left-origin page space (y grows
//! downward), which is the convention the positioning prompt uses.

use crate::{open_document, PdfError};
use lopdf::{Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::path::Path;

/// Fallback page height (US Letter) when no MediaBox can be resolved
pub(crate) const DEFAULT_PAGE_HEIGHT: f32 = 792.0;

/// Average glyph advance as a fraction of the font size
const AVG_CHAR_WIDTH: f32 = 0.5;

/// Axis-aligned box in top-left-origin page space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

/// A run of text with its position on the page
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    /// The text content
    pub text: String,
    /// Bounding box (top-left origin)
    pub bbox: BBox,
    /// Font resource name
    pub font: String,
    /// Rendered font size
    pub size: f32,
}

/// Text shown by the content stream, still in PDF space (origin bottom-left)
#[derive(Debug, Clone)]
struct RawSpan {
    text: String,
    x: f32,
    y: f32,
    font: String,
    size: f32,
}

/// Extract plain text per page (1-indexed) from a PDF file
pub fn extract_page_texts<P: AsRef<Path>>(path: P) -> Result<BTreeMap<u32, String>, PdfError> {
    let doc = open_document(path)?;
    Ok(page_texts_from_doc(&doc))
}

/// Extract plain text per page from a memory buffer
pub fn extract_page_texts_mem(buffer: &[u8]) -> Result<BTreeMap<u32, String>, PdfError> {
    let doc = Document::load_mem(buffer).map_err(|e| PdfError::document_open("<memory>", e))?;
    Ok(page_texts_from_doc(&doc))
}

fn page_texts_from_doc(doc: &Document) -> BTreeMap<u32, String> {
    doc.get_pages()
        .keys()
        .map(|&page_num| {
            let text = doc.extract_text(&[page_num]).unwrap_or_else(|e| {
                log::warn!("Could not extract text from page {}: {}", page_num, e);
                String::new()
            });
            (page_num, text)
        })
        .collect()
}

/// Extract positioned text spans per page (1-indexed) from a PDF file
pub fn extract_page_spans<P: AsRef<Path>>(
    path: P,
) -> Result<BTreeMap<u32, Vec<TextSpan>>, PdfError> {
    let doc = open_document(path)?;
    Ok(page_spans_from_doc(&doc))
}

/// Extract positioned text spans per page from a memory buffer
pub fn extract_page_spans_mem(buffer: &[u8]) -> Result<BTreeMap<u32, Vec<TextSpan>>, PdfError> {
    let doc = Document::load_mem(buffer).map_err(|e| PdfError::document_open("<memory>", e))?;
    Ok(page_spans_from_doc(&doc))
}

fn page_spans_from_doc(doc: &Document) -> BTreeMap<u32, Vec<TextSpan>> {
    let mut result = BTreeMap::new();

    for (&page_num, &page_id) in doc.get_pages().iter() {
        let raw = extract_page_raw_spans(doc, page_id).unwrap_or_else(|e| {
            log::warn!("Could not read content of page {}: {}", page_num, e);
            Vec::new()
        });
        let origin = page_origin(doc, page_id);
        let spans: Vec<TextSpan> = raw.into_iter().map(|r| to_top_left(r, origin)).collect();
        log::debug!("Page {}: {} text spans", page_num, spans.len());
        result.insert(page_num, spans);
    }

    result
}

/// Convert a baseline-anchored span into a top-left-origin box.
/// `origin` is the page's top-left corner in user space.
fn to_top_left(raw: RawSpan, origin: (f32, f32)) -> TextSpan {
    let (left, top) = origin;
    let width = raw.text.chars().count() as f32 * raw.size * AVG_CHAR_WIDTH;
    let x = raw.x - left;
    let baseline = top - raw.y;
    TextSpan {
        bbox: BBox {
            x0: x,
            y0: baseline - raw.size,
            x1: x + width,
            y1: baseline,
        },
        text: raw.text,
        font: raw.font,
        size: raw.size,
    }
}

/// Top-left corner `(left, top)` of a page's MediaBox in user space,
/// following inheritance through /Parent
pub(crate) fn page_origin(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let mut current = Some(page_id);
    // Bounded walk so a cyclic /Parent chain cannot loop forever
    for _ in 0..32 {
        let Some(id) = current else { break };
        let Ok(dict) = doc.get_dictionary(id) else {
            break;
        };
        if let Ok(media_box) = dict.get(b"MediaBox") {
            let media_box = match media_box {
                Object::Reference(r) => doc.get_object(*r).ok(),
                other => Some(other),
            };
            if let Some(Ok(values)) = media_box.map(|m| m.as_array()) {
                if values.len() == 4 {
                    let x0 = get_number(&values[0]).unwrap_or(0.0);
                    let y0 = get_number(&values[1]).unwrap_or(0.0);
                    let x1 = get_number(&values[2]).unwrap_or(0.0);
                    let y1 = get_number(&values[3]).unwrap_or(DEFAULT_PAGE_HEIGHT);
                    return (x0.min(x1), y0.max(y1));
                }
            }
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    (0.0, DEFAULT_PAGE_HEIGHT)
}

/// Multiply two 2D transformation matrices
/// Matrix format: [a, b, c, d, e, f] representing:
/// | a  b  0 |
/// | c  d  0 |
/// | e  f  1 |
fn multiply_matrices(m1: &[f32; 6], m2: &[f32; 6]) -> [f32; 6] {
    [
        m1[0] * m2[0] + m1[1] * m2[2],
        m1[0] * m2[1] + m1[1] * m2[3],
        m1[2] * m2[0] + m1[3] * m2[2],
        m1[2] * m2[1] + m1[3] * m2[3],
        m1[4] * m2[0] + m1[5] * m2[2] + m2[4],
        m1[4] * m2[1] + m1[5] * m2[3] + m2[5],
    ]
}

/// Text state carried across operators inside a content stream
struct TextState {
    ctm: [f32; 6],
    ctm_stack: Vec<[f32; 6]>,
    font: String,
    font_size: f32,
    text_matrix: [f32; 6],
    line_matrix: [f32; 6],
    in_text_block: bool,
}

impl TextState {
    fn new() -> Self {
        Self {
            ctm: IDENTITY,
            ctm_stack: Vec::new(),
            font: String::new(),
            font_size: 12.0,
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            in_text_block: false,
        }
    }

    fn next_line(&mut self) {
        self.line_matrix[5] -= self.font_size * 1.2; // Approximate leading
        self.text_matrix = self.line_matrix;
    }

    fn span(&self, text: String) -> RawSpan {
        let size = effective_font_size(self.font_size, &self.text_matrix);
        let combined = multiply_matrices(&self.text_matrix, &self.ctm);
        RawSpan {
            text,
            x: combined[4],
            y: combined[5],
            font: self.font.clone(),
            size,
        }
    }
}

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Walk a page's content stream and collect every shown string
fn extract_page_raw_spans(doc: &Document, page_id: ObjectId) -> Result<Vec<RawSpan>, PdfError> {
    use lopdf::content::Content;

    let mut spans = Vec::new();
    let fonts = doc.get_page_fonts(page_id).unwrap_or_default();

    let content_data = doc
        .get_page_content(page_id)
        .map_err(|e| PdfError::Parse(e.to_string()))?;
    let content = Content::decode(&content_data).map_err(|e| PdfError::Parse(e.to_string()))?;

    let mut state = TextState::new();

    for op in &content.operations {
        match op.operator.as_str() {
            "q" => state.ctm_stack.push(state.ctm),
            "Q" => {
                if let Some(saved) = state.ctm_stack.pop() {
                    state.ctm = saved;
                }
            }
            "cm" => {
                if op.operands.len() >= 6 {
                    let m = read_matrix(&op.operands);
                    state.ctm = multiply_matrices(&m, &state.ctm);
                }
            }
            "BT" => {
                state.in_text_block = true;
                state.text_matrix = IDENTITY;
                state.line_matrix = IDENTITY;
            }
            "ET" => state.in_text_block = false,
            "Tf" => {
                if op.operands.len() >= 2 {
                    if let Ok(name) = op.operands[0].as_name() {
                        state.font = String::from_utf8_lossy(name).to_string();
                    }
                    if let Some(size) = get_number(&op.operands[1]) {
                        state.font_size = size;
                    }
                }
            }
            "Td" | "TD" => {
                if op.operands.len() >= 2 {
                    state.line_matrix[4] += get_number(&op.operands[0]).unwrap_or(0.0);
                    state.line_matrix[5] += get_number(&op.operands[1]).unwrap_or(0.0);
                    state.text_matrix = state.line_matrix;
                }
            }
            "Tm" => {
                if op.operands.len() >= 6 {
                    state.text_matrix = read_matrix(&op.operands);
                    state.line_matrix = state.text_matrix;
                }
            }
            "T*" => state.next_line(),
            "Tj" => {
                if state.in_text_block && !op.operands.is_empty() {
                    if let Some(text) =
                        extract_text_from_operand(&op.operands[0], doc, &fonts, &state.font)
                    {
                        if !text.trim().is_empty() {
                            spans.push(state.span(text));
                        }
                    }
                }
            }
            "TJ" => {
                if state.in_text_block && !op.operands.is_empty() {
                    if let Ok(array) = op.operands[0].as_array() {
                        let combined: String = array
                            .iter()
                            .filter_map(|item| {
                                extract_text_from_operand(item, doc, &fonts, &state.font)
                            })
                            .collect();
                        if !combined.trim().is_empty() {
                            spans.push(state.span(combined));
                        }
                    }
                }
            }
            "'" => {
                state.next_line();
                if !op.operands.is_empty() {
                    if let Some(text) =
                        extract_text_from_operand(&op.operands[0], doc, &fonts, &state.font)
                    {
                        if !text.trim().is_empty() {
                            spans.push(state.span(text));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Ok(spans)
}

fn read_matrix(operands: &[Object]) -> [f32; 6] {
    let mut m = IDENTITY;
    for (i, operand) in operands.iter().take(6).enumerate() {
        m[i] = get_number(operand).unwrap_or(IDENTITY[i]);
    }
    m
}

/// Helper to get f32 from Object
pub(crate) fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Compute effective font size from base size and text matrix
fn effective_font_size(base_size: f32, text_matrix: &[f32; 6]) -> f32 {
    let scale_x = (text_matrix[0].powi(2) + text_matrix[1].powi(2)).sqrt();
    let scale_y = (text_matrix[2].powi(2) + text_matrix[3].powi(2)).sqrt();
    base_size * scale_x.max(scale_y)
}

/// Extract text from a text operand, handling encoding
fn extract_text_from_operand(
    obj: &Object,
    doc: &Document,
    fonts: &BTreeMap<Vec<u8>, &lopdf::Dictionary>,
    current_font: &str,
) -> Option<String> {
    let Object::String(bytes, _) = obj else {
        return None;
    };

    if let Some(font_dict) = fonts.get(current_font.as_bytes()) {
        if let Ok(encoding) = font_dict.get_font_encoding(doc) {
            if let Ok(text) = Document::decode_text(&encoding, bytes) {
                return Some(text);
            }
        }
    }

    Some(decode_pdf_string(bytes))
}

/// Decode a PDF string: UTF-16BE when it carries a BOM, Latin-1 otherwise
pub(crate) fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        return String::from_utf16_lossy(&utf16);
    }
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn test_to_top_left_flips_baseline() {
        let raw = RawSpan {
            text: "Name:".into(),
            x: 72.0,
            y: 700.0,
            font: "F1".into(),
            size: 12.0,
        };
        let span = to_top_left(raw, (0.0, 792.0));
        assert_eq!(span.bbox.x0, 72.0);
        assert_eq!(span.bbox.y1, 92.0);
        assert_eq!(span.bbox.y0, 80.0);
        assert_eq!(span.bbox.width(), 30.0);
        assert_eq!(span.bbox.height(), 12.0);
    }

    #[test]
    fn test_to_top_left_offset_media_box() {
        let raw = RawSpan {
            text: "Date:".into(),
            x: 122.0,
            y: 800.0,
            font: "F1".into(),
            size: 10.0,
        };
        // MediaBox [50 100 662 892]
        let span = to_top_left(raw, (50.0, 892.0));
        assert_eq!(span.bbox.x0, 72.0);
        assert_eq!(span.bbox.y1, 92.0);
        assert_eq!(span.bbox.y0, 82.0);
    }

    #[test]
    fn test_page_origin_inherited_media_box() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(lopdf::dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(lopdf::dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::from(page_id)],
                "Count" => Object::Integer(1),
                "MediaBox" => vec![Object::Integer(50), Object::Integer(100), Object::Integer(662), Object::Integer(892)],
            }),
        );
        assert_eq!(page_origin(&doc, page_id), (50.0, 892.0));
    }

    #[test]
    fn test_effective_font_size_scaled_matrix() {
        let size = effective_font_size(1.0, &[11.0, 0.0, 0.0, 11.0, 50.0, 50.0]);
        assert!((size - 11.0).abs() < 0.001);
    }

    #[test]
    fn test_multiply_matrices_translation() {
        let text = [1.0, 0.0, 0.0, 1.0, 10.0, 20.0];
        let ctm = [2.0, 0.0, 0.0, 2.0, 5.0, 5.0];
        let combined = multiply_matrices(&text, &ctm);
        assert_eq!(combined[4], 25.0);
        assert_eq!(combined[5], 45.0);
    }

    #[test]
    fn test_decode_pdf_string_utf16() {
        let bytes = [0xFE, 0xFF, 0x00, 0x4A, 0x00, 0xE9];
        assert_eq!(decode_pdf_string(&bytes), "Jé");
    }

    #[test]
    fn test_decode_pdf_string_latin1() {
        assert_eq!(decode_pdf_string(b"Caf\xe9"), "Café");
    }
}
