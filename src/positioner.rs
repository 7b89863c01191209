//! Field placement
//!
//! Given the positioned text of a page and the fields to place, asks the
//! language model where each widget should go.

use crate::analyzer::FieldCandidate;
use crate::extractor::{extract_page_spans, TextSpan};
use crate::llm::LanguageModel;
use crate::response::{get_bool, get_f64, get_string, get_u32, parse_or_log};
use crate::PdfError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

pub const DEFAULT_WIDTH: f64 = 150.0;
pub const DEFAULT_HEIGHT: f64 = 25.0;

/// Position and properties of a field on the page.
///
/// Coordinates use a top-left origin with y increasing downward.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPosition {
    pub field_name: String,
    pub field_type: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// 1-indexed
    pub page_number: u32,
    pub description: String,
    pub required: bool,
}

impl FieldPosition {
    pub fn from_json(map: &Map<String, Value>) -> Self {
        Self {
            field_name: get_string(map, "field_name", ""),
            field_type: get_string(map, "field_type", "text"),
            x: get_f64(map, "x", 0.0),
            y: get_f64(map, "y", 0.0),
            width: get_f64(map, "width", DEFAULT_WIDTH),
            height: get_f64(map, "height", DEFAULT_HEIGHT),
            page_number: get_u32(map, "page_number", 1),
            description: get_string(map, "description", ""),
            required: get_bool(map, "required", false),
        }
    }
}

/// Build the positioning prompt from page layout and the fields to place
pub fn build_position_prompt(
    page_spans: &BTreeMap<u32, Vec<TextSpan>>,
    fields: &[FieldCandidate],
) -> String {
    let mut text_layout = String::new();
    for (page_num, spans) in page_spans {
        let _ = writeln!(text_layout, "\nPage {} Text Layout:", page_num);
        for (i, span) in spans.iter().enumerate() {
            let text = span.text.trim();
            if text.is_empty() {
                continue;
            }
            let b = &span.bbox;
            let _ = writeln!(
                text_layout,
                "  Block {}: '{}' at position (x:{:.1}, y:{:.1}, width:{:.1}, height:{:.1})",
                i,
                text,
                b.x0,
                b.y0,
                b.width(),
                b.height()
            );
        }
    }

    let mut fields_to_place = String::new();
    for field in fields {
        let _ = writeln!(
            fields_to_place,
            "- {} ({}): {}",
            field.field_name, field.field_type, field.description
        );
    }

    format!(
        r#"
You are helping to create a fillable PDF form by positioning form fields based on the document layout and field analysis.

Document Text Layout:
{text_layout}

Fields to Position:
{fields_to_place}

For each field, analyze the text layout and determine where the field should be positioned. Look for:
1. Labels or text that correspond to each field
2. Blank spaces or lines where users would write
3. Appropriate positioning near related text

For each field, provide the position as JSON with this format:
{{
    "field_name": "field_name_here",
    "field_type": "field_type_here",
    "x": x_coordinate,
    "y": y_coordinate,
    "width": field_width,
    "height": field_height,
    "page_number": page_number,
    "description": "field_description_here",
    "required": true_or_false
}}

Guidelines for positioning:
- Text fields: width 150-200, height 20-25
- Date fields: width 100-120, height 20-25
- Email/phone fields: width 150-180, height 20-25
- Signature fields: width 200-250, height 30-40
- Checkbox fields: width 15-20, height 15-20
- Dropdown fields: width 150-200, height 25-30

Position fields slightly to the right of labels or in obvious blank spaces.
Y coordinates increase downward (0 is top of page).

Respond with a JSON array of field position objects only, no additional text.
"#
    )
}

/// Parse a model reply into positions; malformed replies yield an empty list
pub fn parse_positions(raw: &str) -> Vec<FieldPosition> {
    parse_or_log(raw, "position")
        .map(|objects| objects.iter().map(FieldPosition::from_json).collect())
        .unwrap_or_default()
}

/// Determines widget placement for analysed fields
pub struct FieldPositioner<M> {
    model: M,
}

impl<M: LanguageModel> FieldPositioner<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Extract the PDF's layout and ask the model to place `fields`
    pub fn resolve<P: AsRef<Path>>(
        &self,
        pdf_path: P,
        fields: &[FieldCandidate],
    ) -> Result<Vec<FieldPosition>, PdfError> {
        let page_spans = extract_page_spans(pdf_path)?;
        self.place(&page_spans, fields)
    }

    /// Ask the model to place `fields` given already-extracted layout
    pub fn place(
        &self,
        page_spans: &BTreeMap<u32, Vec<TextSpan>>,
        fields: &[FieldCandidate],
    ) -> Result<Vec<FieldPosition>, PdfError> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = build_position_prompt(page_spans, fields);
        log::debug!(
            "Position prompt for {} fields ({} chars)",
            fields.len(),
            prompt.len()
        );

        let reply = self.model.generate(&prompt)?;
        Ok(parse_positions(&reply))
    }
}
