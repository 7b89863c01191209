//! Field discovery for flat PDFs
//!
//! Sends the document text to a language model and turns its JSON reply
//! into [`FieldCandidate`] records.

use crate::extractor::extract_page_texts;
use crate::llm::LanguageModel;
use crate::response::{get_bool, get_f64, get_string, get_u32, parse_or_log};
use crate::PdfError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

/// A potential fillable field identified in the PDF
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCandidate {
    #[serde(default)]
    pub field_name: String,
    /// text, checkbox, dropdown, signature, date, email, phone, ...
    #[serde(default = "default_field_type")]
    pub field_type: String,
    #[serde(default)]
    pub description: String,
    /// 1-indexed page the field appears on
    #[serde(default = "default_page_number")]
    pub page_number: u32,
    /// Model confidence in [0.0, 1.0]
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub suggested_default: String,
    #[serde(default)]
    pub required: bool,
}

fn default_field_type() -> String {
    "text".to_string()
}

fn default_page_number() -> u32 {
    1
}

impl FieldCandidate {
    /// Build a candidate from one object of the model reply, defaulting
    /// every missing key
    pub fn from_json(map: &Map<String, Value>) -> Self {
        Self {
            field_name: get_string(map, "field_name", ""),
            field_type: get_string(map, "field_type", "text"),
            description: get_string(map, "description", ""),
            page_number: get_u32(map, "page_number", 1),
            confidence: get_f64(map, "confidence", 0.0).clamp(0.0, 1.0),
            suggested_default: get_string(map, "suggested_default", ""),
            required: get_bool(map, "required", false),
        }
    }

    /// Whether the model supplied a usable name
    pub fn is_named(&self) -> bool {
        !self.field_name.trim().is_empty()
    }
}

/// Build the field-discovery prompt from per-page text
pub fn build_analysis_prompt(page_texts: &BTreeMap<u32, String>) -> String {
    let full_text = page_texts
        .iter()
        .map(|(page, text)| format!("Page {}: {}", page, text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"
Analyze the following PDF document text and identify potential fillable fields that could be added to make this a fillable form.

Look for:
1. Labels followed by blank spaces or lines
2. Text that appears to be requesting user input
3. Checkboxes or option lists
4. Signature areas
5. Date fields
6. Name/address fields
7. Any other areas where a user would typically enter information

For each potential field, provide:
- field_name: A descriptive name for the field
- field_type: The type of field (text, checkbox, dropdown, signature, date, email, phone, etc.)
- description: What this field is for
- page_number: Which page the field appears on
- confidence: Your confidence level (0.0 to 1.0) that this should be a fillable field
- required: Whether this field appears to be required
- suggested_default: Any default value that might be appropriate

Please respond with a JSON array of field objects. Here's an example format:
[
    {{
        "field_name": "applicant_name",
        "field_type": "text",
        "description": "Name of the license transfer applicant",
        "page_number": 1,
        "confidence": 0.9,
        "required": true,
        "suggested_default": ""
    }}
]

PDF Content:
{full_text}

Respond only with the JSON array, no additional text.
"#
    )
}

/// Parse a model reply into candidates; malformed replies yield an empty list
pub fn parse_candidates(raw: &str) -> Vec<FieldCandidate> {
    let Some(objects) = parse_or_log(raw, "field analysis") else {
        return Vec::new();
    };

    let candidates: Vec<FieldCandidate> = objects.iter().map(FieldCandidate::from_json).collect();

    let unnamed = candidates.iter().filter(|c| !c.is_named()).count();
    if unnamed > 0 {
        log::warn!("{} field candidates have no field_name", unnamed);
    }

    candidates
}

/// Identifies potential fillable fields in flat PDFs
pub struct FieldAnalyzer<M> {
    model: M,
}

impl<M: LanguageModel> FieldAnalyzer<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Extract text from the PDF and ask the model for field candidates
    pub fn analyze<P: AsRef<Path>>(&self, pdf_path: P) -> Result<Vec<FieldCandidate>, PdfError> {
        let page_texts = extract_page_texts(pdf_path)?;
        self.propose(&page_texts)
    }

    /// Ask the model for field candidates given already-extracted text
    pub fn propose(
        &self,
        page_texts: &BTreeMap<u32, String>,
    ) -> Result<Vec<FieldCandidate>, PdfError> {
        if page_texts.values().all(|t| t.trim().is_empty()) {
            log::warn!("PDF has no extractable text; scanned documents need OCR, which is not supported");
            return Ok(Vec::new());
        }

        let prompt = build_analysis_prompt(page_texts);
        log::debug!(
            "Analysis prompt covers {} pages ({} chars)",
            page_texts.len(),
            prompt.len()
        );

        let reply = self.model.generate(&prompt)?;
        Ok(parse_candidates(&reply))
    }
}

/// Render a human-readable summary of the analysis
pub fn format_analysis_summary(candidates: &[FieldCandidate]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n=== PDF Field Analysis Summary ===");
    let _ = writeln!(out, "Total potential fields identified: {}", candidates.len());
    let _ = writeln!(out, "\nField Details:");
    let _ = writeln!(out, "{}", "-".repeat(80));

    for (i, c) in candidates.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, c.field_name);
        let _ = writeln!(out, "   Type: {}", c.field_type);
        let _ = writeln!(out, "   Description: {}", c.description);
        let _ = writeln!(out, "   Page: {}", c.page_number);
        let _ = writeln!(out, "   Confidence: {:.2}", c.confidence);
        let _ = writeln!(out, "   Required: {}", c.required);
        if !c.suggested_default.is_empty() {
            let _ = writeln!(out, "   Suggested Default: {}", c.suggested_default);
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct RecordingModel {
        reply: String,
        prompts: RefCell<Vec<String>>,
    }

    impl LanguageModel for RecordingModel {
        fn generate(&self, prompt: &str) -> Result<String, PdfError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    fn pages(texts: &[&str]) -> BTreeMap<u32, String> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| (i as u32 + 1, t.to_string()))
            .collect()
    }

    #[test]
    fn test_prompt_labels_pages() {
        let prompt = build_analysis_prompt(&pages(&["Name: ____", "Signature: ____"]));
        assert!(prompt.contains("Page 1: Name: ____\n\nPage 2: Signature: ____"));
        assert!(prompt.contains("\"suggested_default\": \"\""));
        assert!(prompt.contains("Respond only with the JSON array"));
    }

    #[test]
    fn test_parse_applies_defaults() {
        let candidates = parse_candidates(r#"[{"field_name": "email"}]"#);
        assert_eq!(
            candidates,
            vec![FieldCandidate {
                field_name: "email".into(),
                field_type: "text".into(),
                description: String::new(),
                page_number: 1,
                confidence: 0.0,
                suggested_default: String::new(),
                required: false,
            }]
        );
    }

    #[test]
    fn test_parse_keeps_unnamed_candidates() {
        let candidates = parse_candidates(r#"[{"field_type": "checkbox"}, {}]"#);
        assert_eq!(candidates.len(), 2);
        assert!(!candidates[0].is_named());
        assert_eq!(candidates[0].field_type, "checkbox");
    }

    #[test]
    fn test_parse_fenced_reply() {
        let raw = "```json\n[{\"field_name\": \"a\", \"page_number\": 2, \"confidence\": 0.75, \"required\": true}]\n```";
        let candidates = parse_candidates(raw);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].page_number, 2);
        assert_eq!(candidates[0].confidence, 0.75);
        assert!(candidates[0].required);
    }

    #[test]
    fn test_parse_clamps_confidence() {
        let candidates = parse_candidates(r#"[{"field_name": "a", "confidence": 7}]"#);
        assert_eq!(candidates[0].confidence, 1.0);
    }

    #[test]
    fn test_malformed_reply_is_empty() {
        assert!(parse_candidates("I could not find any fields.").is_empty());
    }

    #[test]
    fn test_propose_skips_model_for_textless_pdf() {
        let model = RecordingModel {
            reply: "[]".into(),
            prompts: RefCell::new(Vec::new()),
        };
        let analyzer = FieldAnalyzer::new(&model);
        let result = analyzer.propose(&pages(&["   ", ""])).unwrap();
        assert!(result.is_empty());
        assert!(model.prompts.borrow().is_empty());
    }

    #[test]
    fn test_propose_sends_prompt() {
        let model = RecordingModel {
            reply: r#"[{"field_name": "broker_name", "field_type": "text"}]"#.into(),
            prompts: RefCell::new(Vec::new()),
        };
        let analyzer = FieldAnalyzer::new(&model);
        let result = analyzer.propose(&pages(&["Broker Name: ______"])).unwrap();
        assert_eq!(result[0].field_name, "broker_name");
        assert!(model.prompts.borrow()[0].contains("Broker Name: ______"));
    }

    #[test]
    fn test_summary_lists_fields() {
        let summary = format_analysis_summary(&[FieldCandidate {
            field_name: "state".into(),
            field_type: "dropdown".into(),
            description: "State of residence".into(),
            page_number: 1,
            confidence: 0.8,
            suggested_default: "NY".into(),
            required: true,
        }]);
        assert!(summary.contains("Total potential fields identified: 1"));
        assert!(summary.contains("1. state"));
        assert!(summary.contains("Confidence: 0.80"));
        assert!(summary.contains("Suggested Default: NY"));
    }
}
