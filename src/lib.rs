//! PDF form inspection, filling, and AI-assisted form synthesis using lopdf
//!
//! This crate provides:
//! - Reading and filling existing AcroForm fields
//! - Text and layout extraction for flat (non-fillable) PDFs
//! - LLM-driven field discovery and placement
//! - Widget materialization into a new fillable PDF

pub mod analyzer;
pub mod app;
pub mod config;
pub mod extractor;
pub mod forms;
pub mod generator;
pub mod llm;
pub mod positioner;
pub mod report;
pub mod response;

pub use analyzer::{format_analysis_summary, FieldAnalyzer, FieldCandidate};
pub use app::{
    analyze_to_report, default_filled_path, default_fillable_path, generate_from_report,
    FormFillerApp,
};
pub use config::LlmConfig;
pub use extractor::{extract_page_spans, extract_page_texts, BBox, TextSpan};
pub use forms::{
    fill_pdf_form, fill_single_field, read_pdf_fields, FieldInfo, FieldType, FormField,
    FormReader, FormWriter,
};
pub use generator::{ChoicePresets, FormMaterializer, MaterializeReport, WidgetKind};
pub use llm::{GeminiClient, LanguageModel};
pub use positioner::{FieldPosition, FieldPositioner};
pub use report::{load_report, save_report};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parsing error: {0}")]
    Parse(String),
    #[error("Cannot open PDF {path}: {reason}")]
    DocumentOpen { path: PathBuf, reason: String },
    #[error("PDF file not found at {0}")]
    NotFound(PathBuf),
    #[error("PDF not loaded. Call load() first")]
    NotLoaded,
    #[error("PDF has no pages")]
    NoPages,
    #[error("Field '{0}' not found in the PDF")]
    UnknownField(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("LLM request failed: {message}")]
    Llm {
        message: String,
        status: Option<u16>,
    },
    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No field positions could be determined")]
    NoPositions,
    #[error("Error adding field {field}: {reason}")]
    Widget { field: String, reason: String },
}

impl From<lopdf::Error> for PdfError {
    fn from(e: lopdf::Error) -> Self {
        PdfError::Parse(e.to_string())
    }
}

impl PdfError {
    pub(crate) fn document_open(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PdfError::DocumentOpen {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Load a document from disk, mapping every failure to `DocumentOpen`.
pub(crate) fn open_document<P: AsRef<std::path::Path>>(
    path: P,
) -> Result<lopdf::Document, PdfError> {
    let path = path.as_ref();
    lopdf::Document::load(path).map_err(|e| PdfError::document_open(path, e))
}
