//! Application facade
//!
//! Ties the components together for the two user flows: reading and
//! filling an existing form, and turning a flat PDF into a fillable one.

use crate::analyzer::{FieldAnalyzer, FieldCandidate};
use crate::forms::{FormReader, FormWriter};
use crate::generator::{FormMaterializer, MaterializeReport};
use crate::llm::LanguageModel;
use crate::positioner::FieldPositioner;
use crate::report::{load_report, save_report};
use crate::PdfError;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// `filled_<name>` next to the input
pub fn default_filled_path<P: AsRef<Path>>(input: P) -> PathBuf {
    let input = input.as_ref();
    let mut name = OsString::from("filled_");
    name.push(input.file_name().unwrap_or_default());
    input.with_file_name(name)
}

/// `<stem>_fillable.pdf` next to the input
pub fn default_fillable_path<P: AsRef<Path>>(input: P) -> PathBuf {
    let input = input.as_ref();
    let mut name = input.file_stem().unwrap_or_default().to_os_string();
    name.push("_fillable.pdf");
    input.with_file_name(name)
}

/// Reads and fills the form fields of one PDF
#[derive(Debug)]
pub struct FormFillerApp {
    pdf_path: PathBuf,
    reader: FormReader,
    writer: FormWriter,
}

impl FormFillerApp {
    pub fn new<P: Into<PathBuf>>(pdf_path: P) -> Self {
        let pdf_path = pdf_path.into();
        Self {
            reader: FormReader::new(pdf_path.clone()),
            writer: FormWriter::new(pdf_path.clone()),
            pdf_path,
        }
    }

    pub fn pdf_path(&self) -> &Path {
        &self.pdf_path
    }

    pub fn reader(&self) -> &FormReader {
        &self.reader
    }

    /// Load the PDF and render its field listing
    pub fn analyze_pdf(&mut self) -> Result<String, PdfError> {
        log::info!("Analyzing PDF: {}", self.pdf_path.display());
        self.reader.load()?;
        Ok(self.reader.format_fields())
    }

    /// Field names of the PDF; empty when it cannot be loaded
    pub fn available_fields(&mut self) -> Vec<String> {
        match self.reader.load() {
            Ok(()) => self.reader.field_names(),
            Err(e) => {
                log::error!("Error loading PDF: {}", e);
                Vec::new()
            }
        }
    }

    /// Fill several fields and save, returning the output path
    pub fn fill_form(
        &mut self,
        values: &BTreeMap<String, String>,
        output_path: Option<&Path>,
    ) -> Result<PathBuf, PdfError> {
        let output_path = output_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_filled_path(&self.pdf_path));
        log::info!(
            "Filling {} fields, output: {}",
            values.len(),
            output_path.display()
        );

        self.writer.load()?;
        self.writer.fill_fields(values)?;
        self.writer.save(&output_path)?;
        Ok(output_path)
    }

    /// Fill one field and save, returning the output path
    pub fn fill_single_field(
        &mut self,
        field_name: &str,
        value: &str,
        output_path: Option<&Path>,
    ) -> Result<PathBuf, PdfError> {
        let mut values = BTreeMap::new();
        values.insert(field_name.to_string(), value.to_string());
        self.fill_form(&values, output_path)
    }
}

/// Propose fields for a flat PDF and write them to a report file
pub fn analyze_to_report<M, P, Q>(
    model: M,
    pdf_path: P,
    report_path: Q,
) -> Result<Vec<FieldCandidate>, PdfError>
where
    M: LanguageModel,
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let candidates = FieldAnalyzer::new(model).analyze(pdf_path)?;
    save_report(&candidates, report_path)?;
    Ok(candidates)
}

/// Place the fields of a saved report and write the fillable PDF
pub fn generate_from_report<M, P, Q>(
    model: M,
    materializer: &FormMaterializer,
    pdf_path: P,
    report_path: Q,
    output_path: Option<&Path>,
) -> Result<(PathBuf, MaterializeReport), PdfError>
where
    M: LanguageModel,
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let pdf_path = pdf_path.as_ref();
    let output_path = output_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_fillable_path(pdf_path));

    let candidates = load_report(report_path)?;
    log::info!("Loaded {} field candidates", candidates.len());

    let positions = FieldPositioner::new(model).resolve(pdf_path, &candidates)?;
    if positions.is_empty() {
        return Err(PdfError::NoPositions);
    }
    log::info!("Resolved positions for {} fields", positions.len());

    let report = materializer.materialize(pdf_path, &positions, &output_path)?;
    Ok((output_path, report))
}
