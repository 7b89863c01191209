//! Field-analysis report files
//!
//! The report is a pretty-printed JSON array of [`FieldCandidate`] objects.
//! It is written after field discovery and read back before positioning.

use crate::analyzer::FieldCandidate;
use crate::PdfError;
use std::fs;
use std::path::Path;

/// Save candidates as a JSON report, creating parent directories as needed
pub fn save_report<P: AsRef<Path>>(
    candidates: &[FieldCandidate],
    output_path: P,
) -> Result<(), PdfError> {
    let output_path = output_path.as_ref();
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(candidates)?;
    fs::write(output_path, json)?;
    log::info!("Saved field analysis report to {}", output_path.display());
    Ok(())
}

/// Load candidates from a JSON report
pub fn load_report<P: AsRef<Path>>(analysis_path: P) -> Result<Vec<FieldCandidate>, PdfError> {
    let analysis_path = analysis_path.as_ref();
    if !analysis_path.exists() {
        return Err(PdfError::NotFound(analysis_path.to_path_buf()));
    }
    let data = fs::read_to_string(analysis_path)?;
    Ok(serde_json::from_str(&data)?)
}
