//! CLI for reading, filling and generating PDF forms

use clap::{Parser, Subcommand};
use pdf_filler::{
    analyze_to_report, format_analysis_summary, generate_from_report, FormFillerApp,
    FormMaterializer, GeminiClient, LlmConfig, PdfError,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;

/// Read and fill PDF forms, or turn flat PDFs into fillable ones.
#[derive(Debug, Parser)]
#[command(name = "pdf-filler", about, version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the form fields of a fillable PDF
    Fields {
        /// Path to the PDF file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Fill form fields and save a new PDF
    Fill {
        /// Path to the PDF file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Field value as NAME=VALUE (repeatable)
        #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment, required = true)]
        values: Vec<(String, String)>,

        /// Output path. Default: filled_<name> next to the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Propose fillable fields for a flat PDF and write a report
    Analyze {
        /// Path to the PDF file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Report path
        #[arg(long, default_value = "field_analysis_report.json")]
        report: PathBuf,
    },

    /// Place the fields of a report and write a fillable PDF
    Generate {
        /// Path to the PDF file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Report produced by `analyze`
        #[arg(long)]
        report: PathBuf,

        /// Output path. Default: <stem>_fillable.pdf next to the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", raw)),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Fields { file } => run_fields(file),
        Commands::Fill {
            file,
            values,
            output,
        } => run_fill(file, values, output),
        Commands::Analyze { file, report } => run_analyze(file, report),
        Commands::Generate {
            file,
            report,
            output,
        } => run_generate(file, report, output),
    };

    if let Err(e) = result {
        eprintln!("❌ {}", e);
        process::exit(1);
    }
}

fn run_fields(file: PathBuf) -> Result<(), PdfError> {
    let mut app = FormFillerApp::new(file);
    print!("{}", app.analyze_pdf()?);
    println!("Available field names: {:?}", app.reader().field_names());
    Ok(())
}

fn run_fill(
    file: PathBuf,
    values: Vec<(String, String)>,
    output: Option<PathBuf>,
) -> Result<(), PdfError> {
    let values: BTreeMap<String, String> = values.into_iter().collect();
    let mut app = FormFillerApp::new(file);
    let saved = app.fill_form(&values, output.as_deref())?;
    println!("✅ Filled {} fields, saved to {}", values.len(), saved.display());
    Ok(())
}

fn run_analyze(file: PathBuf, report: PathBuf) -> Result<(), PdfError> {
    let client = GeminiClient::new(LlmConfig::from_env()?)?;
    let candidates = analyze_to_report(&client, &file, &report)?;
    print!("{}", format_analysis_summary(&candidates));
    println!("✅ Analysis report saved to {}", report.display());
    Ok(())
}

fn run_generate(
    file: PathBuf,
    report: PathBuf,
    output: Option<PathBuf>,
) -> Result<(), PdfError> {
    let client = GeminiClient::new(LlmConfig::from_env()?)?;
    let (saved, outcome) = generate_from_report(
        &client,
        &FormMaterializer::new(),
        &file,
        &report,
        output.as_deref(),
    )?;
    println!(
        "✅ Fillable PDF saved to {} ({} fields placed, {} skipped, {} failed)",
        saved.display(),
        outcome.placed,
        outcome.skipped,
        outcome.failed
    );
    Ok(())
}
