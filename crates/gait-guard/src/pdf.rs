// crates/gait-guard/src/pdf.rs
// ============================================================================
// Module: PDF Summary Rendering
// Description: Minimal hand-constructed single-page PDF summary.
// Purpose: Render a deterministic human-readable cover sheet for packs.
// Dependencies: none
// ============================================================================

//! ## Overview
//! The summary is one page of text lines: run id, case id, template,
//! generated timestamp, and the first eight evidence paths. Objects are
//! emitted by hand with a computed xref table, so the bytes depend only on
//! the inputs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Inputs for the summary page.
#[derive(Debug, Clone, Default)]
pub struct SummaryPdfOptions {
    /// Run identifier.
    pub run_id: String,
    /// Case identifier.
    pub case_id: String,
    /// Template identifier.
    pub template_id: String,
    /// Generation timestamp; the frozen epoch when absent.
    pub generated_at: Option<OffsetDateTime>,
    /// Evidence paths carried in the pack.
    pub evidence_paths: Vec<String>,
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders the single-page summary PDF.
#[must_use]
pub fn render_summary_pdf(options: &SummaryPdfOptions) -> Vec<u8> {
    let generated_at = options.generated_at.unwrap_or_else(gait_core::frozen_epoch);
    let mut evidence_paths = options.evidence_paths.clone();
    evidence_paths.sort();
    evidence_paths.truncate(8);

    let mut lines = vec![
        "Gait Evidence Pack Summary".to_string(),
        format!("Run ID: {}", options.run_id.trim()),
        format!("Case ID: {}", options.case_id.trim()),
        format!("Template: {}", options.template_id.trim()),
        format!(
            "Generated: {}",
            generated_at.format(&Rfc3339).unwrap_or_else(|_| "1980-01-01T00:00:00Z".to_string())
        ),
        format!("Evidence Files: {}", options.evidence_paths.len()),
    ];
    for path in &evidence_paths {
        lines.push(format!("- {path}"));
    }

    let content_stream = build_text_stream(&lines);
    let objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>".to_string(),
        format!("<< /Length {} >>\nstream\n{content_stream}\nendstream", content_stream.len()),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    build_pdf(&objects)
}

fn build_text_stream(lines: &[String]) -> String {
    let mut out = String::from("BT\n/F1 10 Tf\n50 760 Td\n");
    for (index, line) in lines.iter().enumerate() {
        if index > 0 {
            out.push_str("0 -14 Td\n");
        }
        out.push('(');
        out.push_str(&escape_pdf_string(line));
        out.push_str(") Tj\n");
    }
    out.push_str("ET");
    out
}

fn escape_pdf_string(value: &str) -> String {
    value.replace('\\', r"\\").replace('(', r"\(").replace(')', r"\)")
}

fn build_pdf(objects: &[String]) -> Vec<u8> {
    let mut body = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, object) in objects.iter().enumerate() {
        offsets.push(body.len());
        body.push_str(&format!("{} 0 obj\n{object}\nendobj\n", index + 1));
    }
    let xref_start = body.len();
    body.push_str(&format!("xref\n0 {}\n", objects.len() + 1));
    body.push_str("0000000000 65535 f \n");
    for offset in &offsets {
        body.push_str(&format!("{offset:010} 00000 n \n"));
    }
    body.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_start}\n%%EOF\n",
        objects.len() + 1
    ));
    body.into_bytes()
}
