/// Plain-text extraction log written beside recovered members
use std::fmt::Write as _;
use std::io;
use std::path::PathBuf;

use super::result::RecoveryResult;

/// Render the extraction log for a finished run
pub fn render_extraction_log(result: &RecoveryResult, stem: &str) -> String {
    let mut out = String::new();
    let source = result
        .source
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<buffer>".to_string());

    let _ = writeln!(out, "Extraction Log for: {}", stem);
    let _ = writeln!(out, "Run: {}", result.run_id);
    let _ = writeln!(out, "Processed: {}", source);
    let _ = writeln!(out, "Output: {}", result.output_dir.display());
    let _ = writeln!(out, "{}", "=".repeat(50));
    let _ = writeln!(out);

    for issue in &result.issues {
        match &issue.member {
            Some(member) => {
                let _ = writeln!(out, "{} [{}]", issue, member);
            }
            None => {
                let _ = writeln!(out, "{}", issue);
            }
        }
    }
    for member in result.checksum_mismatches() {
        let _ = writeln!(out, "EXTRACTED_WITH_CHECKSUM_ERROR: {}", member.name);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Summary:");
    let _ = writeln!(
        out,
        "Strategy: {}",
        result
            .strategy
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    let _ = writeln!(out, "Members Extracted: {}", result.statistics.members_extracted);
    let _ = writeln!(out, "Checksum Errors: {}", result.statistics.checksum_errors);
    let _ = writeln!(out, "Checksum Warnings: {}", result.statistics.checksum_warnings);

    out
}

/// Write `<stem>_extraction_log.txt` into the result's output directory
pub fn write_extraction_log(result: &RecoveryResult, stem: &str) -> io::Result<PathBuf> {
    let path = result
        .output_dir
        .join(format!("{}_extraction_log.txt", stem));
    std::fs::write(&path, render_extraction_log(result, stem))?;
    Ok(path)
}
