//! User-facing text: confirmation prompts and end-of-run summaries.

use dir_ingest::admin::DeletionReport;
use dir_ingest::ingest::IngestReport;
use std::io::{self, BufRead, Write};

/// Ask `question` and read one line. Only `yes` or `y` (any case) confirm.
pub fn confirm<R: BufRead, W: Write>(question: &str, input: &mut R, output: &mut W) -> io::Result<bool> {
    write!(output, "{question} (yes/y/no/n): ")?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "yes" | "y"))
}

pub fn write_ingest_summary<W: Write>(report: &IngestReport, out: &mut W) -> io::Result<()> {
    let summary = report.summary();
    writeln!(out, "Ingestion summary")?;
    if report.collection_ids.is_empty() {
        writeln!(out, "  collections:        (default)")?;
    } else {
        let ids: Vec<String> = report.collection_ids.iter().map(|id| id.to_string()).collect();
        writeln!(out, "  collections:        {}", ids.join(", "))?;
    }
    writeln!(out, "  ingested:           {}", summary.ingested)?;
    writeln!(out, "  skipped duplicates: {}", summary.skipped)?;
    writeln!(out, "  extraction failed:  {}", summary.extraction_failed)?;
    writeln!(out, "  failed:             {}", summary.failed)?;
    if report.cancelled {
        writeln!(out, "  run cancelled before all files were processed")?;
    }

    let mut failures = report.failures().peekable();
    if failures.peek().is_some() {
        writeln!(out, "Failures:")?;
        for (path, stage, reason) in failures {
            writeln!(out, "  {} [{stage}]: {reason}", path.display())?;
        }
    }
    Ok(())
}

pub fn write_deletion_summary<W: Write>(what: &str, report: &DeletionReport, out: &mut W) -> io::Result<()> {
    if report.deleted.is_empty() && report.failed.is_empty() {
        writeln!(out, "No {what} found to delete.")?;
        return Ok(());
    }
    writeln!(out, "Deleted {} {what}.", report.deleted.len())?;
    if !report.failed.is_empty() {
        writeln!(out, "Could not delete {} {what}:", report.failed.len())?;
        for (id, reason) in &report.failed {
            writeln!(out, "  {id}: {reason}")?;
        }
    }
    Ok(())
}
