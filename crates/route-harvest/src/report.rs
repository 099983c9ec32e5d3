//! Printing of the final per-source tally

use route_harvest_lib::{PipelineReport, SourceSummary};
use serde::Serialize;
use std::io::{self, Write};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SummaryFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct JsonSummary<'a> {
    sources: &'a [SourceSummary],
    total_coordinates: usize,
    discarded: usize,
    error: Option<String>,
}

/// Write the summary of `report` to `out`
pub fn write_summary<W: Write>(
    out: &mut W,
    report: &PipelineReport,
    format: SummaryFormat,
) -> io::Result<()> {
    let summaries = report.summary();
    match format {
        SummaryFormat::Text => write_text(out, report, &summaries),
        SummaryFormat::Json => {
            let summary = JsonSummary {
                sources: &summaries,
                total_coordinates: report.result.total_coordinates(),
                discarded: report.result.discarded(),
                error: report.error.as_ref().map(ToString::to_string),
            };
            serde_json::to_writer_pretty(&mut *out, &summary)?;
            writeln!(out)
        }
    }
}

fn write_text<W: Write>(
    out: &mut W,
    report: &PipelineReport,
    summaries: &[SourceSummary],
) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Coordinates per route:")?;
    for summary in summaries {
        write!(out, "  {}: {}", summary.key, summary.coordinate_count)?;
        if summary.coordinate_count > 1 {
            write!(out, " ({:.2} km)", summary.total_distance_meters / 1000.0)?;
        }
        writeln!(out)?;
    }
    writeln!(out, "Total: {}", report.result.total_coordinates())?;
    if let Some(error) = &report.error {
        writeln!(out, "Error processing KML files: {error}")?;
    }
    Ok(())
}
