//! Dashboard export formats

use super::Dashboard;
use crate::error::AnalyticsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Json,
    Csv,
    Spreadsheet,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Spreadsheet => "spreadsheet",
        };
        f.write_str(name)
    }
}

impl FromStr for ExportFormat {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "spreadsheet" | "excel" | "xlsx" => Ok(ExportFormat::Spreadsheet),
            other => Err(AnalyticsError::UnsupportedFormat(other.to_string())),
        }
    }
}

const CSV_HEADER: &str = "Location,Region,Quality Score,Accuracy,Source Count,Last Updated";

pub fn export(dashboard: &Dashboard, format: ExportFormat) -> Result<String, AnalyticsError> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(dashboard)?),
        ExportFormat::Csv => Ok(to_csv(dashboard)),
        // No spreadsheet writer is bundled
        ExportFormat::Spreadsheet => Err(AnalyticsError::UnsupportedFormat(format.to_string())),
    }
}

fn to_csv(dashboard: &Dashboard) -> String {
    let mut lines = vec![CSV_HEADER.to_string()];
    for row in &dashboard.locations {
        let fields = [
            csv_field(&row.location_name),
            csv_field(&row.region),
            row.quality_score.to_string(),
            row.accuracy_m.to_string(),
            row.source_count.to_string(),
            row.last_updated.to_rfc3339(),
        ];
        lines.push(fields.join(","));
    }
    lines.join("\n")
}

/// Quote a field when it holds a delimiter, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
