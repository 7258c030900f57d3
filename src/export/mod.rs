//! File exports of the movement history.
//!
//! Every format carries the same five columns in the same row order, so a
//! report downloaded as CSV and as a workbook line up cell for cell.

use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;

use crate::errors::ServiceError;

pub mod csv;
pub mod json;
pub mod pdf;
pub mod xlsx;

pub const HEADERS: [&str; 5] = ["Date", "Product", "User", "Previous State", "New State"];
pub const REPORT_TITLE: &str = "Movement Report";
const FILE_STEM: &str = "movement_report";

/// One exported movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementRow {
    pub date: String,
    pub product: String,
    pub user: String,
    pub previous_state: String,
    pub new_state: String,
}

impl MovementRow {
    pub fn cells(&self) -> [&str; 5] {
        [
            &self.date,
            &self.product,
            &self.user,
            &self.previous_state,
            &self.new_state,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExportFormat {
    Excel,
    Json,
    Csv,
    Pdf,
}

impl ExportFormat {
    pub fn parse(segment: &str) -> Option<Self> {
        Self::from_str(segment).ok()
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Excel => "xlsx",
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Pdf => "pdf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Excel => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Json => "application/json",
            Self::Csv => "text/csv; charset=utf-8",
            Self::Pdf => "application/pdf",
        }
    }

    pub fn filename(self) -> String {
        format!("{}.{}", FILE_STEM, self.extension())
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Workbook error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("PDF error: {0}")]
    Pdf(String),
}

impl From<ExportError> for ServiceError {
    fn from(err: ExportError) -> Self {
        ServiceError::ExportError(err.to_string())
    }
}

/// Serializes `rows` in the given format.
pub fn render(format: ExportFormat, rows: &[MovementRow]) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Excel => xlsx::render(rows),
        ExportFormat::Json => json::render(rows),
        ExportFormat::Csv => csv::render(rows),
        ExportFormat::Pdf => pdf::render(rows),
    }
}

#[cfg(test)]
pub(crate) fn sample_rows(count: usize) -> Vec<MovementRow> {
    (0..count)
        .map(|i| MovementRow {
            date: format!("2024-03-{:02} 10:00", 28 - (i % 28)),
            product: format!("Product {}", i),
            user: "ana".to_string(),
            previous_state: "Available".to_string(),
            new_state: "Loaned".to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("excel", Some(ExportFormat::Excel))]
    #[case("PDF", Some(ExportFormat::Pdf))]
    #[case("Json", Some(ExportFormat::Json))]
    #[case("csv", Some(ExportFormat::Csv))]
    #[case("xml", None)]
    #[case("", None)]
    fn format_parsing(#[case] raw: &str, #[case] expected: Option<ExportFormat>) {
        assert_eq!(ExportFormat::parse(raw), expected);
    }

    #[test]
    fn filenames_follow_extension() {
        assert_eq!(ExportFormat::Excel.filename(), "movement_report.xlsx");
        assert_eq!(ExportFormat::Pdf.filename(), "movement_report.pdf");
        assert_eq!(ExportFormat::Csv.to_string(), "csv");
    }

    #[test]
    fn every_format_renders_empty_history() {
        for format in [
            ExportFormat::Excel,
            ExportFormat::Json,
            ExportFormat::Csv,
            ExportFormat::Pdf,
        ] {
            let bytes = render(format, &[]).unwrap();
            assert!(!bytes.is_empty(), "{} output should not be empty", format);
        }
    }
}
