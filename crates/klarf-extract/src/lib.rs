pub mod convert;
pub mod error;
pub mod parser;
pub mod types;

use std::path::Path;

pub use convert::into_single_klarf_content;
pub use error::KlarfError;
pub use types::{KlarfContent, SingleKlarfContent};

/// Caller-facing parse configuration.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Wafer-level record keywords to capture into `Wafer::custom_attribute`.
    pub custom_columns_wafer: Vec<String>,
    /// Extra DefectRecordSpec columns to capture into `Defect::custom_attribute`.
    pub custom_columns_defect: Vec<String>,
    /// Parse SummaryList sections (on by default).
    pub parse_summary: bool,
    /// Expose each wafer's defects as a one-shot stream instead of a list.
    pub defects_as_stream: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            custom_columns_wafer: Vec::new(),
            custom_columns_defect: Vec::new(),
            parse_summary: true,
            defects_as_stream: false,
        }
    }
}

/// Parse a sequence of KLARF text lines.
pub fn parse_lines<'a, I>(lines: I, opts: &ParseOptions) -> Result<KlarfContent, KlarfError>
where
    I: IntoIterator<Item = &'a str>,
{
    parser::parse_lines(lines, opts)
}

/// Parse KLARF document text.
pub fn parse_str(content: &str, opts: &ParseOptions) -> Result<KlarfContent, KlarfError> {
    parser::parse_lines(content.lines(), opts)
}

/// Read and parse a KLARF file.
pub fn parse_file(path: &Path, opts: &ParseOptions) -> Result<KlarfContent, KlarfError> {
    let content = std::fs::read_to_string(path)?;
    parse_str(&content, opts)
}

/// Read and parse a KLARF file, also returning the verbatim line sequence
/// for callers that need round-trip access to the raw text.
pub fn parse_file_with_raw(
    path: &Path,
    opts: &ParseOptions,
) -> Result<(KlarfContent, Vec<String>), KlarfError> {
    let content = std::fs::read_to_string(path)?;
    let raw: Vec<String> = content.lines().map(str::to_string).collect();
    let parsed = parser::parse_lines(raw.iter().map(String::as_str), opts)?;
    Ok((parsed, raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"FileVersion 1 1;
FileTimestamp 12-03-22 08:21:32;
InspectionStationID "KLA" "2367" "S01";
ResultTimestamp 12-03-22 09:02:11;
LotID "LOT1";
SampleSize 1 300;
StepID "S1";
SampleOrientationMarkType NOTCH;
OrientationMarkLocation DOWN;
DiePitch 1000.0 1000.0;
DieOrigin 0.0 0.0;
WaferID "W01";
Slot 1;
SampleCenterLocation 500.0 500.0;
DefectRecordSpec 8 DEFECTID XREL YREL XINDEX YINDEX XSIZE YSIZE DEFECTAREA ;
DefectList;"#;

    #[test]
    fn test_parse_file_with_raw_returns_lines() {
        let path = std::env::temp_dir().join(format!("klarf-extract-{}.001", std::process::id()));
        std::fs::write(&path, DOC).unwrap();

        let (content, raw) = parse_file_with_raw(&path, &ParseOptions::default()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(content.number_of_wafers(), 1);
        let expected: Vec<String> = DOC.lines().map(str::to_string).collect();
        assert_eq!(raw, expected);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = parse_file(
            std::path::Path::new("/nonexistent/file.001"),
            &ParseOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, KlarfError::Io(_)));
    }
}
