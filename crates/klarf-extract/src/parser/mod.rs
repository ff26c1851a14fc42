//! The KLARF parse engine.
//!
//! KLARF is a line-oriented, semicolon-terminated record format. Each line
//! opens with a case-insensitive keyword; defect lists, summaries and the
//! sample test plan span multiple lines and close at a trailing `;`. The
//! engine makes a single forward pass: the first non-empty line must declare
//! the file version, after that every line is dispatched by keyword, with
//! unrecognized records skipped for forward compatibility.

pub mod coord;
pub mod schema;
pub mod sections;

pub use coord::convert_coordinates;
pub use schema::DefectColumns;

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::error::KlarfError;
use crate::types::{
    Defect, Defects, DefectStream, DieOrigin, DiePitch, FileHeader, FileVersion,
    InspectionStationId, KlarfContent, SampleCenterLocation, SetupId, Test, Wafer,
};
use crate::ParseOptions;
use sections::{ends_block, num, DefectListSection, SamplePlanSection, SummarySection};

const ACCEPTED_VERSIONS: &[FileVersion] = &[
    FileVersion { major: 1, minor: 1 },
    FileVersion { major: 1, minor: 2 },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    ExpectVersion,
    Scanning,
}

/// Parse an ordered sequence of KLARF text lines.
///
/// This is the core entry point; `parse_str` / `parse_file` are thin
/// wrappers over it. Any format inconsistency aborts the whole parse.
pub fn parse_lines<'a, I>(lines: I, opts: &ParseOptions) -> Result<KlarfContent, KlarfError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut state = ParserState::ExpectVersion;
    let mut ctx = Context::new(opts);

    for (idx, raw) in lines.into_iter().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim_end_matches(['\n', '\r']);

        match state {
            ParserState::ExpectVersion => {
                if line.trim().is_empty() {
                    continue;
                }
                ctx.file_version = Some(parse_version(line, line_no)?);
                state = ParserState::Scanning;
            }
            ParserState::Scanning => ctx.dispatch(line, line_no)?,
        }
    }

    if state == ParserState::ExpectVersion {
        return Err(KlarfError::Format);
    }
    ctx.finish()
}

fn starts_with_keyword(line: &str, keyword: &str) -> bool {
    line.trim_start()
        .get(..keyword.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(keyword))
}

/// Whitespace tokens of the record with the trailing `;` stripped.
fn record_tokens(line: &str) -> Vec<&str> {
    line.trim().trim_end_matches(';').split_whitespace().collect()
}

/// Everything after the keyword, trimmed, trailing `;` stripped. Used for
/// free-text values like timestamps.
fn record_value<'a>(line: &'a str, keyword: &str) -> &'a str {
    line.trim_start()[keyword.len()..]
        .trim()
        .trim_end_matches(';')
        .trim_end()
}

/// The value between the first pair of double quotes.
fn quoted(line: &str, line_no: usize) -> Result<&str, KlarfError> {
    line.split('"').nth(1).ok_or_else(|| KlarfError::MalformedRow {
        line: line_no,
        reason: "expected a double-quoted value".to_string(),
    })
}

fn parse_version(line: &str, line_no: usize) -> Result<FileVersion, KlarfError> {
    if !starts_with_keyword(line, "FileVersion") {
        return Err(KlarfError::Format);
    }
    let tokens = record_tokens(line);
    let (major, minor) = match (tokens.get(1), tokens.get(2)) {
        (Some(major), Some(minor)) => (
            num(major, "version major", line_no)?,
            num(minor, "version minor", line_no)?,
        ),
        _ => {
            return Err(KlarfError::MalformedRow {
                line: line_no,
                reason: "FileVersion needs major and minor components".to_string(),
            })
        }
    };
    let version = FileVersion { major, minor };
    if !ACCEPTED_VERSIONS.contains(&version) {
        return Err(KlarfError::IncompatibleVersion {
            found: version.to_string(),
        });
    }
    Ok(version)
}

/// All in-progress parse state, threaded through the line handlers.
struct Context<'o> {
    opts: &'o ParseOptions,

    // File-scoped scalars
    file_version: Option<FileVersion>,
    file_timestamp: Option<String>,
    inspection_station_id: Option<InspectionStationId>,
    sample_type: Option<String>,
    result_timestamp: Option<String>,
    lot_id: Option<String>,
    device_id: Option<String>,
    sample_size: Option<i32>,
    setup_id: SetupId,
    step_id: Option<String>,
    sample_orientation_mark_type: Option<String>,
    orientation_mark_location: Option<String>,
    die_pitch: Option<DiePitch>,
    has_sample_test_plan: bool,

    // Wafer-scoped scalars
    die_origin: Option<DieOrigin>,
    sample_center_location: Option<SampleCenterLocation>,
    wafer_id: Option<String>,
    slot: Option<i32>,
    inspection_test: Option<i32>,
    tests: Vec<Test>,
    custom_wafer: HashMap<String, String>,
    columns: Option<DefectColumns>,

    wafers: Vec<Wafer>,
    defect_section: DefectListSection,
    summary_section: SummarySection,
    plan_section: SamplePlanSection,
}

impl<'o> Context<'o> {
    fn new(opts: &'o ParseOptions) -> Self {
        Self {
            opts,
            file_version: None,
            file_timestamp: None,
            inspection_station_id: None,
            sample_type: None,
            result_timestamp: None,
            lot_id: None,
            device_id: None,
            sample_size: None,
            setup_id: SetupId::no_setup(),
            step_id: None,
            sample_orientation_mark_type: None,
            orientation_mark_location: None,
            die_pitch: None,
            has_sample_test_plan: false,
            die_origin: None,
            sample_center_location: None,
            wafer_id: None,
            slot: None,
            inspection_test: None,
            tests: Vec::new(),
            custom_wafer: HashMap::new(),
            columns: None,
            wafers: Vec::new(),
            defect_section: DefectListSection::default(),
            summary_section: SummarySection::default(),
            plan_section: SamplePlanSection::default(),
        }
    }

    fn dispatch(&mut self, line: &str, line_no: usize) -> Result<(), KlarfError> {
        // An open multi-line block consumes the line before any keyword match.
        if self.defect_section.is_active() {
            return self.feed_defect_section(line, line_no);
        }
        if self.summary_section.is_active() {
            if let Some(summary) = self.summary_section.feed(line, line_no)? {
                let wafer = self.wafers.last_mut().ok_or_else(|| KlarfError::MalformedRow {
                    line: line_no,
                    reason: "summary before any completed wafer".to_string(),
                })?;
                wafer.summary = Some(summary);
            }
            return Ok(());
        }
        if self.plan_section.is_active() {
            return self.plan_section.feed(line, line_no);
        }

        // Caller-declared wafer columns win over the fixed table.
        let opts = self.opts;
        for name in &opts.custom_columns_wafer {
            if starts_with_keyword(line, name) {
                let tokens = record_tokens(line);
                let value = tokens.get(1).ok_or_else(|| KlarfError::MalformedRow {
                    line: line_no,
                    reason: format!("custom column {name} has no value"),
                })?;
                self.custom_wafer.insert(name.clone(), value.to_string());
                return Ok(());
            }
        }

        if starts_with_keyword(line, "FileVersion") {
            // A repeated version record is re-validated like the first.
            self.file_version = Some(parse_version(line, line_no)?);
        } else if starts_with_keyword(line, "FileTimestamp") {
            self.file_timestamp = Some(record_value(line, "FileTimestamp").to_string());
        } else if starts_with_keyword(line, "InspectionStationID") {
            let data = line.split(';').next().unwrap_or("");
            let tokens: Vec<&str> = data.split_whitespace().collect();
            if tokens.len() < 4 {
                return Err(KlarfError::MalformedRow {
                    line: line_no,
                    reason: "InspectionStationID needs mfg, model and id".to_string(),
                });
            }
            self.inspection_station_id = Some(InspectionStationId {
                mfg: tokens[1].trim_matches('"').to_string(),
                model: tokens[2].trim_matches('"').to_string(),
                id: tokens[3].trim_matches('"').to_string(),
            });
        } else if starts_with_keyword(line, "SampleType") {
            self.sample_type = record_tokens(line).get(1).map(|t| t.to_string());
        } else if starts_with_keyword(line, "ResultTimestamp") {
            self.result_timestamp = Some(record_value(line, "ResultTimestamp").to_string());
        } else if starts_with_keyword(line, "LotID") {
            self.lot_id = Some(quoted(line, line_no)?.to_string());
        } else if starts_with_keyword(line, "SampleSize") {
            let tokens = record_tokens(line);
            let raw = tokens.get(2).ok_or_else(|| KlarfError::MalformedRow {
                line: line_no,
                reason: "SampleSize needs a sub-type and a size".to_string(),
            })?;
            self.sample_size = Some(num(raw, "sample size", line_no)?);
        } else if starts_with_keyword(line, "DeviceID") {
            self.device_id = Some(quoted(line, line_no)?.to_string());
        } else if starts_with_keyword(line, "SetupID") {
            let trimmed = line.trim_end().trim_end_matches(';');
            let mut parts = trimmed.split('"');
            let name = parts.nth(1).ok_or_else(|| KlarfError::MalformedRow {
                line: line_no,
                reason: "SetupID needs a quoted name".to_string(),
            })?;
            let date = parts.next().unwrap_or("");
            self.setup_id = SetupId {
                name: name.trim().to_string(),
                date: date.trim().to_string(),
            };
        } else if starts_with_keyword(line, "StepID") {
            self.step_id = Some(quoted(line, line_no)?.to_string());
        } else if starts_with_keyword(line, "SampleOrientationMarkType") {
            self.sample_orientation_mark_type = record_tokens(line).get(1).map(|t| t.to_string());
        } else if starts_with_keyword(line, "OrientationMarkLocation") {
            self.orientation_mark_location = record_tokens(line).get(1).map(|t| t.to_string());
        } else if starts_with_keyword(line, "DiePitch") {
            let (x, y) = self.xy_pair(line, line_no, "DiePitch")?;
            self.die_pitch = Some(DiePitch { x, y });
        } else if starts_with_keyword(line, "DieOrigin") {
            let (x, y) = self.xy_pair(line, line_no, "DieOrigin")?;
            self.die_origin = Some(DieOrigin { x, y });
        } else if starts_with_keyword(line, "SampleCenterLocation") {
            let (x, y) = self.xy_pair(line, line_no, "SampleCenterLocation")?;
            self.sample_center_location = Some(SampleCenterLocation { x, y });
        } else if starts_with_keyword(line, "WaferID") {
            self.wafer_id = Some(quoted(line, line_no)?.to_string());
        } else if starts_with_keyword(line, "Slot") {
            let tokens = record_tokens(line);
            let raw = tokens.get(1).ok_or_else(|| KlarfError::MalformedRow {
                line: line_no,
                reason: "Slot needs a slot number".to_string(),
            })?;
            self.slot = Some(num(raw, "slot", line_no)?);
        } else if starts_with_keyword(line, "InspectionTest") {
            let tokens = record_tokens(line);
            let raw = tokens.get(1).ok_or_else(|| KlarfError::MalformedRow {
                line: line_no,
                reason: "InspectionTest needs a test id".to_string(),
            })?;
            self.inspection_test = Some(num(raw, "inspection test", line_no)?);
        } else if starts_with_keyword(line, "AreaPerTest") {
            let tokens = record_tokens(line);
            let raw = tokens.get(1).ok_or_else(|| KlarfError::MalformedRow {
                line: line_no,
                reason: "AreaPerTest needs an area".to_string(),
            })?;
            let area = num(raw, "test area", line_no)?;
            let id = self
                .inspection_test
                .ok_or(KlarfError::MissingField("InspectionTest"))?;
            self.tests.push(Test { id, area });
        } else if starts_with_keyword(line, "DefectRecordSpec") {
            self.columns = Some(DefectColumns::resolve(line, &opts.custom_columns_defect)?);
        } else if starts_with_keyword(line, "DefectList") {
            if ends_block(line) {
                // Single-line empty list; the wafer still closes out.
                self.close_wafer(Vec::new())?;
            } else {
                self.defect_section.begin();
            }
        } else if starts_with_keyword(line, "SummaryList") {
            if opts.parse_summary && !ends_block(line) {
                self.summary_section.begin();
            }
        } else if starts_with_keyword(line, "SampleTestPlan") {
            if !self.plan_section.is_done() {
                self.plan_section.begin();
                self.has_sample_test_plan = true;
                self.plan_section.feed(line, line_no)?;
            }
        } else {
            log::debug!(
                "line {line_no}: skipping unrecognized record {:?}",
                line.split_whitespace().next().unwrap_or("")
            );
        }

        Ok(())
    }

    fn feed_defect_section(&mut self, line: &str, line_no: usize) -> Result<(), KlarfError> {
        let columns = self
            .columns
            .as_ref()
            .ok_or(KlarfError::MissingField("DefectRecordSpec"))?;
        let die_pitch = self.die_pitch.ok_or(KlarfError::MissingField("DiePitch"))?;
        let sample_center = self
            .sample_center_location
            .ok_or(KlarfError::MissingField("SampleCenterLocation"))?;

        if let Some(defects) =
            self.defect_section
                .feed(line, line_no, columns, die_pitch, sample_center)?
        {
            self.close_wafer(defects)?;
        }
        Ok(())
    }

    fn xy_pair(&self, line: &str, line_no: usize, what: &str) -> Result<(f64, f64), KlarfError> {
        let tokens = record_tokens(line);
        match (tokens.get(1), tokens.get(2)) {
            (Some(x), Some(y)) => Ok((num(x, what, line_no)?, num(y, what, line_no)?)),
            _ => Err(KlarfError::MalformedRow {
                line: line_no,
                reason: format!("{what} needs x and y values"),
            }),
        }
    }

    /// A completed defect list ends the in-progress wafer: attach the
    /// defects, the tests seen since the previous wafer, and a snapshot of
    /// the custom wafer attributes.
    fn close_wafer(&mut self, defects: Vec<Defect>) -> Result<(), KlarfError> {
        let id = self
            .wafer_id
            .clone()
            .ok_or(KlarfError::MissingField("WaferID"))?;
        let slot = self.slot.ok_or(KlarfError::MissingField("Slot"))?;
        let die_origin = self.die_origin.ok_or(KlarfError::MissingField("DieOrigin"))?;
        let sample_center_location = self
            .sample_center_location
            .ok_or(KlarfError::MissingField("SampleCenterLocation"))?;

        let defects = if self.opts.defects_as_stream {
            Defects::Stream(DefectStream::new(defects))
        } else {
            Defects::Materialized(defects)
        };

        self.wafers.push(Wafer {
            id,
            slot,
            die_origin,
            sample_center_location,
            defects,
            tests: std::mem::take(&mut self.tests),
            custom_attribute: self.custom_wafer.clone(),
            summary: None,
        });
        Ok(())
    }

    fn finish(mut self) -> Result<KlarfContent, KlarfError> {
        fn require<T>(opt: Option<T>, name: &'static str) -> Result<T, KlarfError> {
            opt.ok_or(KlarfError::MissingField(name))
        }

        let header = FileHeader {
            file_version: require(self.file_version, "FileVersion")?,
            file_timestamp: require(self.file_timestamp, "FileTimestamp")?,
            inspection_station_id: require(self.inspection_station_id, "InspectionStationID")?,
            sample_type: self.sample_type,
            result_timestamp: require(self.result_timestamp, "ResultTimestamp")?,
            lot_id: require(self.lot_id, "LotID")?,
            device_id: self.device_id,
            sample_size: require(self.sample_size, "SampleSize")?,
            setup_id: self.setup_id,
            step_id: require(self.step_id, "StepID")?,
            sample_orientation_mark_type: require(
                self.sample_orientation_mark_type,
                "SampleOrientationMarkType",
            )?,
            orientation_mark_location: require(
                self.orientation_mark_location,
                "OrientationMarkLocation",
            )?,
            die_pitch: require(self.die_pitch, "DiePitch")?,
            has_sample_test_plan: self.has_sample_test_plan,
            sample_plan_test: self.plan_section.take_plan(),
        };

        // Repeated wafer ids keep the last record seen but the order of
        // their first occurrence.
        let mut by_id: IndexMap<String, Wafer> = IndexMap::with_capacity(self.wafers.len());
        for wafer in self.wafers {
            by_id.insert(wafer.id.clone(), wafer);
        }

        Ok(KlarfContent {
            header,
            wafers: by_id.into_values().collect(),
        })
    }
}
