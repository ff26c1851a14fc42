//! Accumulators for the three multi-line KLARF sections.
//!
//! Each section opens with its keyword line, collects indented data rows,
//! and closes at the line carrying the trailing `;` terminator.

use std::collections::HashMap;

use crate::error::KlarfError;
use crate::parser::coord::convert_coordinates;
use crate::parser::schema::DefectColumns;
use crate::types::{Defect, DiePitch, SampleCenterLocation, SamplePlanTest, Summary};

fn is_data_row(line: &str) -> bool {
    line.starts_with(' ') || line.starts_with('\t')
}

/// A line carrying the trailing `;` closes the enclosing block.
pub(crate) fn ends_block(line: &str) -> bool {
    line.trim_end().ends_with(';')
}

pub(crate) fn num<T: std::str::FromStr>(
    tok: &str,
    what: &str,
    line_no: usize,
) -> Result<T, KlarfError> {
    tok.parse().map_err(|_| KlarfError::MalformedRow {
        line: line_no,
        reason: format!("invalid {what} value {tok:?}"),
    })
}

// ─── Defect list ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct DefectListSection {
    active: bool,
    defects: Vec<Defect>,
}

impl DefectListSection {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn begin(&mut self) {
        self.active = true;
        self.defects.clear();
    }

    /// Feed one line while collecting. Returns the finished list when the
    /// block terminator is seen.
    pub fn feed(
        &mut self,
        line: &str,
        line_no: usize,
        columns: &DefectColumns,
        die_pitch: DiePitch,
        sample_center: SampleCenterLocation,
    ) -> Result<Option<Vec<Defect>>, KlarfError> {
        if is_data_row(line) {
            self.defects
                .push(parse_defect_row(line, line_no, columns, die_pitch, sample_center)?);
        }
        if ends_block(line) {
            self.active = false;
            return Ok(Some(std::mem::take(&mut self.defects)));
        }
        Ok(None)
    }
}

fn parse_defect_row(
    line: &str,
    line_no: usize,
    columns: &DefectColumns,
    die_pitch: DiePitch,
    sample_center: SampleCenterLocation,
) -> Result<Defect, KlarfError> {
    let data = line.split(';').next().unwrap_or("");
    let tokens: Vec<&str> = data.split_whitespace().collect();

    let get = |idx: usize| -> Result<&str, KlarfError> {
        tokens.get(idx).copied().ok_or_else(|| KlarfError::MalformedRow {
            line: line_no,
            reason: format!(
                "defect row has {} fields but column {} was requested",
                tokens.len(),
                idx + 1
            ),
        })
    };
    let opt_i32 = |idx: Option<usize>, what: &str| -> Result<i32, KlarfError> {
        match idx {
            Some(i) => num(get(i)?, what, line_no),
            None => Ok(0),
        }
    };
    let opt_f64 = |idx: Option<usize>, what: &str| -> Result<f64, KlarfError> {
        match idx {
            Some(i) => num(get(i)?, what, line_no),
            None => Ok(0.0),
        }
    };

    let x_rel: f64 = num(get(columns.x_rel)?, "XREL", line_no)?;
    let y_rel: f64 = num(get(columns.y_rel)?, "YREL", line_no)?;
    let x_index: i32 = num(get(columns.x_index)?, "XINDEX", line_no)?;
    let y_index: i32 = num(get(columns.y_index)?, "YINDEX", line_no)?;

    let mut custom_attribute = HashMap::new();
    for (name, idx) in &columns.custom {
        custom_attribute.insert(name.clone(), get(*idx)?.to_string());
    }

    Ok(Defect {
        id: num(get(columns.id)?, "DEFECTID", line_no)?,
        x_rel,
        y_rel,
        x_index,
        y_index,
        x_size: num(get(columns.x_size)?, "XSIZE", line_no)?,
        y_size: num(get(columns.y_size)?, "YSIZE", line_no)?,
        area: num(get(columns.area)?, "DEFECTAREA", line_no)?,
        d_size: opt_f64(columns.d_size, "DSIZE")?,
        class_number: opt_i32(columns.class_number, "CLASSNUMBER")?,
        test_id: opt_i32(columns.test_id, "TEST")?,
        cluster_number: opt_i32(columns.cluster_number, "CLUSTERNUMBER")?,
        image_count: opt_i32(columns.image_count, "IMAGECOUNT")?,
        rough_bin: opt_i32(columns.rough_bin, "ROUGHBINNUMBER")?,
        fine_bin: opt_i32(columns.fine_bin, "FINEBINNUMBER")?,
        point: convert_coordinates(die_pitch, sample_center, x_rel, y_rel, x_index, y_index),
        custom_attribute,
    })
}

// ─── Summary ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SummarySection {
    active: bool,
}

impl SummarySection {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn begin(&mut self) {
        self.active = true;
    }

    /// A summary block carries exactly one data row: test number (unused),
    /// defect count, defect density, die count, defective die count.
    /// A non-data line carrying the terminator closes a degenerate block
    /// with no row.
    pub fn feed(&mut self, line: &str, line_no: usize) -> Result<Option<Summary>, KlarfError> {
        if !is_data_row(line) {
            if ends_block(line) {
                self.active = false;
            }
            return Ok(None);
        }
        self.active = false;

        let cleaned = line.replace(';', " ");
        let tokens: Vec<&str> = cleaned.split_whitespace().collect();
        if tokens.len() < 5 {
            return Err(KlarfError::MalformedRow {
                line: line_no,
                reason: format!("summary row has {} fields, expected 5", tokens.len()),
            });
        }

        Ok(Some(Summary::new(
            num(tokens[1], "defect count", line_no)?,
            num(tokens[2], "defect density", line_no)?,
            num(tokens[3], "die count", line_no)?,
            num(tokens[4], "defective die count", line_no)?,
        )))
    }
}

// ─── Sample test plan ────────────────────────────────────────────────

/// File-global sampling plan. Only the first completed block counts;
/// later SampleTestPlan keywords in the same stream are ignored.
#[derive(Debug, Default)]
pub struct SamplePlanSection {
    active: bool,
    done: bool,
    plan: SamplePlanTest,
}

impl SamplePlanSection {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn begin(&mut self) {
        if !self.done {
            self.active = true;
        }
    }

    pub fn feed(&mut self, line: &str, line_no: usize) -> Result<(), KlarfError> {
        if is_data_row(line) {
            let trimmed = line.trim().trim_end_matches(';');
            let tokens: Vec<&str> = trimmed.split_whitespace().collect();
            if tokens.len() < 2 {
                return Err(KlarfError::MalformedRow {
                    line: line_no,
                    reason: "sample test plan row needs an x and y die index".to_string(),
                });
            }
            self.plan.x.push(num(tokens[0], "die x index", line_no)?);
            self.plan.y.push(num(tokens[1], "die y index", line_no)?);
        }
        if ends_block(line) {
            self.active = false;
            self.done = true;
        }
        Ok(())
    }

    pub fn take_plan(&mut self) -> SamplePlanTest {
        std::mem::take(&mut self.plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> DefectColumns {
        DefectColumns::resolve(
            "DefectRecordSpec 8 DEFECTID XREL YREL XINDEX YINDEX XSIZE YSIZE DEFECTAREA ;",
            &[],
        )
        .unwrap()
    }

    const PITCH: DiePitch = DiePitch { x: 1000.0, y: 1000.0 };
    const CENTER: SampleCenterLocation = SampleCenterLocation { x: 500.0, y: 500.0 };

    #[test]
    fn test_defect_rows_until_terminator() {
        let mut section = DefectListSection::default();
        section.begin();

        let cols = columns();
        let r1 = section
            .feed(" 1 10.0 20.0 1 1 2.0 2.0 4.0", 1, &cols, PITCH, CENTER)
            .unwrap();
        assert!(r1.is_none());
        assert!(section.is_active());

        let r2 = section
            .feed(" 2 30.0 40.0 2 2 2.0 2.0 4.0;", 2, &cols, PITCH, CENTER)
            .unwrap();
        let defects = r2.expect("terminator closes the block");
        assert!(!section.is_active());
        assert_eq!(defects.len(), 2);
        assert_eq!(defects[0].id, 1);
        assert_eq!(defects[0].point, (510.0, 520.0));
        assert_eq!(defects[1].point, (1530.0, 1540.0));
        // Absent optional columns default to zero
        assert_eq!(defects[0].rough_bin, 0);
        assert_eq!(defects[0].class_number, 0);
    }

    #[test]
    fn test_defect_row_bad_number() {
        let mut section = DefectListSection::default();
        section.begin();
        let err = section
            .feed(" 1 abc 20.0 1 1 2.0 2.0 4.0;", 7, &columns(), PITCH, CENTER)
            .unwrap_err();
        match err {
            KlarfError::MalformedRow { line, .. } => assert_eq!(line, 7),
            other => panic!("expected MalformedRow, got {other:?}"),
        }
    }

    #[test]
    fn test_defect_row_too_short() {
        let mut section = DefectListSection::default();
        section.begin();
        let err = section
            .feed(" 1 10.0 20.0;", 3, &columns(), PITCH, CENTER)
            .unwrap_err();
        assert!(matches!(err, KlarfError::MalformedRow { line: 3, .. }));
    }

    #[test]
    fn test_summary_row() {
        let mut section = SummarySection::default();
        section.begin();
        // Keyword-ish line without indentation is not a data row
        assert!(section.feed("SummaryList", 1).unwrap().is_none());
        let summary = section.feed(" 1 977 0.5 100 7;", 2).unwrap().expect("one data row");
        assert!(!section.is_active());
        assert_eq!(summary.number_of_defects, 977);
        assert_eq!(summary.number_of_dies, 100);
        assert_eq!(summary.number_of_def_dies, 7);
        assert!((summary.percent_of_def_die - 0.07).abs() < 1e-12);
    }

    #[test]
    fn test_summary_block_without_row_closed_by_terminator() {
        let mut section = SummarySection::default();
        section.begin();
        // A degenerate block with no data row ends at the terminator line
        // instead of staying armed across the rest of the stream.
        assert!(section.feed("EndOfFile;", 2).unwrap().is_none());
        assert!(!section.is_active());
    }

    #[test]
    fn test_sample_plan_first_block_wins() {
        let mut section = SamplePlanSection::default();
        section.begin();
        section.feed("SampleTestPlan 2", 1).unwrap();
        section.feed(" 1 1", 2).unwrap();
        section.feed(" 2 3;", 3).unwrap();
        assert!(section.is_done());

        // A later block must not reopen the accumulator
        section.begin();
        assert!(!section.is_active());

        let plan = section.take_plan();
        assert_eq!(plan.x, vec![1, 2]);
        assert_eq!(plan.y, vec![1, 3]);
    }

    #[test]
    fn test_sample_plan_empty_block() {
        let mut section = SamplePlanSection::default();
        section.begin();
        section.feed("SampleTestPlan 0;", 1).unwrap();
        assert!(!section.is_active());
        assert!(section.is_done());
        assert!(section.take_plan().x.is_empty());
    }
}
