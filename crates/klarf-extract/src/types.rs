use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;
use std::collections::HashMap;

// ─── File version ────────────────────────────────────────────────────

/// KLARF file format version, e.g. `FileVersion 1 2;` → 1.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileVersion {
    pub major: u32,
    pub minor: u32,
}

impl std::fmt::Display for FileVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// ─── Header value types ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetupId {
    pub name: String,
    pub date: String,
}

impl SetupId {
    /// Sentinel used when the file carries no SetupID record.
    pub fn no_setup() -> Self {
        Self {
            name: "no_setup".to_string(),
            date: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiePitch {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DieOrigin {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SampleCenterLocation {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectionStationId {
    pub mfg: String,
    pub model: String,
    pub id: String,
}

/// Die coordinates covered by the (file-global) sampling plan, as
/// parallel x/y vectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SamplePlanTest {
    pub x: Vec<i32>,
    pub y: Vec<i32>,
}

// ─── Per-wafer records ───────────────────────────────────────────────

/// One InspectionTest / AreaPerTest pairing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Test {
    pub id: i32,
    pub area: f64,
}

/// A single defect row. `point` is always derived from the relative
/// coordinates and the wafer's die pitch / sample center, never read
/// from the file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Defect {
    pub id: u64,
    pub x_rel: f64,
    pub y_rel: f64,
    pub x_index: i32,
    pub y_index: i32,
    pub x_size: f64,
    pub y_size: f64,
    pub area: f64,
    pub d_size: f64,
    pub class_number: i32,
    pub test_id: i32,
    pub cluster_number: i32,
    pub image_count: i32,
    pub rough_bin: i32,
    pub fine_bin: i32,
    pub point: (f64, f64),
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub custom_attribute: HashMap<String, String>,
}

// ─── Summary ─────────────────────────────────────────────────────────

/// Per-wafer aggregate from the SummaryList section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub defect_density: f64,
    pub number_of_defects: i32,
    pub number_of_dies: i32,
    pub number_of_def_dies: i32,
    pub percent_of_def_die: f64,
}

impl Summary {
    pub fn new(
        number_of_defects: i32,
        defect_density: f64,
        number_of_dies: i32,
        number_of_def_dies: i32,
    ) -> Self {
        let percent_of_def_die = if number_of_dies != 0 {
            f64::from(number_of_def_dies) / f64::from(number_of_dies)
        } else {
            0.0
        };
        Self {
            defect_density,
            number_of_defects,
            number_of_dies,
            number_of_def_dies,
            percent_of_def_die,
        }
    }
}

// ─── Defect list (materialized or streaming) ─────────────────────────

/// Forward-only, one-shot sequence of defects. Once consumed it cannot
/// be restarted.
#[derive(Debug)]
pub struct DefectStream {
    inner: std::vec::IntoIter<Defect>,
}

impl DefectStream {
    pub fn new(defects: Vec<Defect>) -> Self {
        Self {
            inner: defects.into_iter(),
        }
    }
}

impl Iterator for DefectStream {
    type Item = Defect;

    fn next(&mut self) -> Option<Defect> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// A wafer's defects: a concrete list, or a one-shot stream when the
/// caller asked for `defects_as_stream`.
#[derive(Debug)]
pub enum Defects {
    Materialized(Vec<Defect>),
    Stream(DefectStream),
}

impl Defects {
    /// Number of defects, when known without consuming the stream.
    pub fn len(&self) -> Option<usize> {
        match self {
            Defects::Materialized(v) => Some(v.len()),
            Defects::Stream(s) => s.size_hint().1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Slice view for the materialized variant.
    pub fn as_slice(&self) -> Option<&[Defect]> {
        match self {
            Defects::Materialized(v) => Some(v),
            Defects::Stream(_) => None,
        }
    }
}

impl IntoIterator for Defects {
    type Item = Defect;
    type IntoIter = DefectStream;

    fn into_iter(self) -> DefectStream {
        match self {
            Defects::Materialized(v) => DefectStream::new(v),
            Defects::Stream(s) => s,
        }
    }
}

// Streams are one-shot parse artifacts; they serialize as an empty list
// rather than being drained behind the caller's back.
impl Serialize for Defects {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Defects::Materialized(v) => v.serialize(serializer),
            Defects::Stream(_) => serializer.serialize_seq(Some(0))?.end(),
        }
    }
}

// ─── Wafer ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Wafer {
    pub id: String,
    pub slot: i32,
    pub die_origin: DieOrigin,
    pub sample_center_location: SampleCenterLocation,
    pub defects: Defects,
    pub tests: Vec<Test>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub custom_attribute: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
}

// ─── Top-level content ───────────────────────────────────────────────

/// File-scoped scalar records, set once during the parse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileHeader {
    pub file_version: FileVersion,
    pub file_timestamp: String,
    pub inspection_station_id: InspectionStationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_type: Option<String>,
    pub result_timestamp: String,
    pub lot_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub sample_size: i32,
    pub setup_id: SetupId,
    pub step_id: String,
    pub sample_orientation_mark_type: String,
    pub orientation_mark_location: String,
    pub die_pitch: DiePitch,
    pub has_sample_test_plan: bool,
    pub sample_plan_test: SamplePlanTest,
}

/// Fully parsed KLARF document.
#[derive(Debug, Serialize)]
pub struct KlarfContent {
    #[serde(flatten)]
    pub header: FileHeader,
    pub wafers: Vec<Wafer>,
}

impl KlarfContent {
    pub fn number_of_wafers(&self) -> usize {
        self.wafers.len()
    }
}

/// `KlarfContent` narrowed to exactly one wafer.
#[derive(Debug, Serialize)]
pub struct SingleKlarfContent {
    #[serde(flatten)]
    pub header: FileHeader,
    pub wafer: Wafer,
}
