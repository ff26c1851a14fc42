use crate::types::{DiePitch, SampleCenterLocation};

/// Convert a defect's die-relative position to absolute coordinates.
///
/// The die index scales by the die pitch, the relative offset is added,
/// and the sample center is subtracted so that the result is expressed
/// in the wafer's coordinate system. Die pitch and sample center are
/// wafer-scoped inputs, so the same row converts identically no matter
/// which wafer block it sits in.
pub fn convert_coordinates(
    die_pitch: DiePitch,
    sample_center: SampleCenterLocation,
    x_rel: f64,
    y_rel: f64,
    x_index: i32,
    y_index: i32,
) -> (f64, f64) {
    let x = f64::from(x_index) * die_pitch.x + x_rel - sample_center.x;
    let y = f64::from(y_index) * die_pitch.y + y_rel - sample_center.y;
    (x, y)
}
