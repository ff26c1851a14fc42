use crate::error::KlarfError;
use crate::types::{KlarfContent, SingleKlarfContent};

/// Narrow a parsed document to exactly one wafer, selected by position.
///
/// Consumes the content and moves the wafer out; a wafer in stream mode
/// holds a one-shot defect sequence that cannot be cloned.
pub fn into_single_klarf_content(
    content: KlarfContent,
    wafer_index: usize,
) -> Result<SingleKlarfContent, KlarfError> {
    let count = content.number_of_wafers();
    if wafer_index >= count {
        return Err(KlarfError::WaferIndex {
            index: wafer_index,
            count,
        });
    }

    let KlarfContent { header, mut wafers } = content;
    let wafer = wafers.swap_remove(wafer_index);
    Ok(SingleKlarfContent { header, wafer })
}
