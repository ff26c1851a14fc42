use crate::error::KlarfError;

/// Resolved column positions for defect data rows.
///
/// A `DefectRecordSpec` header declares, per file, which fields appear in
/// each defect row and in what order:
///
/// ```text
/// DefectRecordSpec 11 DEFECTID XREL YREL XINDEX YINDEX XSIZE YSIZE DEFECTAREA DSIZE CLASSNUMBER TEST ;
/// ```
///
/// Indices are zero-based positions into a whitespace-split data row.
/// Optional columns that the spec does not declare stay `None`; their
/// defect fields default to 0.
#[derive(Debug, Clone)]
pub struct DefectColumns {
    pub id: usize,
    pub x_rel: usize,
    pub y_rel: usize,
    pub x_index: usize,
    pub y_index: usize,
    pub x_size: usize,
    pub y_size: usize,
    pub area: usize,
    pub d_size: Option<usize>,
    pub class_number: Option<usize>,
    pub test_id: Option<usize>,
    pub cluster_number: Option<usize>,
    pub rough_bin: Option<usize>,
    pub fine_bin: Option<usize>,
    pub image_count: Option<usize>,
    /// Caller-requested extra columns: (declared name, row index).
    pub custom: Vec<(String, usize)>,
}

impl DefectColumns {
    /// Resolve a `DefectRecordSpec` line. Token 0 is the keyword and
    /// token 1 the declared column count; tokens 2.. are the column
    /// names in data-row order.
    pub fn resolve(line: &str, custom_columns: &[String]) -> Result<Self, KlarfError> {
        let trimmed = line.trim().trim_end_matches(';');
        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        let names: &[&str] = if tokens.len() > 2 { &tokens[2..] } else { &[] };

        let find = |name: &str| {
            names
                .iter()
                .position(|tok| tok.eq_ignore_ascii_case(name))
        };
        let require = |name: &'static str| {
            find(name).ok_or_else(|| KlarfError::MissingColumn(name.to_string()))
        };

        let custom = custom_columns
            .iter()
            .filter_map(|name| find(name).map(|idx| (name.clone(), idx)))
            .collect();

        Ok(Self {
            id: require("DEFECTID")?,
            x_rel: require("XREL")?,
            y_rel: require("YREL")?,
            x_index: require("XINDEX")?,
            y_index: require("YINDEX")?,
            x_size: require("XSIZE")?,
            y_size: require("YSIZE")?,
            area: require("DEFECTAREA")?,
            d_size: find("DSIZE"),
            class_number: find("CLASSNUMBER"),
            test_id: find("TEST"),
            cluster_number: find("CLUSTERNUMBER"),
            rough_bin: find("ROUGHBINNUMBER"),
            fine_bin: find("FINEBINNUMBER"),
            image_count: find("IMAGECOUNT"),
            custom,
        })
    }
}
