use thiserror::Error;

#[derive(Error, Debug)]
pub enum KlarfError {
    #[error("not a KLARF file: first line must be a FileVersion record")]
    Format,

    #[error("unsupported KLARF file version {found} (accepted: 1.1, 1.2)")]
    IncompatibleVersion { found: String },

    #[error("defect record spec is missing required column {0}")]
    MissingColumn(String),

    #[error("malformed record at line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    #[error("required record {0} was never seen")]
    MissingField(&'static str),

    #[error("wafer index {index} out of range ({count} wafers)")]
    WaferIndex { index: usize, count: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
