use thiserror::Error;

use crate::dom::DomError;

/// Coarse classification of an [`EditError`].
///
/// Callers that only need to decide whether a failure is recoverable can match on this instead of
/// the individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Container open/commit/close failures. The session should be discarded.
    Io,
    /// A part is missing, cannot be parsed, cannot be serialized or is structurally invalid.
    Format,
    /// The caller passed a malformed argument.
    Input,
    /// A required row or cell does not exist ([`crate::Access::Required`] only).
    NotFound,
}

#[derive(Debug, Error)]
pub enum EditError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("missing xlsx part: {0}")]
    MissingPart(String),
    #[error("malformed xml in {part}: {source}")]
    Xml {
        part: String,
        #[source]
        source: DomError,
    },
    #[error("invalid xlsx: {0}")]
    Invalid(String),
    #[error(
        "xlsx package part is too large to load safely: {part} is {size} bytes (max {max} bytes)"
    )]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("invalid cell coordinate: {0:?}")]
    InvalidCoordinate(String),
    #[error("invalid relationship id: {0:?}")]
    InvalidRelationshipId(String),
    #[error("invalid cell value: {0}")]
    InvalidValue(String),
    #[error("cell {cell} in {part} anchors a shared formula that other cells still use")]
    SharedFormulaMaster { part: String, cell: String },
    #[error("invalid sheet number: {0}")]
    InvalidSheet(u32),
    #[error("invalid text pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("invalid editor options: {0}")]
    Options(#[from] serde_json::Error),
    #[error("row {row} does not exist in {part}")]
    RowNotFound { part: String, row: u32 },
    #[error("cell {cell} does not exist in {part}")]
    CellNotFound { part: String, cell: String },
}

impl EditError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EditError::Io(_) | EditError::Zip(_) => ErrorKind::Io,
            EditError::MissingPart(_)
            | EditError::Xml { .. }
            | EditError::Invalid(_)
            | EditError::PartTooLarge { .. } => ErrorKind::Format,
            EditError::InvalidCoordinate(_)
            | EditError::InvalidRelationshipId(_)
            | EditError::InvalidValue(_)
            | EditError::SharedFormulaMaster { .. }
            | EditError::InvalidSheet(_)
            | EditError::Pattern(_)
            | EditError::Options(_) => ErrorKind::Input,
            EditError::RowNotFound { .. } | EditError::CellNotFound { .. } => ErrorKind::NotFound,
        }
    }

    pub(crate) fn xml(part: &str, source: DomError) -> Self {
        EditError::Xml {
            part: part.to_string(),
            source,
        }
    }
}
