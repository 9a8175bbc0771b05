//! Typed access to `<sheetData>`: rows, cells and the worksheet's hyperlink table.
//!
//! Everything here operates on an already materialized worksheet tree; [`crate::XlsxEditor`]
//! resolves the part, marks it dirty and turns the raw nodes into [`Row`] / [`Cell`] snapshots.

pub mod cells;
pub mod rows;

pub use cells::{Cell, CellKind};
pub use rows::{Row, Rows};

use crate::dom::XmlElement;
use crate::EditError;

/// What a row or cell lookup does when the target does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    /// Absent targets resolve to `None`.
    #[default]
    Existing,
    /// Absent targets are a [`crate::ErrorKind::NotFound`] error.
    Required,
    /// Absent targets are created in document order.
    Create,
}

pub(crate) fn sheet_data_index(worksheet: &XmlElement, part: &str) -> Result<usize, EditError> {
    worksheet
        .position("sheetData")
        .ok_or_else(|| EditError::Invalid(format!("{part} has no <sheetData>")))
}

pub(crate) fn sheet_data<'a>(
    worksheet: &'a XmlElement,
    part: &str,
) -> Result<&'a XmlElement, EditError> {
    worksheet
        .child("sheetData")
        .ok_or_else(|| EditError::Invalid(format!("{part} has no <sheetData>")))
}

pub(crate) fn sheet_data_mut<'a>(
    worksheet: &'a mut XmlElement,
    part: &str,
) -> Result<&'a mut XmlElement, EditError> {
    worksheet
        .child_mut("sheetData")
        .ok_or_else(|| EditError::Invalid(format!("{part} has no <sheetData>")))
}

/// Relationship id of the `<hyperlink>` anchored exactly at `coordinate`.
pub(crate) fn hyperlink_rel_id<'a>(worksheet: &'a XmlElement, coordinate: &str) -> Option<&'a str> {
    worksheet
        .child("hyperlinks")?
        .elements_named("hyperlink")
        .find(|link| {
            link.attr("ref")
                .is_some_and(|r| r.eq_ignore_ascii_case(coordinate))
        })?
        .attr_local("id")
}
