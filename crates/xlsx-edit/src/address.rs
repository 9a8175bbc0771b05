use core::fmt;
use std::cmp::Ordering;

use serde::Serialize;

use crate::EditError;

/// Validate a user-supplied coordinate and normalize it to uppercase.
///
/// Only ASCII letters and digits are accepted; the letters-then-digits shape is checked by
/// [`CellAddress::parse`] when a cell has to be created.
pub fn normalize_coordinate(coordinate: &str) -> Result<String, EditError> {
    if coordinate.is_empty() || !coordinate.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(EditError::InvalidCoordinate(coordinate.to_string()));
    }
    Ok(coordinate.to_ascii_uppercase())
}

/// A parsed A1-style cell coordinate (`B4`, `AA23`). Rows are 1-based.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct CellAddress {
    column: String,
    row: u32,
}

impl CellAddress {
    pub fn parse(coordinate: &str) -> Result<Self, EditError> {
        let invalid = || EditError::InvalidCoordinate(coordinate.to_string());

        let normalized = normalize_coordinate(coordinate)?;
        let split = normalized
            .bytes()
            .position(|b| b.is_ascii_digit())
            .ok_or_else(invalid)?;
        let (column, digits) = normalized.split_at(split);
        if column.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let row: u32 = digits.parse().map_err(|_| invalid())?;
        if row == 0 {
            return Err(invalid());
        }

        Ok(Self {
            column: column.to_string(),
            row,
        })
    }

    /// Column letters, uppercase.
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn row(&self) -> u32 {
        self.row
    }

    /// 0-based column index (`A` = 0, `AA` = 26).
    pub fn column_index(&self) -> u32 {
        column_letters_to_index(&self.column)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column, self.row)
    }
}

/// Row number of a coordinate: every non-digit character is dropped.
///
/// Returns `0` when no digits remain (or the number does not fit), which callers treat as a
/// malformed coordinate.
pub(crate) fn row_number_of(coordinate: &str) -> u32 {
    let digits: String = coordinate.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// Column letters of a coordinate (everything that is not a digit), uppercased.
pub(crate) fn column_letters_of(coordinate: &str) -> String {
    coordinate
        .chars()
        .filter(|c| !c.is_ascii_digit())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn column_letters_to_index(letters: &str) -> u32 {
    letters
        .bytes()
        .fold(0u32, |acc, b| {
            acc.saturating_mul(26)
                .saturating_add((b.to_ascii_uppercase() - b'A') as u32 + 1)
        })
        .saturating_sub(1)
}

/// Document order of two cell coordinates.
///
/// Columns compare by letter count first, then alphabetically, then rows numerically, so
/// `B3 < AA3 < AB3` and `B3 < B30`.
pub fn cell_order_compare(a: &str, b: &str) -> Ordering {
    let a_col = column_letters_of(a);
    let b_col = column_letters_of(b);
    a_col
        .len()
        .cmp(&b_col.len())
        .then_with(|| a_col.cmp(&b_col))
        .then_with(|| row_number_of(a).cmp(&row_number_of(b)))
}
