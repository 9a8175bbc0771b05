use std::borrow::Cow;

use serde::Serialize;

use crate::dom::{XmlElement, XmlNode};
use crate::EditError;

/// Snapshot of a `<row>` element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    /// 1-based row number (`r`).
    pub number: u32,
    /// Custom height in points (`ht`).
    pub height: Option<f64>,
    pub hidden: bool,
    /// Coordinates of the row's cells in document order.
    pub cells: Vec<String>,
}

impl Row {
    pub(crate) fn from_element(el: &XmlElement, number: u32) -> Self {
        Self {
            number,
            height: el.attr("ht").and_then(|ht| ht.parse().ok()),
            hidden: matches!(el.attr("hidden"), Some("1" | "true")),
            cells: el
                .elements_named("c")
                .filter_map(|c| c.attr("r").map(str::to_string))
                .collect(),
        }
    }
}

/// `<row>` elements of a `sheetData` with their effective numbers.
///
/// `r` is optional on `<row>`; a row without it follows the previous row (the first row is 1).
/// Yields `(child index, number, element)`.
pub(crate) struct NumberedRows<'a> {
    part: Cow<'a, str>,
    nodes: std::iter::Enumerate<std::slice::Iter<'a, XmlNode>>,
    previous: u32,
}

impl<'a> NumberedRows<'a> {
    pub(crate) fn new(sheet_data: &'a XmlElement, part: impl Into<Cow<'a, str>>) -> Self {
        Self {
            part: part.into(),
            nodes: sheet_data.children.iter().enumerate(),
            previous: 0,
        }
    }
}

impl<'a> Iterator for NumberedRows<'a> {
    type Item = Result<(usize, u32, &'a XmlElement), EditError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (idx, el) = self.nodes.by_ref().find_map(|(idx, node)| {
            node.as_element()
                .filter(|el| el.local_name() == "row")
                .map(|el| (idx, el))
        })?;
        Some(row_number(el, &self.part).map(|declared| {
            let number = declared.unwrap_or_else(|| self.previous.saturating_add(1));
            self.previous = number;
            (idx, number, el)
        }))
    }
}

/// Forward-only iterator over a worksheet's rows in document order.
///
/// Created by [`crate::XlsxEditor::rows`]; it borrows the session, so the sheet cannot change
/// while it is alive.
pub struct Rows<'a> {
    inner: NumberedRows<'a>,
}

impl<'a> Rows<'a> {
    pub(crate) fn new(part: String, sheet_data: &'a XmlElement) -> Self {
        Self {
            inner: NumberedRows::new(sheet_data, part),
        }
    }
}

impl Iterator for Rows<'_> {
    type Item = Result<Row, EditError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|row| row.map(|(_, number, el)| Row::from_element(el, number)))
    }
}

/// Declared row number. `Ok(None)` when `r` is absent; a non-numeric `r` is a format error.
pub(crate) fn row_number(el: &XmlElement, part: &str) -> Result<Option<u32>, EditError> {
    el.attr("r")
        .map(|r| {
            r.trim()
                .parse::<u32>()
                .map_err(|_| EditError::Invalid(format!("invalid row number {r:?} in {part}")))
        })
        .transpose()
}

/// Write `r` on every row that relies on implicit numbering.
///
/// Needed before rows are inserted or removed, since either shifts the implicit numbers of the
/// rows that follow.
fn pin_row_numbers(sheet_data: &mut XmlElement, part: &str) -> Result<(), EditError> {
    let implicit: Vec<(usize, u32)> = NumberedRows::new(sheet_data, part)
        .filter_map(|row| match row {
            Ok((idx, number, el)) if el.attr("r").is_none() => Some(Ok((idx, number))),
            Ok(_) => None,
            Err(err) => Some(Err(err)),
        })
        .collect::<Result<_, _>>()?;
    for (idx, number) in implicit {
        if let Some(el) = sheet_data.children[idx].as_element_mut() {
            el.set_attr("r", number.to_string());
        }
    }
    Ok(())
}

/// Child index (into `sheet_data.children`) of the row numbered `number`.
pub(crate) fn find_row(
    sheet_data: &XmlElement,
    number: u32,
    part: &str,
) -> Result<Option<usize>, EditError> {
    for row in NumberedRows::new(sheet_data, part) {
        let (idx, n, _) = row?;
        if n == number {
            return Ok(Some(idx));
        }
    }
    Ok(None)
}

/// Insert an empty row numbered `number`, keeping rows in ascending order.
///
/// Rows are sparse, so the position comes from the declared numbers: the new row goes right
/// before the first row with a greater number, or last. Returns the new child index.
pub(crate) fn insert_row(
    sheet_data: &mut XmlElement,
    number: u32,
    part: &str,
) -> Result<usize, EditError> {
    pin_row_numbers(sheet_data, part)?;
    let mut index = sheet_data.children.len();
    for row in NumberedRows::new(sheet_data, part) {
        let (idx, n, _) = row?;
        if n > number {
            index = idx;
            break;
        }
    }

    let row = XmlElement::new(sheet_data.qualify("row")).with_attr("r", number.to_string());
    sheet_data.insert_element(index, row);
    Ok(index)
}

/// Find the row, creating it in order when missing. Returns its child index.
pub(crate) fn ensure_row(
    sheet_data: &mut XmlElement,
    number: u32,
    part: &str,
) -> Result<usize, EditError> {
    match find_row(sheet_data, number, part)? {
        Some(idx) => Ok(idx),
        None => insert_row(sheet_data, number, part),
    }
}

/// Remove the row numbered `number`. Remaining rows keep their order.
pub(crate) fn remove_row(
    sheet_data: &mut XmlElement,
    number: u32,
    part: &str,
) -> Result<bool, EditError> {
    match find_row(sheet_data, number, part)? {
        Some(idx) => {
            pin_row_numbers(sheet_data, part)?;
            sheet_data.children.remove(idx);
            Ok(true)
        }
        None => Ok(false),
    }
}

pub(crate) fn first_row<'a>(
    sheet_data: &'a XmlElement,
    part: &'a str,
) -> Result<Option<(u32, &'a XmlElement)>, EditError> {
    NumberedRows::new(sheet_data, part)
        .next()
        .transpose()
        .map(|row| row.map(|(_, number, el)| (number, el)))
}

pub(crate) fn last_row<'a>(
    sheet_data: &'a XmlElement,
    part: &'a str,
) -> Result<Option<(u32, &'a XmlElement)>, EditError> {
    let mut last = None;
    for row in NumberedRows::new(sheet_data, part) {
        let (_, number, el) = row?;
        last = Some((number, el));
    }
    Ok(last)
}
