use std::cmp::Ordering;

use serde::Serialize;

use crate::address::cell_order_compare;
use crate::dom::XmlElement;
use crate::shared_strings::{self, rich_text};
use crate::EditError;

/// Declared cell type (`t` attribute).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CellKind {
    /// `n`, or no `t` attribute.
    Number,
    /// `s`: `<v>` is an index into the shared string table.
    SharedString,
    /// `inlineStr`: text lives in `<is>`.
    InlineString,
    /// `str`: cached string result of a formula.
    FormulaString,
    Boolean,
    Error,
    Date,
    Other(String),
}

impl CellKind {
    fn from_attr(t: Option<&str>) -> Self {
        match t {
            None | Some("n") => CellKind::Number,
            Some("s") => CellKind::SharedString,
            Some("inlineStr") => CellKind::InlineString,
            Some("str") => CellKind::FormulaString,
            Some("b") => CellKind::Boolean,
            Some("e") => CellKind::Error,
            Some("d") => CellKind::Date,
            Some(other) => CellKind::Other(other.to_string()),
        }
    }
}

/// Snapshot of a `<c>` element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    /// Coordinate as declared by `r`.
    pub reference: String,
    pub kind: CellKind,
    /// Cell format index (`s`).
    pub style: Option<u32>,
    /// Formula with a leading `=`.
    pub formula: Option<String>,
    /// Raw `<v>` text, or the text of an inline string.
    pub value: Option<String>,
}

impl Cell {
    pub(crate) fn from_element(el: &XmlElement, part: &str) -> Result<Self, EditError> {
        let reference = el
            .attr("r")
            .ok_or_else(|| EditError::Invalid(format!("<c> without r attribute in {part}")))?
            .to_string();
        let style = el
            .attr("s")
            .map(|s| {
                s.parse::<u32>().map_err(|_| {
                    EditError::Invalid(format!("invalid style index {s:?} on {reference} in {part}"))
                })
            })
            .transpose()?;
        let kind = CellKind::from_attr(el.attr("t"));
        let value = match kind {
            CellKind::InlineString => inline_text(el),
            _ => raw_value(el),
        };
        Ok(Self {
            reference,
            kind,
            style,
            formula: formula(el),
            value,
        })
    }
}

/// Position of a cell: child index of its row in `<sheetData>`, then of the cell in the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CellSlot {
    pub(crate) row: usize,
    pub(crate) cell: usize,
}

/// Locate the cell whose `r` equals `coordinate` in any row.
pub(crate) fn find_cell(sheet_data: &XmlElement, coordinate: &str) -> Option<CellSlot> {
    sheet_data
        .children
        .iter()
        .enumerate()
        .filter_map(|(idx, node)| node.as_element().map(|el| (idx, el)))
        .filter(|(_, el)| el.local_name() == "row")
        .find_map(|(row, el)| {
            el.children
                .iter()
                .position(|node| {
                    node.as_element().is_some_and(|c| {
                        c.local_name() == "c"
                            && c.attr("r")
                                .is_some_and(|r| r.eq_ignore_ascii_case(coordinate))
                    })
                })
                .map(|cell| CellSlot { row, cell })
        })
}

/// Insert an empty cell into `row`, before the first cell that sorts after `coordinate`.
/// Returns the new child index.
pub(crate) fn insert_cell(row: &mut XmlElement, coordinate: &str) -> usize {
    let index = row
        .children
        .iter()
        .position(|node| {
            node.as_element().is_some_and(|c| {
                c.local_name() == "c"
                    && c.attr("r")
                        .is_some_and(|r| cell_order_compare(r, coordinate) == Ordering::Greater)
            })
        })
        .unwrap_or(row.children.len());

    let cell = XmlElement::new(row.qualify("c")).with_attr("r", coordinate);
    row.insert_element(index, cell);
    index
}

pub(crate) fn element_at(parent: &XmlElement, idx: usize) -> Option<&XmlElement> {
    parent.children.get(idx).and_then(|node| node.as_element())
}

pub(crate) fn element_at_mut(parent: &mut XmlElement, idx: usize) -> Option<&mut XmlElement> {
    parent
        .children
        .get_mut(idx)
        .and_then(|node| node.as_element_mut())
}

/// Formula text with a leading `=`.
///
/// Dependents of a shared formula (`<f t="shared" si=".."/>`) carry no text of their own and
/// read as `None`; their formula is the master's, shifted to their position.
pub(crate) fn formula(cell: &XmlElement) -> Option<String> {
    let text = cell.child("f")?.text();
    if text.is_empty() {
        return None;
    }
    Some(format!("={text}"))
}

pub(crate) fn raw_value(cell: &XmlElement) -> Option<String> {
    cell.child("v").map(XmlElement::text)
}

pub(crate) fn inline_text(cell: &XmlElement) -> Option<String> {
    cell.child("is").map(rich_text)
}

pub(crate) fn kind(cell: &XmlElement) -> CellKind {
    CellKind::from_attr(cell.attr("t"))
}

/// Text of a cell regardless of how it is stored: shared-string cells go through `sst`, inline
/// strings through `<is>`, everything else is the literal `<v>`.
pub(crate) fn string_value(cell: &XmlElement, sst: Option<&XmlElement>) -> Option<String> {
    match kind(cell) {
        CellKind::SharedString => {
            let index = raw_value(cell)?.trim().parse::<usize>().ok()?;
            shared_strings::resolve(sst?, index)
        }
        CellKind::InlineString => inline_text(cell),
        _ => raw_value(cell),
    }
}

/// Write formula text, keeping `t` and `s`. A leading `=` is accepted and not stored.
pub(crate) fn set_formula(cell: &mut XmlElement, formula: &str, clear_cached_value: bool) {
    let text = formula.strip_prefix('=').unwrap_or(formula);
    match cell.child_mut("f") {
        Some(f) => {
            // A shared-formula child only points at its master; once it has its own text it
            // leaves the group.
            if f.attr("t") == Some("shared") && f.attr("ref").is_none() {
                f.remove_attr("t");
                f.remove_attr("si");
            }
            f.set_text(text);
        }
        None => {
            let mut f = XmlElement::new(cell.qualify("f"));
            f.set_text(text);
            cell.insert_element(0, f);
        }
    }
    if clear_cached_value {
        cell.remove_elements("v");
    }
}

/// Group index of a shared-formula master (`<f t="shared" ref=".." si="N">`).
pub(crate) fn shared_master_index(cell: &XmlElement) -> Option<&str> {
    let f = cell.child("f")?;
    if f.attr("t") != Some("shared") || f.attr("ref").is_none() {
        return None;
    }
    f.attr("si").map(str::trim)
}

/// Whether any cell of `sheet_data` depends on the shared formula group `si`.
pub(crate) fn has_shared_dependents(sheet_data: &XmlElement, si: &str) -> bool {
    sheet_data
        .elements_named("row")
        .flat_map(|row| row.elements_named("c"))
        .filter_map(|c| c.child("f"))
        .any(|f| {
            f.attr("t") == Some("shared")
                && f.attr("ref").is_none()
                && f.attr("si").map(str::trim) == Some(si)
        })
}

/// Write a literal number, superseding any formula or inline string.
pub(crate) fn set_number(cell: &mut XmlElement, literal: &str) {
    cell.remove_elements("f");
    cell.remove_elements("is");
    if matches!(
        cell.attr("t"),
        Some("s" | "inlineStr" | "str" | "b" | "e")
    ) {
        cell.remove_attr("t");
    }
    set_value(cell, literal);
}

/// Point the cell at a shared string table entry.
pub(crate) fn set_shared_string(cell: &mut XmlElement, index: usize) {
    cell.remove_elements("f");
    cell.remove_elements("is");
    cell.set_attr("t", "s");
    set_value(cell, &index.to_string());
}

fn set_value(cell: &mut XmlElement, text: &str) {
    if let Some(v) = cell.child_mut("v") {
        v.set_text(text);
        return;
    }
    // `CT_Cell` content order is f, v, is, extLst.
    let index = cell.position("f").map_or(0, |idx| idx + 1);
    let mut v = XmlElement::new(cell.qualify("v"));
    v.set_text(text);
    cell.insert_element(index, v);
}
