use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;

use crate::address::column_letters_of;
use crate::dom::XmlElement;
use crate::worksheet::cells::string_value;
use crate::worksheet::rows::NumberedRows;
use crate::EditError;

/// Column key -> row number -> cell text.
///
/// Columns appear in the order they are first seen while walking the sheet row by row.
pub type SheetArray = IndexMap<String, BTreeMap<u32, Option<String>>>;

/// Every cell of the sheet keyed by column letters.
pub(crate) fn read_array(
    sheet_data: &XmlElement,
    sst: Option<&XmlElement>,
    part: &str,
) -> Result<SheetArray, EditError> {
    let mut out = SheetArray::new();
    for row in NumberedRows::new(sheet_data, part) {
        let (_, number, row) = row?;
        collect_row(row, number, sst, &mut out, |column| column.to_string());
    }
    Ok(out)
}

/// Like [`read_array`], with the first row's values as column keys.
///
/// The header row itself is not part of the result. A column without a header cell (or whose
/// header is empty or repeats an earlier one) keeps its column letters.
pub(crate) fn read_array_with_headers(
    sheet_data: &XmlElement,
    sst: Option<&XmlElement>,
    part: &str,
) -> Result<SheetArray, EditError> {
    let mut rows = NumberedRows::new(sheet_data, part);
    let Some((_, _, header_row)) = rows.next().transpose()? else {
        return Ok(SheetArray::new());
    };

    let mut headers: IndexMap<String, String> = IndexMap::new();
    let mut seen = HashSet::new();
    for cell in header_row.elements_named("c") {
        let Some(reference) = cell.attr("r") else {
            continue;
        };
        let column = column_letters_of(reference);
        let key = match string_value(cell, sst) {
            Some(text) if !text.is_empty() && seen.insert(text.clone()) => text,
            _ => column.clone(),
        };
        headers.insert(column, key);
    }

    let mut out: SheetArray = headers
        .values()
        .map(|key| (key.clone(), BTreeMap::new()))
        .collect();
    for row in rows {
        let (_, number, row) = row?;
        collect_row(row, number, sst, &mut out, |column| {
            headers
                .get(column)
                .cloned()
                .unwrap_or_else(|| column.to_string())
        });
    }
    Ok(out)
}

fn collect_row(
    row: &XmlElement,
    number: u32,
    sst: Option<&XmlElement>,
    out: &mut SheetArray,
    key_for: impl Fn(&str) -> String,
) {
    for cell in row.elements_named("c") {
        let Some(reference) = cell.attr("r") else {
            continue;
        };
        let key = key_for(&column_letters_of(reference));
        out.entry(key)
            .or_default()
            .insert(number, string_value(cell, sst));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::XmlDocument;
    use pretty_assertions::assert_eq;

    const PART: &str = "xl/worksheets/sheet1.xml";

    fn sheet() -> (XmlDocument, XmlDocument) {
        let sheet_data = XmlDocument::parse(
            br#"<sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="inlineStr"><is><t>Qty</t></is></c></row>
<row r="2"><c r="A2" t="s"><v>1</v></c><c r="B2"><v>7</v></c><c r="C2"><v>3</v></c></row>
<row r="4"><c r="A4" t="s"><v>2</v></c><c r="C4"/></row>
</sheetData>"#,
        )
        .unwrap();
        let sst = XmlDocument::parse(
            br#"<sst><si><t>Name</t></si><si><t>apple</t></si><si><t>pear</t></si></sst>"#,
        )
        .unwrap();
        (sheet_data, sst)
    }

    fn column(pairs: &[(u32, Option<&str>)]) -> BTreeMap<u32, Option<String>> {
        pairs
            .iter()
            .map(|(row, v)| (*row, v.map(str::to_string)))
            .collect()
    }

    #[test]
    fn array_is_keyed_by_column_then_row() {
        let (sheet_data, sst) = sheet();
        let array = read_array(sheet_data.root(), Some(sst.root()), PART).unwrap();

        assert_eq!(array.keys().collect::<Vec<_>>(), vec!["A", "C", "B"]);
        assert_eq!(
            array["A"],
            column(&[(1, Some("Name")), (2, Some("apple")), (4, Some("pear"))])
        );
        assert_eq!(array["B"], column(&[(2, Some("7"))]));
        assert_eq!(array["C"], column(&[(1, Some("Qty")), (2, Some("3")), (4, None)]));
    }

    #[test]
    fn headers_replace_column_letters() {
        let (sheet_data, sst) = sheet();
        let array = read_array_with_headers(sheet_data.root(), Some(sst.root()), PART).unwrap();

        assert_eq!(array.keys().collect::<Vec<_>>(), vec!["Name", "Qty", "B"]);
        assert_eq!(array["Name"], column(&[(2, Some("apple")), (4, Some("pear"))]));
        assert_eq!(array["Qty"], column(&[(2, Some("3")), (4, None)]));
        assert_eq!(array["B"], column(&[(2, Some("7"))]));
    }

    #[test]
    fn duplicate_headers_fall_back_to_letters() {
        let sheet_data = XmlDocument::parse(
            br#"<sheetData><row r="1"><c r="A1"><v>1</v></c><c r="B1"><v>1</v></c></row><row r="2"><c r="B2"><v>5</v></c></row></sheetData>"#,
        )
        .unwrap();
        let array = read_array_with_headers(sheet_data.root(), None, PART).unwrap();
        assert_eq!(array.keys().collect::<Vec<_>>(), vec!["1", "B"]);
        assert_eq!(array["B"], column(&[(2, Some("5"))]));
    }

    #[test]
    fn rows_without_r_are_numbered_in_sequence() {
        let sheet_data = XmlDocument::parse(
            br#"<sheetData><row><c r="A1"><v>1</v></c></row><row><c r="A2"><v>2</v></c></row><row r="7"><c r="A7"><v>7</v></c></row><row><c r="A8"><v>8</v></c></row></sheetData>"#,
        )
        .unwrap();
        let array = read_array(sheet_data.root(), None, PART).unwrap();
        assert_eq!(
            array["A"],
            column(&[(1, Some("1")), (2, Some("2")), (7, Some("7")), (8, Some("8"))])
        );

        let array = read_array_with_headers(sheet_data.root(), None, PART).unwrap();
        assert_eq!(array["1"], column(&[(2, Some("2")), (7, Some("7")), (8, Some("8"))]));
    }

    #[test]
    fn empty_sheet_yields_empty_array() {
        let sheet_data = XmlDocument::parse(b"<sheetData/>").unwrap();
        assert!(read_array(sheet_data.root(), None, PART).unwrap().is_empty());
        assert!(read_array_with_headers(sheet_data.root(), None, PART)
            .unwrap()
            .is_empty());
    }
}
