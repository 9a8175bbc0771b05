mod support;

use pretty_assertions::assert_eq;
use xlsx_edit::{Access, EditOptions, RecalcPolicy, XlsxEditor};

use support::{read_zip_entry, two_sheet_workbook, zip_entry_names, SHEET1};

#[test]
fn formula_edit_drops_calc_chain_on_save() {
    support::init_logging();
    let mut editor = XlsxEditor::from_bytes(two_sheet_workbook()).expect("open");
    assert_eq!(
        editor.read_formula(2, "C2").expect("read").as_deref(),
        Some("=Sheet1!C2*2")
    );

    editor
        .write_formula(2, "C2", "=Sheet1!C2*3")
        .expect("write formula");
    assert!(editor.calc_chain_invalidated());
    editor.save().expect("save");
    assert!(!editor.calc_chain_invalidated());
    let bytes = editor.into_bytes().expect("bytes");

    assert!(!zip_entry_names(&bytes).contains(&"xl/calcChain.xml".to_string()));
    let rels = read_zip_entry(&bytes, "xl/_rels/workbook.xml.rels").expect("workbook rels");
    assert!(!rels.contains("calcChain"), "{rels}");
    assert!(rels.contains("sharedStrings.xml"));
    let content_types = read_zip_entry(&bytes, "[Content_Types].xml").expect("content types");
    assert!(!content_types.contains("calcChain"), "{content_types}");
    let workbook = read_zip_entry(&bytes, "xl/workbook.xml").expect("workbook");
    assert!(
        workbook.contains(r#"<calcPr calcId="191029" fullCalcOnLoad="1"/>"#),
        "{workbook}"
    );
    // Untouched parts are copied through byte for byte.
    assert_eq!(
        read_zip_entry(&bytes, "xl/worksheets/sheet1.xml").as_deref(),
        Some(SHEET1)
    );

    let mut reopened = XlsxEditor::from_bytes(bytes).expect("reopen");
    assert_eq!(
        reopened.read_formula(2, "C2").expect("read").as_deref(),
        Some("=Sheet1!C2*3")
    );
    let cell = reopened
        .cell(2, "C2", Access::Existing)
        .expect("lookup")
        .expect("cell exists");
    assert_eq!(cell.style, Some(1));
    assert_eq!(cell.value.as_deref(), Some("8"));
}

#[test]
fn value_writes_keep_calc_chain() {
    let mut editor = XlsxEditor::from_bytes(two_sheet_workbook()).expect("open");
    editor.write_float(1, "B2", 2.25).expect("write float");
    editor.write_string(1, "D2", "note").expect("write string");
    assert!(!editor.calc_chain_invalidated());
    editor.save().expect("save");
    let bytes = editor.into_bytes().expect("bytes");

    assert!(zip_entry_names(&bytes).contains(&"xl/calcChain.xml".to_string()));
    let workbook = read_zip_entry(&bytes, "xl/workbook.xml").expect("workbook");
    assert!(!workbook.contains("fullCalcOnLoad"));
}

#[test]
fn preserve_policy_leaves_calc_metadata_alone() {
    let options = EditOptions {
        recalc_policy: RecalcPolicy::PRESERVE,
        ..EditOptions::default()
    };
    let mut editor =
        XlsxEditor::from_bytes_with_options(two_sheet_workbook(), options).expect("open");
    editor.write_formula(2, "C2", "Sheet1!C2*4").expect("write");
    editor.save().expect("save");
    let bytes = editor.into_bytes().expect("bytes");

    assert!(zip_entry_names(&bytes).contains(&"xl/calcChain.xml".to_string()));
    let rels = read_zip_entry(&bytes, "xl/_rels/workbook.xml.rels").expect("workbook rels");
    assert!(rels.contains("calcChain"));
}

#[test]
fn clearing_cached_values_is_opt_in() {
    let options = EditOptions::from_json(
        r#"{"recalc_policy": {"clear_cached_values_on_formula_change": true}}"#,
    )
    .expect("options");
    let mut editor =
        XlsxEditor::from_bytes_with_options(two_sheet_workbook(), options).expect("open");
    editor.write_formula(2, "C2", "=Sheet1!C2*3").expect("write");

    let cell = editor
        .cell(2, "C2", Access::Existing)
        .expect("lookup")
        .expect("cell exists");
    assert_eq!(cell.formula.as_deref(), Some("=Sheet1!C2*3"));
    assert_eq!(cell.value, None);
}

#[test]
fn full_calc_toggle_invalidates_calc_chain() {
    let mut editor = XlsxEditor::from_bytes(two_sheet_workbook()).expect("open");
    editor.set_full_calc_on_load(1, true).expect("toggle");
    editor.save().expect("save");
    let bytes = editor.into_bytes().expect("bytes");

    assert!(!zip_entry_names(&bytes).contains(&"xl/calcChain.xml".to_string()));
    let sheet = read_zip_entry(&bytes, "xl/worksheets/sheet1.xml").expect("sheet1");
    assert!(
        sheet.contains(r#"</sheetData><sheetCalcPr fullCalcOnLoad="1"/><hyperlinks>"#),
        "{sheet}"
    );

    let mut reopened = XlsxEditor::from_bytes(bytes).expect("reopen");
    reopened.set_full_calc_on_load(1, false).expect("toggle off");
    reopened.save().expect("save");
    let bytes = reopened.into_bytes().expect("bytes");
    let sheet = read_zip_entry(&bytes, "xl/worksheets/sheet1.xml").expect("sheet1");
    assert!(!sheet.contains("sheetCalcPr"));
}

#[test]
fn saving_without_changes_keeps_the_package() {
    let original = two_sheet_workbook();
    let mut editor = XlsxEditor::from_bytes(original.clone()).expect("open");
    editor.read_formula(2, "C2").expect("read");
    editor.read_string(1, "A2").expect("read");
    editor.save().expect("save");
    assert_eq!(editor.into_bytes().expect("bytes"), original);
}
