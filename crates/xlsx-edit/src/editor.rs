//! Editing session over one `.xlsx` package.

use std::path::Path;

use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::address::{normalize_coordinate, CellAddress};
use crate::dom::{XmlDocument, XmlElement};
use crate::extract::{self, SheetArray};
use crate::path::{
    rels_for_part, worksheet_part, DEFAULT_SHARED_STRINGS_PART, WORKBOOK_PART, WORKBOOK_RELS_PART,
};
use crate::recalc_policy::{apply_recalc_policy, worksheet_set_full_calc_on_load, RecalcPolicy};
use crate::relationships;
use crate::shared_strings;
use crate::store::PartStore;
use crate::worksheet::cells::{self, CellSlot};
use crate::worksheet::rows::{self, Rows};
use crate::worksheet::{self, Access, Cell, CellKind, Row};
use crate::zip_util::DEFAULT_MAX_ZIP_PART_BYTES;
use crate::EditError;

/// Session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditOptions {
    /// What `save` does to calculation metadata after formulas changed.
    pub recalc_policy: RecalcPolicy,
    /// Largest uncompressed part the session will inflate.
    pub max_part_bytes: u64,
}

impl Default for EditOptions {
    fn default() -> Self {
        Self {
            recalc_policy: RecalcPolicy::default(),
            max_part_bytes: DEFAULT_MAX_ZIP_PART_BYTES,
        }
    }
}

impl EditOptions {
    /// Parse options from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, EditError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// An open workbook.
///
/// Parts are parsed on first use and kept for the rest of the session; [`XlsxEditor::save`]
/// writes back only the parts that were changed. Sheets are addressed by 1-based number
/// (`xl/worksheets/sheet{n}.xml`), cells by A1-style coordinates.
pub struct XlsxEditor {
    store: PartStore,
    options: EditOptions,
    /// Set by formula writes and full-calc toggles; consumed by the next save.
    calc_chain_invalidated: bool,
    /// Resolved shared strings part. `Some(None)` once resolution found none.
    shared_strings_part: Option<Option<String>>,
}

impl XlsxEditor {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EditError> {
        Self::open_with_options(path, EditOptions::default())
    }

    pub fn open_with_options(
        path: impl AsRef<Path>,
        options: EditOptions,
    ) -> Result<Self, EditError> {
        let path = path.as_ref();
        debug!("opening {}", path.display());
        Ok(Self::new(
            PartStore::open(path, options.max_part_bytes)?,
            options,
        ))
    }

    /// Edit an in-memory package. Use [`XlsxEditor::into_bytes`] to get the result back.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, EditError> {
        Self::from_bytes_with_options(bytes, EditOptions::default())
    }

    pub fn from_bytes_with_options(bytes: Vec<u8>, options: EditOptions) -> Result<Self, EditError> {
        Ok(Self::new(
            PartStore::from_bytes(bytes, options.max_part_bytes)?,
            options,
        ))
    }

    fn new(store: PartStore, options: EditOptions) -> Self {
        Self {
            store,
            options,
            calc_chain_invalidated: false,
            shared_strings_part: None,
        }
    }

    pub fn options(&self) -> &EditOptions {
        &self.options
    }

    /// Part names currently in the package, minus parts scheduled for removal.
    pub fn part_names(&self) -> Vec<String> {
        self.store.part_names()
    }

    pub fn is_part_dirty(&self, part: &str) -> bool {
        self.store.is_dirty(part)
    }

    /// Whether the next save will apply the recalculation policy.
    pub fn calc_chain_invalidated(&self) -> bool {
        self.calc_chain_invalidated
    }

    /// Sheet names in workbook order.
    pub fn sheet_names(&mut self) -> Result<Vec<String>, EditError> {
        let workbook = self.store.document(WORKBOOK_PART)?;
        Ok(relationships::sheet_names(workbook.root()))
    }

    // Rows

    /// Look up row `number` of `sheet`.
    pub fn row(&mut self, sheet: u32, number: u32, access: Access) -> Result<Option<Row>, EditError> {
        let part = sheet_part(sheet)?;
        let sheet_data = self.sheet_data_mut(&part)?;
        let (idx, created) = match rows::find_row(sheet_data, number, &part)? {
            Some(idx) => (idx, false),
            None => match access {
                Access::Existing => return Ok(None),
                Access::Required => return Err(EditError::RowNotFound { part, row: number }),
                Access::Create => {
                    if number == 0 {
                        return Err(EditError::InvalidCoordinate(number.to_string()));
                    }
                    (rows::insert_row(sheet_data, number, &part)?, true)
                }
            },
        };

        let row = cells::element_at(sheet_data, idx)
            .ok_or_else(|| stale_position(&part))
            .map(|el| Row::from_element(el, number))?;
        if created {
            self.store.mark_dirty(&part);
        }
        Ok(Some(row))
    }

    /// First row in document order.
    pub fn first_row(&mut self, sheet: u32) -> Result<Option<Row>, EditError> {
        let part = sheet_part(sheet)?;
        let sheet_data = self.sheet_data(&part)?;
        Ok(rows::first_row(sheet_data, &part)?.map(|(number, el)| Row::from_element(el, number)))
    }

    /// Last row in document order.
    pub fn last_row(&mut self, sheet: u32) -> Result<Option<Row>, EditError> {
        let part = sheet_part(sheet)?;
        let sheet_data = self.sheet_data(&part)?;
        Ok(rows::last_row(sheet_data, &part)?.map(|(number, el)| Row::from_element(el, number)))
    }

    /// Remove row `number`. Returns whether a row was removed.
    pub fn delete_row(&mut self, sheet: u32, number: u32) -> Result<bool, EditError> {
        let part = sheet_part(sheet)?;
        let sheet_data = self.sheet_data_mut(&part)?;
        let removed = rows::remove_row(sheet_data, number, &part)?;
        if removed {
            self.store.mark_dirty(&part);
        }
        Ok(removed)
    }

    /// Iterate the rows of `sheet` as they are right now.
    pub fn rows(&mut self, sheet: u32) -> Result<Rows<'_>, EditError> {
        let part = sheet_part(sheet)?;
        let worksheet = self.store.document(&part)?.root();
        let sheet_data = worksheet::sheet_data(worksheet, &part)?;
        Ok(Rows::new(part, sheet_data))
    }

    // Cells

    /// Look up the cell at `coordinate` of `sheet`.
    pub fn cell(
        &mut self,
        sheet: u32,
        coordinate: &str,
        access: Access,
    ) -> Result<Option<Cell>, EditError> {
        let Some((part, slot)) = self.locate_cell(sheet, coordinate, access)? else {
            return Ok(None);
        };
        let cell = self.cell_element(&part, slot)?;
        Cell::from_element(cell, &part).map(Some)
    }

    /// Formula of the cell, with a leading `=`.
    ///
    /// A dependent of a shared formula (`<f t="shared" si=".."/>` without text) reads as `None`:
    /// its formula is only stored on the group's master cell, relative to the master's position.
    pub fn read_formula(&mut self, sheet: u32, coordinate: &str) -> Result<Option<String>, EditError> {
        self.read_existing(sheet, coordinate, cells::formula)
    }

    /// Numeric value of the cell. String cells and unparsable values read as `None`.
    pub fn read_float(&mut self, sheet: u32, coordinate: &str) -> Result<Option<f64>, EditError> {
        self.read_existing(sheet, coordinate, |cell| {
            numeric_text(cell).and_then(|v| v.trim().parse::<f64>().ok())
        })
    }

    /// Integer value of the cell. Integral floats such as `3.0` are accepted.
    pub fn read_int(&mut self, sheet: u32, coordinate: &str) -> Result<Option<i64>, EditError> {
        self.read_existing(sheet, coordinate, |cell| {
            let text = numeric_text(cell)?;
            let text = text.trim();
            if let Ok(v) = text.parse::<i64>() {
                return Some(v);
            }
            let v = text.parse::<f64>().ok()?;
            (v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64).then_some(v as i64)
        })
    }

    /// Text of the cell; shared strings are resolved through the shared string table.
    pub fn read_string(&mut self, sheet: u32, coordinate: &str) -> Result<Option<String>, EditError> {
        let Some((part, slot)) = self.locate_cell(sheet, coordinate, Access::Existing)? else {
            return Ok(None);
        };
        let sst_part = if cells::kind(self.cell_element(&part, slot)?) == CellKind::SharedString {
            self.shared_strings_part()?
        } else {
            None
        };

        self.with_parts(&part, sst_part.as_deref(), |worksheet, sst| {
            let cell = cell_at(worksheet, &part, slot)?;
            Ok(cells::string_value(cell, sst))
        })
    }

    /// Target of the hyperlink anchored at `coordinate`.
    ///
    /// Hyperlinks live in the worksheet's `<hyperlinks>` table, so a link on a cell without a
    /// `<c>` element is still found.
    pub fn read_hyperlink(&mut self, sheet: u32, coordinate: &str) -> Result<Option<String>, EditError> {
        let Some((rels_part, id)) = self.hyperlink_relationship(sheet, coordinate)? else {
            return Ok(None);
        };
        let rels = self.store.document(&rels_part)?;
        let target = relationships::resolve_hyperlink(rels.root(), &id);
        if target.is_none() {
            warn!("hyperlink relationship {id} not found in {rels_part}");
        }
        Ok(target)
    }

    /// Write a formula, keeping the cell's type and style. The cell is created when missing.
    pub fn write_formula(
        &mut self,
        sheet: u32,
        coordinate: &str,
        formula: &str,
    ) -> Result<(), EditError> {
        let clear_cached = self
            .options
            .recalc_policy
            .clear_cached_values_on_formula_change;
        self.write_cell(sheet, coordinate, |cell| {
            cells::set_formula(cell, formula, clear_cached)
        })?;
        self.invalidate_calc_chain();
        Ok(())
    }

    /// Write a number, clearing any formula on the cell.
    pub fn write_float(&mut self, sheet: u32, coordinate: &str, value: f64) -> Result<(), EditError> {
        if !value.is_finite() {
            return Err(EditError::InvalidValue(value.to_string()));
        }
        self.write_number(sheet, coordinate, &value.to_string())
    }

    /// Write an integer, clearing any formula on the cell.
    pub fn write_int(&mut self, sheet: u32, coordinate: &str, value: i64) -> Result<(), EditError> {
        self.write_number(sheet, coordinate, &value.to_string())
    }

    /// Write text through a new shared string table entry.
    ///
    /// An entry is appended on every call, even when the same text is already in the table.
    /// Like number writes, this fails on the master cell of a shared formula that is still in use.
    pub fn write_string(&mut self, sheet: u32, coordinate: &str, value: &str) -> Result<(), EditError> {
        let sst_part = self
            .shared_strings_part()?
            .ok_or_else(|| EditError::MissingPart(DEFAULT_SHARED_STRINGS_PART.to_string()))?;
        let (part, slot) = self.create_cell(sheet, coordinate)?;
        self.ensure_formula_removable(&part, slot)?;

        let sst = self.store.document_mut(&sst_part)?.root_mut();
        let index = shared_strings::intern_new(sst, value);
        self.store.mark_dirty(&sst_part);
        debug!("appended shared string {index} to {sst_part}");

        let worksheet = self.store.document_mut(&part)?.root_mut();
        cells::set_shared_string(cell_at_mut(worksheet, &part, slot)?, index);
        self.store.mark_dirty(&part);
        Ok(())
    }

    /// Point the existing hyperlink at `coordinate` to `target`.
    ///
    /// Returns `false` when the cell has no hyperlink; relationships are never created.
    pub fn write_hyperlink(
        &mut self,
        sheet: u32,
        coordinate: &str,
        target: &str,
    ) -> Result<bool, EditError> {
        let Some((rels_part, id)) = self.hyperlink_relationship(sheet, coordinate)? else {
            return Ok(false);
        };
        let rels = self.store.document_mut(&rels_part)?.root_mut();
        if !relationships::retarget_hyperlink(rels, &id, target) {
            warn!("hyperlink relationship {id} not found in {rels_part}");
            return Ok(false);
        }
        self.store.mark_dirty(&rels_part);
        Ok(true)
    }

    /// Add or remove `<sheetCalcPr fullCalcOnLoad="1"/>` on a worksheet.
    pub fn set_full_calc_on_load(&mut self, sheet: u32, enabled: bool) -> Result<(), EditError> {
        let part = sheet_part(sheet)?;
        let worksheet = self.store.document_mut(&part)?.root_mut();
        let sheet_data_index = worksheet::sheet_data_index(worksheet, &part)?;
        if worksheet_set_full_calc_on_load(worksheet, sheet_data_index, enabled) {
            self.store.mark_dirty(&part);
        }
        self.invalidate_calc_chain();
        Ok(())
    }

    // Bulk operations

    /// All cells of `sheet`, keyed by column letters then row number.
    pub fn read_array(&mut self, sheet: u32) -> Result<SheetArray, EditError> {
        let part = sheet_part(sheet)?;
        let sst_part = self.shared_strings_part()?;
        self.with_parts(&part, sst_part.as_deref(), |worksheet, sst| {
            extract::read_array(worksheet::sheet_data(worksheet, &part)?, sst, &part)
        })
    }

    /// All cells below the first row of `sheet`, keyed by the first row's values.
    pub fn read_array_with_headers(&mut self, sheet: u32) -> Result<SheetArray, EditError> {
        let part = sheet_part(sheet)?;
        let sst_part = self.shared_strings_part()?;
        self.with_parts(&part, sst_part.as_deref(), |worksheet, sst| {
            extract::read_array_with_headers(worksheet::sheet_data(worksheet, &part)?, sst, &part)
        })
    }

    /// Regex substitution over every shared string. Returns how many entries changed.
    ///
    /// `replacement` may refer to capture groups as `$1` or `${name}`.
    pub fn text_replace(&mut self, pattern: &str, replacement: &str) -> Result<usize, EditError> {
        let pattern = Regex::new(pattern)?;
        let Some(sst_part) = self.shared_strings_part()? else {
            return Ok(0);
        };
        let sst = self.store.document_mut(&sst_part)?.root_mut();
        let changed = shared_strings::text_replace(sst, &pattern, replacement);
        if changed > 0 {
            self.store.mark_dirty(&sst_part);
        }
        Ok(changed)
    }

    /// Entry `index` (0-based) of the shared string table.
    pub fn shared_string(&mut self, index: usize) -> Result<Option<String>, EditError> {
        let Some(sst_part) = self.shared_strings_part()? else {
            return Ok(None);
        };
        let sst = self.store.document(&sst_part)?;
        Ok(shared_strings::resolve(sst.root(), index))
    }

    pub fn shared_string_count(&mut self) -> Result<usize, EditError> {
        let Some(sst_part) = self.shared_strings_part()? else {
            return Ok(0);
        };
        let sst = self.store.document(&sst_part)?;
        Ok(shared_strings::len(sst.root()))
    }

    // Persistence

    /// Write every changed part back to the package.
    ///
    /// When formulas changed since the last save the recalculation policy runs first. A failed
    /// save leaves the package in an undefined state; reopen it instead of retrying.
    pub fn save(&mut self) -> Result<(), EditError> {
        if std::mem::take(&mut self.calc_chain_invalidated) {
            debug!("applying recalc policy {:?}", self.options.recalc_policy);
            apply_recalc_policy(&mut self.store, self.options.recalc_policy)?;
        }
        self.store.save()
    }

    /// Save, then release the package.
    pub fn save_and_close(mut self) -> Result<(), EditError> {
        self.save()?;
        self.close()
    }

    /// Release the package, discarding unsaved changes.
    pub fn close(self) -> Result<(), EditError> {
        self.store.close()
    }

    /// The package as last saved.
    pub fn into_bytes(self) -> Result<Vec<u8>, EditError> {
        self.store.into_bytes()
    }

    fn invalidate_calc_chain(&mut self) {
        if !self.calc_chain_invalidated {
            debug!("calc chain invalidated");
        }
        self.calc_chain_invalidated = true;
    }

    fn sheet_data(&mut self, part: &str) -> Result<&XmlElement, EditError> {
        let worksheet = self.store.document(part)?.root();
        worksheet::sheet_data(worksheet, part)
    }

    fn sheet_data_mut(&mut self, part: &str) -> Result<&mut XmlElement, EditError> {
        let worksheet = self.store.document_mut(part)?.root_mut();
        worksheet::sheet_data_mut(worksheet, part)
    }

    /// Find (or, under [`Access::Create`], create) a cell and return its position.
    fn locate_cell(
        &mut self,
        sheet: u32,
        coordinate: &str,
        access: Access,
    ) -> Result<Option<(String, CellSlot)>, EditError> {
        let coordinate = normalize_coordinate(coordinate)?;
        let part = sheet_part(sheet)?;
        let sheet_data = self.sheet_data_mut(&part)?;
        if let Some(slot) = cells::find_cell(sheet_data, &coordinate) {
            return Ok(Some((part, slot)));
        }

        match access {
            Access::Existing => Ok(None),
            Access::Required => Err(EditError::CellNotFound {
                part,
                cell: coordinate,
            }),
            Access::Create => {
                let address = CellAddress::parse(&coordinate)?;
                let row = rows::ensure_row(sheet_data, address.row(), &part)?;
                let row_el =
                    cells::element_at_mut(sheet_data, row).ok_or_else(|| stale_position(&part))?;
                let cell = cells::insert_cell(row_el, &coordinate);
                self.store.mark_dirty(&part);
                Ok(Some((part, CellSlot { row, cell })))
            }
        }
    }

    fn cell_element(&mut self, part: &str, slot: CellSlot) -> Result<&XmlElement, EditError> {
        let worksheet = self.store.document(part)?.root();
        cell_at(worksheet, part, slot)
    }

    fn read_existing<T>(
        &mut self,
        sheet: u32,
        coordinate: &str,
        read: impl FnOnce(&XmlElement) -> Option<T>,
    ) -> Result<Option<T>, EditError> {
        let Some((part, slot)) = self.locate_cell(sheet, coordinate, Access::Existing)? else {
            return Ok(None);
        };
        Ok(read(self.cell_element(&part, slot)?))
    }

    fn create_cell(&mut self, sheet: u32, coordinate: &str) -> Result<(String, CellSlot), EditError> {
        self.locate_cell(sheet, coordinate, Access::Create)?
            .ok_or_else(|| stale_position(&worksheet_part(sheet)))
    }

    /// Refuse to drop the formula of a shared-formula master whose dependents still point at it.
    fn ensure_formula_removable(&mut self, part: &str, slot: CellSlot) -> Result<(), EditError> {
        let worksheet = self.store.document(part)?.root();
        let cell = cell_at(worksheet, part, slot)?;
        let Some(si) = cells::shared_master_index(cell) else {
            return Ok(());
        };
        if !cells::has_shared_dependents(worksheet::sheet_data(worksheet, part)?, si) {
            return Ok(());
        }
        Err(EditError::SharedFormulaMaster {
            part: part.to_string(),
            cell: cell.attr("r").unwrap_or_default().to_string(),
        })
    }

    fn write_number(&mut self, sheet: u32, coordinate: &str, literal: &str) -> Result<(), EditError> {
        let (part, slot) = self.create_cell(sheet, coordinate)?;
        self.ensure_formula_removable(&part, slot)?;
        let worksheet = self.store.document_mut(&part)?.root_mut();
        cells::set_number(cell_at_mut(worksheet, &part, slot)?, literal);
        self.store.mark_dirty(&part);
        Ok(())
    }

    fn write_cell(
        &mut self,
        sheet: u32,
        coordinate: &str,
        write: impl FnOnce(&mut XmlElement),
    ) -> Result<(), EditError> {
        let (part, slot) = self.create_cell(sheet, coordinate)?;
        let worksheet = self.store.document_mut(&part)?.root_mut();
        write(cell_at_mut(worksheet, &part, slot)?);
        self.store.mark_dirty(&part);
        Ok(())
    }

    /// Run `f` over a worksheet root and, when given, the shared string table root.
    fn with_parts<T>(
        &mut self,
        part: &str,
        sst_part: Option<&str>,
        f: impl FnOnce(&XmlElement, Option<&XmlElement>) -> Result<T, EditError>,
    ) -> Result<T, EditError> {
        self.store.document(part)?;
        if let Some(sst_part) = sst_part {
            self.store.document(sst_part)?;
        }
        let worksheet = self
            .store
            .cached(part)
            .ok_or_else(|| EditError::MissingPart(part.to_string()))?;
        let sst = sst_part
            .and_then(|p| self.store.cached(p))
            .map(XmlDocument::root);
        f(worksheet.root(), sst)
    }

    /// Shared strings part of the workbook, resolved once per session.
    fn shared_strings_part(&mut self) -> Result<Option<String>, EditError> {
        if let Some(part) = &self.shared_strings_part {
            return Ok(part.clone());
        }

        let mut resolved = None;
        if self.store.contains(WORKBOOK_RELS_PART) {
            let rels = self.store.document(WORKBOOK_RELS_PART)?;
            resolved = relationships::shared_strings_target(rels.root())
                .filter(|part| self.store.contains(part));
        }
        if resolved.is_none() && self.store.contains(DEFAULT_SHARED_STRINGS_PART) {
            resolved = Some(DEFAULT_SHARED_STRINGS_PART.to_string());
        }
        debug!("shared strings part: {resolved:?}");
        self.shared_strings_part = Some(resolved.clone());
        Ok(resolved)
    }

    /// Worksheet rels part and relationship id of the hyperlink at `coordinate`.
    fn hyperlink_relationship(
        &mut self,
        sheet: u32,
        coordinate: &str,
    ) -> Result<Option<(String, String)>, EditError> {
        let coordinate = normalize_coordinate(coordinate)?;
        let part = sheet_part(sheet)?;
        let worksheet = self.store.document(&part)?.root();
        let Some(id) = worksheet::hyperlink_rel_id(worksheet, &coordinate).map(str::to_string)
        else {
            return Ok(None);
        };
        relationships::validate_relationship_id(&id)?;

        let rels_part = rels_for_part(&part);
        if !self.store.contains(&rels_part) {
            warn!("{part} references hyperlink {id} but has no {rels_part}");
            return Ok(None);
        }
        Ok(Some((rels_part, id)))
    }
}

fn sheet_part(sheet: u32) -> Result<String, EditError> {
    if sheet == 0 {
        return Err(EditError::InvalidSheet(sheet));
    }
    Ok(worksheet_part(sheet))
}

fn stale_position(part: &str) -> EditError {
    EditError::Invalid(format!("cell position in {part} no longer matches the document"))
}

fn cell_at<'a>(
    worksheet: &'a XmlElement,
    part: &str,
    slot: CellSlot,
) -> Result<&'a XmlElement, EditError> {
    let sheet_data = worksheet::sheet_data(worksheet, part)?;
    cells::element_at(sheet_data, slot.row)
        .and_then(|row| cells::element_at(row, slot.cell))
        .ok_or_else(|| stale_position(part))
}

fn cell_at_mut<'a>(
    worksheet: &'a mut XmlElement,
    part: &str,
    slot: CellSlot,
) -> Result<&'a mut XmlElement, EditError> {
    let sheet_data = worksheet::sheet_data_mut(worksheet, part)?;
    cells::element_at_mut(sheet_data, slot.row)
        .and_then(|row| cells::element_at_mut(row, slot.cell))
        .ok_or_else(|| stale_position(part))
}

/// `<v>` of a cell whose type can hold a number.
fn numeric_text(cell: &XmlElement) -> Option<String> {
    match cells::kind(cell) {
        CellKind::SharedString | CellKind::InlineString => None,
        _ => cells::raw_value(cell),
    }
}
