use log::debug;
use serde::{Deserialize, Serialize};

use crate::dom::XmlElement;
use crate::path::{CALC_CHAIN_PART, CONTENT_TYPES_PART, WORKBOOK_PART, WORKBOOK_RELS_PART};
use crate::store::PartStore;
use crate::EditError;

const CALC_CHAIN_REL_TYPE_SUFFIX: &str = "/relationships/calcChain";

/// Elements that follow `calcPr` in `CT_Workbook`; a new `calcPr` goes before the first of them.
const WORKBOOK_CHILDREN_AFTER_CALC_PR: &[&str] = &[
    "oleSize",
    "customWorkbookViews",
    "pivotCaches",
    "smartTagPr",
    "smartTagTypes",
    "webPublishing",
    "fileRecoveryPr",
    "webPublishObjects",
    "extLst",
];

/// Policy describing how a save makes Excel recalculate after formula edits.
///
/// Workbooks may carry both cached `<v>` values and an optional `xl/calcChain.xml`. Editing
/// formulas without updating the chain leaves Excel with stale calculation state; dropping the
/// chain (and optionally requesting a full calculation on load) is always safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecalcPolicy {
    /// Set `<calcPr fullCalcOnLoad="1"/>` in `xl/workbook.xml`.
    pub force_full_calc_on_formula_change: bool,
    /// Remove `xl/calcChain.xml` plus its relationship and content-type override.
    pub drop_calc_chain_on_formula_change: bool,
    /// Remove the cached `<v>` of a cell whose formula is rewritten.
    pub clear_cached_values_on_formula_change: bool,
}

impl RecalcPolicy {
    /// Preserve existing calculation metadata (do nothing).
    pub const PRESERVE: Self = Self {
        force_full_calc_on_formula_change: false,
        drop_calc_chain_on_formula_change: false,
        clear_cached_values_on_formula_change: false,
    };
}

impl Default for RecalcPolicy {
    fn default() -> Self {
        Self {
            force_full_calc_on_formula_change: true,
            drop_calc_chain_on_formula_change: true,
            clear_cached_values_on_formula_change: false,
        }
    }
}

/// Apply `policy` to the package after the calc chain has been invalidated.
pub(crate) fn apply_recalc_policy(
    store: &mut PartStore,
    policy: RecalcPolicy,
) -> Result<(), EditError> {
    if policy.drop_calc_chain_on_formula_change {
        drop_calc_chain(store)?;
    }
    if policy.force_full_calc_on_formula_change && store.contains(WORKBOOK_PART) {
        let workbook = store.document_mut(WORKBOOK_PART)?.root_mut();
        if workbook_force_full_calc_on_load(workbook) {
            store.mark_dirty(WORKBOOK_PART);
        }
    }
    Ok(())
}

fn drop_calc_chain(store: &mut PartStore) -> Result<(), EditError> {
    if store.contains(CALC_CHAIN_PART) {
        debug!("dropping {CALC_CHAIN_PART}");
        store.remove_part(CALC_CHAIN_PART);
    }

    if store.contains(WORKBOOK_RELS_PART) {
        let rels = store.document_mut(WORKBOOK_RELS_PART)?.root_mut();
        if remove_children_where(rels, "Relationship", relationship_is_calc_chain) {
            store.mark_dirty(WORKBOOK_RELS_PART);
        }
    }

    if store.contains(CONTENT_TYPES_PART) {
        let types = store.document_mut(CONTENT_TYPES_PART)?.root_mut();
        if remove_children_where(types, "Override", override_is_calc_chain) {
            store.mark_dirty(CONTENT_TYPES_PART);
        }
    }
    Ok(())
}

fn remove_children_where(
    parent: &mut XmlElement,
    local: &str,
    pred: impl Fn(&XmlElement) -> bool,
) -> bool {
    let before = parent.children.len();
    parent.children.retain(|node| {
        node.as_element()
            .map_or(true, |el| el.local_name() != local || !pred(el))
    });
    before != parent.children.len()
}

fn relationship_is_calc_chain(rel: &XmlElement) -> bool {
    rel.attr("Type")
        .is_some_and(|t| t.ends_with(CALC_CHAIN_REL_TYPE_SUFFIX))
        || rel.attr("Target").is_some_and(|t| t.ends_with("calcChain.xml"))
}

fn override_is_calc_chain(entry: &XmlElement) -> bool {
    entry
        .attr("PartName")
        .is_some_and(|name| name.ends_with("calcChain.xml"))
}

/// Ensure `<calcPr fullCalcOnLoad="1"/>`. Returns `true` when the element changed.
pub(crate) fn workbook_force_full_calc_on_load(workbook: &mut XmlElement) -> bool {
    if let Some(calc_pr) = workbook.child_mut("calcPr") {
        if calc_pr.attr("fullCalcOnLoad") == Some("1") {
            return false;
        }
        calc_pr.set_attr("fullCalcOnLoad", "1");
        return true;
    }

    let calc_pr = XmlElement::new(workbook.qualify("calcPr")).with_attr("fullCalcOnLoad", "1");
    let index = workbook
        .children
        .iter()
        .position(|node| {
            node.as_element()
                .is_some_and(|el| WORKBOOK_CHILDREN_AFTER_CALC_PR.contains(&el.local_name()))
        })
        .unwrap_or(workbook.children.len());
    workbook.insert_element(index, calc_pr);
    true
}

/// Toggle `<sheetCalcPr fullCalcOnLoad="1"/>`, which `CT_Worksheet` places directly after
/// `<sheetData>`. Returns `true` when the worksheet changed.
pub(crate) fn worksheet_set_full_calc_on_load(
    worksheet: &mut XmlElement,
    sheet_data_index: usize,
    enabled: bool,
) -> bool {
    match (worksheet.position("sheetCalcPr"), enabled) {
        (Some(idx), true) => match worksheet.children[idx].as_element_mut() {
            Some(el) if el.attr("fullCalcOnLoad") != Some("1") => {
                el.set_attr("fullCalcOnLoad", "1");
                true
            }
            _ => false,
        },
        (Some(idx), false) => {
            worksheet.children.remove(idx);
            true
        }
        (None, true) => {
            let el =
                XmlElement::new(worksheet.qualify("sheetCalcPr")).with_attr("fullCalcOnLoad", "1");
            worksheet.insert_element(sheet_data_index + 1, el);
            true
        }
        (None, false) => false,
    }
}
