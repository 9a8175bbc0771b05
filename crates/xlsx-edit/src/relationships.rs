//! Relationship parts (`*.rels`): hyperlink targets, shared-strings discovery and the workbook's
//! sheet catalogue.

use crate::dom::XmlElement;
use crate::path::{resolve_target, WORKBOOK_PART};
use crate::EditError;

const HYPERLINK_REL_TYPE_SUFFIX: &str = "/relationships/hyperlink";
const SHARED_STRINGS_REL_TYPE_SUFFIX: &str = "/relationships/sharedStrings";

/// Reject relationship ids that cannot appear in a `.rels` part.
///
/// Ids are `xsd:ID` values: a letter or `_` followed by letters, digits, `_`, `.` or `-`.
pub(crate) fn validate_relationship_id(id: &str) -> Result<(), EditError> {
    let mut bytes = id.bytes();
    let valid = match bytes.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == b'_')
                && bytes.all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(EditError::InvalidRelationshipId(id.to_string()))
    }
}

fn find_hyperlink<'a>(rels: &'a XmlElement, id: &str) -> Option<&'a XmlElement> {
    rels.elements_named("Relationship").find(|rel| is_hyperlink(rel, id))
}

fn is_hyperlink(rel: &XmlElement, id: &str) -> bool {
    rel.attr("Id") == Some(id)
        && rel
            .attr("Type")
            .is_some_and(|t| t.ends_with(HYPERLINK_REL_TYPE_SUFFIX))
}

/// Target of the hyperlink relationship `id`.
pub(crate) fn resolve_hyperlink(rels: &XmlElement, id: &str) -> Option<String> {
    find_hyperlink(rels, id).and_then(|rel| rel.attr("Target").map(str::to_string))
}

/// Overwrite the target of an existing hyperlink relationship. Never creates one.
pub(crate) fn retarget_hyperlink(rels: &mut XmlElement, id: &str, target: &str) -> bool {
    match rels
        .elements_mut()
        .find(|rel| rel.local_name() == "Relationship" && is_hyperlink(rel, id))
    {
        Some(rel) => {
            rel.set_attr("Target", target);
            true
        }
        None => false,
    }
}

/// Shared strings part named by the workbook relationships, if any.
pub(crate) fn shared_strings_target(workbook_rels: &XmlElement) -> Option<String> {
    workbook_rels
        .elements_named("Relationship")
        .filter(|rel| {
            rel.attr("Type")
                .is_some_and(|t| t.ends_with(SHARED_STRINGS_REL_TYPE_SUFFIX))
        })
        .filter(|rel| {
            !rel.attr("TargetMode")
                .is_some_and(|mode| mode.eq_ignore_ascii_case("External"))
        })
        .find_map(|rel| rel.attr("Target"))
        .map(|target| resolve_target(WORKBOOK_PART, target))
}

/// Sheet names in workbook order.
pub(crate) fn sheet_names(workbook: &XmlElement) -> Vec<String> {
    workbook
        .child("sheets")
        .map(|sheets| {
            sheets
                .elements_named("sheet")
                .filter_map(|sheet| sheet.attr("name").map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
