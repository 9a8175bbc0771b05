pub const WORKBOOK_PART: &str = "xl/workbook.xml";
pub const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const CALC_CHAIN_PART: &str = "xl/calcChain.xml";
pub const DEFAULT_SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// Worksheet part for a 1-based sheet number.
pub fn worksheet_part(sheet: u32) -> String {
    format!("xl/worksheets/sheet{sheet}.xml")
}

pub fn rels_for_part(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file_name)) => format!("{dir}/_rels/{file_name}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

pub fn resolve_target(source_part: &str, target: &str) -> String {
    // Relationship targets are URIs; OPC part names do not include fragments.
    let target = target.split('#').next().unwrap_or(target);
    if target.is_empty() {
        return normalize(source_part);
    }
    if let Some(target) = target.strip_prefix('/') {
        return normalize(target);
    }

    let base_dir = source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    normalize(&format!("{base_dir}/{target}"))
}

/// Canonical part name: no leading `/`, forward slashes only.
pub(crate) fn canonical_part_name(name: &str) -> String {
    name.trim_start_matches(['/', '\\']).replace('\\', "/")
}

fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worksheet_and_rels_paths_pair_up() {
        assert_eq!(worksheet_part(2), "xl/worksheets/sheet2.xml");
        assert_eq!(
            rels_for_part(&worksheet_part(2)),
            "xl/worksheets/_rels/sheet2.xml.rels"
        );
    }

    #[test]
    fn rels_for_part_in_root() {
        assert_eq!(rels_for_part("workbook.xml"), "_rels/workbook.xml.rels");
    }

    #[test]
    fn resolve_target_relative_to_source_dir() {
        assert_eq!(
            resolve_target("xl/workbook.xml", "sharedStrings.xml"),
            "xl/sharedStrings.xml"
        );
        assert_eq!(
            resolve_target("xl/worksheets/sheet1.xml", "../media/image1.png"),
            "xl/media/image1.png"
        );
    }

    #[test]
    fn resolve_target_absolute_paths_are_normalized() {
        assert_eq!(
            resolve_target("xl/workbook.xml", "/xl/../xl/sharedStrings.xml"),
            "xl/sharedStrings.xml"
        );
    }

    #[test]
    fn canonical_part_name_strips_leading_separators() {
        assert_eq!(canonical_part_name("/xl/workbook.xml"), "xl/workbook.xml");
        assert_eq!(canonical_part_name("\\xl\\workbook.xml"), "xl/workbook.xml");
    }
}
