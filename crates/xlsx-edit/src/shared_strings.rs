//! Shared string table (`xl/sharedStrings.xml`).
//!
//! Entries are only ever appended; an existing `<si>` is never merged or removed, so indices
//! stored in cells stay valid for the whole session.

use regex::Regex;

use crate::dom::XmlElement;

/// Visible text of an `<si>` or `<is>` element.
///
/// Direct `<t>` children and `<t>` inside rich runs (`<r>`) are concatenated. Phonetic guide runs
/// (`<rPh>`) and extension subtrees are not part of the displayed string.
pub(crate) fn rich_text(item: &XmlElement) -> String {
    let mut out = String::new();
    for el in item.elements() {
        match el.local_name() {
            "t" => out.push_str(&el.text()),
            "r" => {
                for t in el.elements_named("t") {
                    out.push_str(&t.text());
                }
            }
            _ => {}
        }
    }
    out
}

/// Number of `<si>` entries.
pub(crate) fn len(sst: &XmlElement) -> usize {
    sst.elements_named("si").count()
}

/// Text of the entry at the 0-based `index`.
pub(crate) fn resolve(sst: &XmlElement, index: usize) -> Option<String> {
    sst.elements_named("si").nth(index).map(rich_text)
}

/// Append a new entry and return its 0-based index. No deduplication is attempted.
///
/// `count` (total references) grows by one; `uniqueCount` is recomputed from the entries.
pub(crate) fn intern_new(sst: &mut XmlElement, value: &str) -> usize {
    let mut t = XmlElement::new(sst.qualify("t"));
    if needs_space_preserve(value) {
        t.set_attr("xml:space", "preserve");
    }
    t.set_text(value);
    let mut si = XmlElement::new(sst.qualify("si"));
    si.push_element(t);

    // Keep the new entry ahead of any trailing `<extLst>`.
    let index = sst
        .children
        .iter()
        .rposition(|node| node.as_element().is_some_and(|el| el.local_name() == "si"))
        .map_or_else(
            || sst.position("extLst").unwrap_or(sst.children.len()),
            |idx| idx + 1,
        );
    sst.insert_element(index, si);

    let entries = len(sst);
    let count = sst
        .attr("count")
        .and_then(|c| c.trim().parse::<u64>().ok())
        .map_or(entries as u64, |c| c.saturating_add(1));
    sst.set_attr("count", count.to_string());
    sst.set_attr("uniqueCount", entries.to_string());
    entries - 1
}

/// Apply `pattern` to every text node of every entry. Returns how many entries changed.
///
/// Direct `<t>` children and the `<t>` of each rich run are rewritten in place, so run
/// properties survive and a match never spans two runs. Phonetic runs are left alone.
pub(crate) fn text_replace(sst: &mut XmlElement, pattern: &Regex, replacement: &str) -> usize {
    let mut changed = 0;
    for si in sst.elements_mut().filter(|el| el.local_name() == "si") {
        let mut entry_changed = false;
        for el in si.elements_mut() {
            let (is_text, is_run) = (el.local_name() == "t", el.local_name() == "r");
            if is_text {
                entry_changed |= replace_in_node(el, pattern, replacement);
            } else if is_run {
                for t in el.elements_mut().filter(|t| t.local_name() == "t") {
                    entry_changed |= replace_in_node(t, pattern, replacement);
                }
            }
        }
        if entry_changed {
            changed += 1;
        }
    }
    changed
}

fn replace_in_node(t: &mut XmlElement, pattern: &Regex, replacement: &str) -> bool {
    let before = t.text();
    let after = pattern.replace_all(&before, replacement);
    if after == before {
        return false;
    }
    let after = after.into_owned();
    set_preserving_text(t, &after);
    true
}

fn set_preserving_text(t: &mut XmlElement, text: &str) {
    if needs_space_preserve(text) {
        t.set_attr("xml:space", "preserve");
    }
    t.set_text(text);
}

fn needs_space_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::XmlDocument;
    use pretty_assertions::assert_eq;

    fn sst(xml: &str) -> XmlDocument {
        XmlDocument::parse(xml.as_bytes()).unwrap()
    }

    fn serialize(doc: &XmlDocument) -> String {
        String::from_utf8(doc.to_bytes().unwrap()).unwrap()
    }

    #[test]
    fn rich_text_skips_phonetic_runs() {
        let doc = sst(
            r#"<si><r><rPr><b/></rPr><t>東</t></r><r><t>京</t></r><rPh sb="0" eb="2"><t>トウキョウ</t></rPh></si>"#,
        );
        assert_eq!(rich_text(doc.root()), "東京");
    }

    #[test]
    fn resolve_is_zero_based_and_bounded() {
        let doc = sst(r#"<sst count="2" uniqueCount="2"><si><t>a</t></si><si><t>b</t></si></sst>"#);
        assert_eq!(resolve(doc.root(), 0).as_deref(), Some("a"));
        assert_eq!(resolve(doc.root(), 1).as_deref(), Some("b"));
        assert_eq!(resolve(doc.root(), 2), None);
    }

    #[test]
    fn intern_always_appends_and_updates_counts() {
        let mut doc = sst(
            r#"<sst xmlns="urn:main" count="5" uniqueCount="1"><si><t>Hello</t></si><extLst/></sst>"#,
        );
        assert_eq!(intern_new(doc.root_mut(), "Hello"), 1);
        assert_eq!(intern_new(doc.root_mut(), " padded "), 2);
        assert_eq!(
            serialize(&doc),
            r#"<sst xmlns="urn:main" count="7" uniqueCount="3"><si><t>Hello</t></si><si><t>Hello</t></si><si><t xml:space="preserve"> padded </t></si><extLst/></sst>"#
        );
    }

    #[test]
    fn intern_into_empty_table_sets_missing_counts() {
        let mut doc = sst(r#"<x:sst xmlns:x="urn:main"/>"#);
        assert_eq!(intern_new(doc.root_mut(), "first"), 0);
        assert_eq!(
            serialize(&doc),
            r#"<x:sst xmlns:x="urn:main" count="1" uniqueCount="1"><x:si><x:t>first</x:t></x:si></x:sst>"#
        );
    }

    #[test]
    fn text_replace_counts_only_changed_entries() {
        let mut doc = sst(
            r#"<sst><si><t>Hello there</t></si><si><t>Goodbye</t></si><si><r><t>Hello</t></r><r><t>, Hello</t></r></si><si><r><t>Hel</t></r><r><t>lo</t></r></si></sst>"#,
        );
        let pattern = Regex::new("Hello").unwrap();
        assert_eq!(text_replace(doc.root_mut(), &pattern, "World"), 2);
        assert_eq!(resolve(doc.root(), 0).as_deref(), Some("World there"));
        assert_eq!(resolve(doc.root(), 1).as_deref(), Some("Goodbye"));
        assert_eq!(resolve(doc.root(), 2).as_deref(), Some("World, World"));
        // Matches do not span run boundaries.
        assert_eq!(resolve(doc.root(), 3).as_deref(), Some("Hello"));
        assert_eq!(text_replace(doc.root_mut(), &pattern, "World"), 0);
    }

    #[test]
    fn text_replace_keeps_run_formatting() {
        let mut doc = sst(
            r#"<sst><si><r><rPr><b/></rPr><t>Hello</t></r><r><t xml:space="preserve"> there</t></r><rPh sb="0" eb="1"><t>Hello</t></rPh></si></sst>"#,
        );
        let pattern = Regex::new("Hello").unwrap();
        assert_eq!(text_replace(doc.root_mut(), &pattern, "World"), 1);
        assert_eq!(
            serialize(&doc),
            r#"<sst><si><r><rPr><b/></rPr><t>World</t></r><r><t xml:space="preserve"> there</t></r><rPh sb="0" eb="1"><t>Hello</t></rPh></si></sst>"#
        );
    }

    #[test]
    fn text_replace_supports_capture_groups() {
        let mut doc = sst(r#"<sst><si><t>2024-01-31</t></si></sst>"#);
        let pattern = Regex::new(r"(\d+)-(\d+)-(\d+)").unwrap();
        assert_eq!(text_replace(doc.root_mut(), &pattern, "$3/$2/$1"), 1);
        assert_eq!(resolve(doc.root(), 0).as_deref(), Some("31/01/2024"));
    }
}
