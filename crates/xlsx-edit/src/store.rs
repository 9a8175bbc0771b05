//! Lazily parsed, cached package parts with dirty tracking.
//!
//! A part is parsed the first time it is asked for and the same [`XmlDocument`] is used for every
//! later read or mutation in the session. Only parts flagged dirty are serialized on
//! [`PartStore::save`]; the rest of the package is copied through untouched.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use log::{debug, warn};

use crate::container::Container;
use crate::dom::XmlDocument;
use crate::path::canonical_part_name;
use crate::EditError;

pub(crate) struct PartStore {
    container: Container,
    documents: HashMap<String, XmlDocument>,
    dirty: BTreeSet<String>,
    removed: BTreeSet<String>,
}

impl PartStore {
    pub(crate) fn open(path: impl AsRef<Path>, max_part_bytes: u64) -> Result<Self, EditError> {
        Ok(Self::new(Container::open(path, max_part_bytes)?))
    }

    pub(crate) fn from_bytes(bytes: Vec<u8>, max_part_bytes: u64) -> Result<Self, EditError> {
        Ok(Self::new(Container::from_bytes(bytes, max_part_bytes)?))
    }

    fn new(container: Container) -> Self {
        Self {
            container,
            documents: HashMap::new(),
            dirty: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }

    /// Whether the package has the part (and it has not been removed in this session).
    pub(crate) fn contains(&self, part: &str) -> bool {
        let part = canonical_part_name(part);
        if self.removed.contains(&part) {
            return false;
        }
        self.documents.contains_key(&part) || self.container.contains(&part)
    }

    pub(crate) fn part_names(&self) -> Vec<String> {
        self.container
            .part_names()
            .into_iter()
            .filter(|name| !self.removed.contains(name))
            .collect()
    }

    /// Already materialized document, without touching the container.
    pub(crate) fn cached(&self, part: &str) -> Option<&XmlDocument> {
        self.documents.get(&canonical_part_name(part))
    }

    pub(crate) fn document(&mut self, part: &str) -> Result<&XmlDocument, EditError> {
        self.document_mut(part).map(|doc| &*doc)
    }

    /// The cached document for `part`, parsing it on first access.
    ///
    /// Mutating the returned document does not mark the part dirty; callers pair a mutation with
    /// [`Self::mark_dirty`].
    pub(crate) fn document_mut(&mut self, part: &str) -> Result<&mut XmlDocument, EditError> {
        let part = canonical_part_name(part);
        if self.removed.contains(&part) {
            return Err(EditError::MissingPart(part));
        }

        match self.documents.entry(part) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let name = entry.key();
                let bytes = self
                    .container
                    .read_part(name)?
                    .ok_or_else(|| EditError::MissingPart(name.clone()))?;
                let doc = XmlDocument::parse(&bytes).map_err(|err| EditError::xml(name, err))?;
                debug!("materialized part {name} ({} bytes)", bytes.len());
                Ok(entry.insert(doc))
            }
        }
    }

    /// Flag a part for write-back on the next save. Idempotent.
    pub(crate) fn mark_dirty(&mut self, part: &str) {
        self.dirty.insert(canonical_part_name(part));
    }

    pub(crate) fn is_dirty(&self, part: &str) -> bool {
        self.dirty.contains(&canonical_part_name(part))
    }

    /// Drop a part from the package on the next save. Any cached document and pending write for
    /// it are discarded.
    pub(crate) fn remove_part(&mut self, part: &str) {
        let part = canonical_part_name(part);
        self.documents.remove(&part);
        self.dirty.remove(&part);
        debug!("scheduled removal of part {part}");
        self.removed.insert(part);
    }

    /// Serialize every dirty, materialized part and commit it together with pending removals.
    pub(crate) fn save(&mut self) -> Result<(), EditError> {
        let mut updates = BTreeMap::new();
        for part in &self.dirty {
            match self.documents.get(part) {
                Some(doc) => {
                    let bytes = doc.to_bytes().map_err(|err| EditError::xml(part, err))?;
                    updates.insert(part.clone(), bytes);
                }
                None => warn!("part {part} was flagged dirty but never loaded; skipping"),
            }
        }

        if updates.is_empty() && self.removed.is_empty() {
            self.dirty.clear();
            return Ok(());
        }

        self.container.commit(&updates, &self.removed)?;
        self.dirty.clear();
        self.removed.clear();
        Ok(())
    }

    pub(crate) fn close(self) -> Result<(), EditError> {
        self.container.close()
    }

    pub(crate) fn into_bytes(self) -> Result<Vec<u8>, EditError> {
        self.container.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Cursor, Write};

    use zip::write::FileOptions;
    use zip::{ZipArchive, ZipWriter};

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, bytes) in entries {
            zip.start_file(*name, FileOptions::<()>::default()).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn cached_document_is_reused() {
        let bytes = build_zip(&[("a.xml", b"<a/>")]);
        let mut store = PartStore::from_bytes(bytes, 1024).unwrap();

        store
            .document_mut("a.xml")
            .unwrap()
            .root_mut()
            .set_attr("x", "1");
        assert_eq!(store.document("/a.xml").unwrap().root().attr("x"), Some("1"));
    }

    #[test]
    fn missing_and_malformed_parts_are_format_errors() {
        let bytes = build_zip(&[("bad.xml", b"<a><b></a>")]);
        let mut store = PartStore::from_bytes(bytes, 1024).unwrap();

        let err = store.document("nope.xml").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Format);
        let err = store.document("bad.xml").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Format);
    }

    #[test]
    fn save_writes_only_dirty_parts() {
        let bytes = build_zip(&[("a.xml", b"<a/>"), ("b.xml", b"<b  />")]);
        let mut store = PartStore::from_bytes(bytes, 1024).unwrap();

        store.document_mut("a.xml").unwrap().root_mut().set_attr("x", "1");
        // Materialized but not dirty: must keep its original bytes.
        store.document_mut("b.xml").unwrap().root_mut().set_attr("y", "2");
        store.mark_dirty("a.xml");
        store.mark_dirty("never-loaded.xml");
        store.save().unwrap();
        assert!(!store.is_dirty("a.xml"));

        let bytes = store.into_bytes().unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut read = |name: &str| {
            let mut out = String::new();
            std::io::Read::read_to_string(&mut archive.by_name(name).unwrap(), &mut out).unwrap();
            out
        };
        assert_eq!(read("a.xml"), r#"<a x="1"/>"#);
        assert_eq!(read("b.xml"), "<b  />");
        assert!(archive.by_name("never-loaded.xml").is_err());
    }

    #[test]
    fn removed_parts_are_gone_after_save() {
        let bytes = build_zip(&[("a.xml", b"<a/>"), ("xl/calcChain.xml", b"<calcChain/>")]);
        let mut store = PartStore::from_bytes(bytes, 1024).unwrap();

        store.remove_part("xl/calcChain.xml");
        assert!(!store.contains("xl/calcChain.xml"));
        store.save().unwrap();
        assert_eq!(store.part_names(), vec!["a.xml"]);
    }
}
