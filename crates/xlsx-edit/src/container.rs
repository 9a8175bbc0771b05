//! The ZIP container behind an editing session.
//!
//! Reads inflate one entry at a time. A commit rewrites the archive once: replaced entries are
//! recompressed, removed entries are skipped and every other entry is raw-copied so its bytes
//! (and compression) survive untouched. Path-backed containers are rewritten into a temp file in
//! the destination directory and renamed into place.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::NamedTempFile;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::path::canonical_part_name;
use crate::zip_util::{find_zip_entry, read_zip_file_bytes_with_limit, zip_part_names_equivalent};
use crate::EditError;

enum Backing {
    File {
        path: PathBuf,
        archive: ZipArchive<File>,
    },
    Memory {
        archive: ZipArchive<Cursor<Vec<u8>>>,
    },
}

pub(crate) struct Container {
    backing: Backing,
    max_part_bytes: u64,
}

impl Container {
    pub(crate) fn open(path: impl AsRef<Path>, max_part_bytes: u64) -> Result<Self, EditError> {
        let path = path.as_ref().to_path_buf();
        let archive = ZipArchive::new(File::open(&path)?)?;
        debug!("opened xlsx container {} ({} entries)", path.display(), archive.len());
        Ok(Self {
            backing: Backing::File { path, archive },
            max_part_bytes,
        })
    }

    pub(crate) fn from_bytes(bytes: Vec<u8>, max_part_bytes: u64) -> Result<Self, EditError> {
        let archive = ZipArchive::new(Cursor::new(bytes))?;
        Ok(Self {
            backing: Backing::Memory { archive },
            max_part_bytes,
        })
    }

    /// Canonical names (no leading `/`) of every non-directory entry.
    pub(crate) fn part_names(&self) -> Vec<String> {
        let names: Box<dyn Iterator<Item = &str>> = match &self.backing {
            Backing::File { archive, .. } => Box::new(archive.file_names()),
            Backing::Memory { archive } => Box::new(archive.file_names()),
        };
        names
            .filter(|name| !name.ends_with('/'))
            .map(canonical_part_name)
            .collect()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        match &self.backing {
            Backing::File { archive, .. } => find_zip_entry(archive, name).is_some(),
            Backing::Memory { archive } => find_zip_entry(archive, name).is_some(),
        }
    }

    /// Inflate a part. `Ok(None)` when no entry carries that name.
    pub(crate) fn read_part(&mut self, name: &str) -> Result<Option<Vec<u8>>, EditError> {
        let max = self.max_part_bytes;
        match &mut self.backing {
            Backing::File { archive, .. } => read_entry(archive, name, max),
            Backing::Memory { archive } => read_entry(archive, name, max),
        }
    }

    /// Replace `updates` (adding entries that do not exist yet) and drop `removals`, in one pass.
    pub(crate) fn commit(
        &mut self,
        updates: &BTreeMap<String, Vec<u8>>,
        removals: &BTreeSet<String>,
    ) -> Result<(), EditError> {
        debug!(
            "committing {} replaced and {} removed parts",
            updates.len(),
            removals.len()
        );
        match &mut self.backing {
            Backing::File { path, archive } => {
                let dir = parent_dir_or_dot(path);
                let mut tmp = NamedTempFile::new_in(dir)?;
                rewrite_archive(archive, tmp.as_file_mut(), updates, removals)?;
                tmp.as_file_mut().flush()?;
                tmp.as_file().sync_all()?;
                tmp.persist(path.as_path()).map_err(|err| EditError::Io(err.error))?;
                *archive = ZipArchive::new(File::open(path.as_path())?)?;
            }
            Backing::Memory { archive } => {
                let out = rewrite_archive(archive, Cursor::new(Vec::new()), updates, removals)?;
                *archive = ZipArchive::new(Cursor::new(out.into_inner()))?;
            }
        }
        Ok(())
    }

    /// The committed package bytes. Uncommitted edits are not included.
    pub(crate) fn into_bytes(self) -> Result<Vec<u8>, EditError> {
        match self.backing {
            Backing::File { path, archive } => {
                drop(archive);
                Ok(std::fs::read(path)?)
            }
            Backing::Memory { archive } => Ok(archive.into_inner().into_inner()),
        }
    }

    /// Release the archive handle. Edits that were not committed are lost.
    pub(crate) fn close(self) -> Result<(), EditError> {
        match self.backing {
            Backing::File { path, archive } => {
                drop(archive);
                debug!("closed xlsx container {}", path.display());
            }
            Backing::Memory { .. } => {}
        }
        Ok(())
    }
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    max_part_bytes: u64,
) -> Result<Option<Vec<u8>>, EditError> {
    let Some(idx) = find_zip_entry(archive, name) else {
        return Ok(None);
    };
    let mut file = archive.by_index(idx)?;
    let buf = read_zip_file_bytes_with_limit(&mut file, name, max_part_bytes)?;
    Ok(Some(buf))
}

fn rewrite_archive<R: Read + Seek, W: Write + Seek>(
    archive: &mut ZipArchive<R>,
    output: W,
    updates: &BTreeMap<String, Vec<u8>>,
    removals: &BTreeSet<String>,
) -> Result<W, EditError> {
    let mut zip = ZipWriter::new(output);
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);
    let mut written: BTreeSet<&str> = BTreeSet::new();

    for i in 0..archive.len() {
        let file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }

        let name = file.name().to_string();
        if removals
            .iter()
            .any(|removed| zip_part_names_equivalent(&name, removed))
        {
            debug!("dropping part {name}");
            continue;
        }

        match updates
            .iter()
            .find(|(part, _)| zip_part_names_equivalent(&name, part))
        {
            Some((part, bytes)) => {
                drop(file);
                // Keep the producer's entry name; only the payload changes.
                zip.start_file(name, options)?;
                zip.write_all(bytes)?;
                written.insert(part.as_str());
            }
            None => zip.raw_copy_file(file)?,
        }
    }

    for (part, bytes) in updates {
        if written.contains(part.as_str()) {
            continue;
        }
        zip.start_file(part.as_str(), options)?;
        zip.write_all(bytes)?;
    }

    Ok(zip.finish()?)
}

fn parent_dir_or_dot(path: &Path) -> &Path {
    // `Path::parent` is `Some("")` for bare relative file names like `book.xlsx`.
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}
