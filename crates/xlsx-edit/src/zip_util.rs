use std::io::{Read, Seek};

use zip::read::ZipFile;
use zip::ZipArchive;

use crate::EditError;

/// Default maximum uncompressed size permitted for any single ZIP part inflated into memory.
///
/// Guards against ZIP bombs and forged `uncompressed_size` metadata.
pub const DEFAULT_MAX_ZIP_PART_BYTES: u64 = 256 * 1024 * 1024; // 256MiB

/// Compare two ZIP entry names the way producers tend to disagree on them: percent-encoding,
/// leading separators, `\` vs `/` and ASCII case are all ignored.
pub(crate) fn zip_part_names_equivalent(a: &str, b: &str) -> bool {
    lookup_key(a) == lookup_key(b)
}

fn lookup_key(name: &str) -> Vec<u8> {
    fn hex_val(b: u8) -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'a'..=b'f' => Some(b - b'a' + 10),
            b'A'..=b'F' => Some(b - b'A' + 10),
            _ => None,
        }
    }

    let mut bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut in_leading_separators = true;
    while let Some(&b) = bytes.first() {
        let decoded = match (b, bytes.get(1), bytes.get(2)) {
            (b'%', Some(&hi), Some(&lo)) => match (hex_val(hi), hex_val(lo)) {
                (Some(hi), Some(lo)) => {
                    bytes = &bytes[3..];
                    (hi << 4) | lo
                }
                _ => {
                    bytes = &bytes[1..];
                    b
                }
            },
            _ => {
                bytes = &bytes[1..];
                b
            }
        };

        // Skip any number of leading `/` or `\` separators, even when percent-encoded.
        if in_leading_separators && matches!(decoded, b'/' | b'\\') {
            continue;
        }
        in_leading_separators = false;

        out.push(if decoded == b'\\' {
            b'/'
        } else {
            decoded.to_ascii_lowercase()
        });
    }
    out
}

/// Index of the ZIP entry holding `name`.
///
/// An exact match wins, then the leading-`/` variant, then any equivalent spelling (see
/// [`zip_part_names_equivalent`]). Directories never match.
pub(crate) fn find_zip_entry<R: Read + Seek>(archive: &ZipArchive<R>, name: &str) -> Option<usize> {
    fn is_alt_slash_variant(entry: &str, name: &str) -> bool {
        if let Some(stripped) = name.strip_prefix('/') {
            entry == stripped
        } else {
            entry.strip_prefix('/').is_some_and(|rest| rest == name)
        }
    }

    let mut candidate = None::<(usize, u8)>;
    for (idx, entry) in archive.file_names().enumerate() {
        if entry.ends_with('/') {
            continue;
        }
        if entry == name {
            candidate = Some((idx, 3));
            break;
        }
        if is_alt_slash_variant(entry, name) {
            candidate = Some((idx, 2));
            continue;
        }
        if zip_part_names_equivalent(entry, name) && candidate.map_or(true, |(_, score)| score < 1)
        {
            candidate = Some((idx, 1));
        }
    }
    candidate.map(|(idx, _)| idx)
}

/// Read a ZIP entry into memory with an uncompressed size limit.
///
/// The declared size is checked first; the read itself is capped at `max_bytes + 1` so forged
/// metadata cannot inflate past the limit.
pub(crate) fn read_zip_file_bytes_with_limit(
    file: &mut ZipFile<'_>,
    part: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, EditError> {
    let declared_size = file.size();
    if declared_size > max_bytes {
        return Err(EditError::PartTooLarge {
            part: part.to_string(),
            size: declared_size,
            max: max_bytes,
        });
    }

    let mut buf = Vec::new();
    let read_limit = max_bytes.checked_add(1).unwrap_or(u64::MAX);
    file.take(read_limit).read_to_end(&mut buf)?;

    let observed = buf.len() as u64;
    if observed > max_bytes {
        return Err(EditError::PartTooLarge {
            part: part.to_string(),
            size: observed,
            max: max_bytes,
        });
    }
    Ok(buf)
}
