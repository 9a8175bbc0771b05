//! In-place editing of existing `.xlsx` workbooks.
//!
//! [`XlsxEditor`] opens a package and parses its XML parts lazily: a worksheet, the shared
//! string table or a relationship part is only read when an operation needs it, and the parsed
//! tree is reused for the rest of the session. Saving serializes just the parts that were
//! modified; every other ZIP entry is raw-copied into the rewritten package.
//!
//! Addressing follows SpreadsheetML's layout:
//!
//! - rows are looked up by their declared `r` number and created in ascending order;
//! - cells are looked up by A1 coordinate and created in column order within their row;
//! - string writes append to the shared string table (no deduplication);
//! - hyperlinks can only be retargeted, never created;
//! - formula edits invalidate `xl/calcChain.xml`, which the configured [`RecalcPolicy`] drops on
//!   save.
//!
//! ```no_run
//! use xlsx_edit::{Access, XlsxEditor};
//!
//! # fn main() -> Result<(), xlsx_edit::EditError> {
//! let mut editor = XlsxEditor::open("report.xlsx")?;
//! editor.write_formula(2, "C2", "=Sheet1!C2*3")?;
//! editor.write_string(1, "A10", "Total")?;
//! assert!(editor.cell(1, "A10", Access::Existing)?.is_some());
//! editor.save_and_close()?;
//! # Ok(())
//! # }
//! ```

pub mod address;
mod container;
pub mod dom;
mod editor;
mod error;
mod extract;
pub mod path;
mod recalc_policy;
mod relationships;
mod shared_strings;
mod store;
pub mod worksheet;
mod zip_util;

pub use address::{cell_order_compare, normalize_coordinate, CellAddress};
pub use dom::{DomError, XmlDocument, XmlElement, XmlNode};
pub use editor::{EditOptions, XlsxEditor};
pub use error::{EditError, ErrorKind};
pub use extract::SheetArray;
pub use path::{rels_for_part, resolve_target, worksheet_part};
pub use recalc_policy::RecalcPolicy;
pub use worksheet::{Access, Cell, CellKind, Row, Rows};
pub use zip_util::DEFAULT_MAX_ZIP_PART_BYTES;
