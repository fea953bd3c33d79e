//! Collaborator interfaces between the merge engine and a workbook codec.
//!
//! The engine never parses or serialises workbook files itself. It loads
//! sheets through a [`TableReader`] and edits a copy of the primary workbook
//! through a [`TableWriter`] session.

use std::path::Path;

use crate::{data::Value, error::MergeError, table::Table};

pub trait TableReader: Send + Sync {
    fn list_sheets(&self, path: &Path, password: Option<&str>) -> Result<Vec<String>, MergeError>;

    fn load_sheet(
        &self,
        path: &Path,
        password: Option<&str>,
        sheet: &str,
    ) -> Result<Table, MergeError>;
}

pub trait TableWriter: Send + Sync {
    /// Creates `dest` as a copy of the workbook at `source`, replacing any existing file.
    fn copy_workbook(&self, source: &Path, dest: &Path) -> Result<(), MergeError> {
        std::fs::copy(source, dest).map_err(|err| {
            MergeError::io(format!("Copying {source:?} to {dest:?}"), err)
        })?;
        Ok(())
    }

    fn open_for_merge(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<Box<dyn WritableWorkbook>, MergeError>;
}

/// Editable workbook session. Data rows are addressed 0-based below the header row.
pub trait WritableWorkbook {
    fn has_sheet(&self, sheet: &str) -> bool;

    /// Header row of `sheet`; blank header cells are returned as empty strings.
    fn header(&self, sheet: &str) -> Result<Vec<String>, MergeError>;

    /// Index of the header named `name`, appending a new header cell when absent.
    fn get_or_create_column(&mut self, sheet: &str, name: &str) -> Result<usize, MergeError>;

    /// Removes every data row while keeping the header.
    fn clear_data_rows(&mut self, sheet: &str) -> Result<(), MergeError>;

    fn write_cell(
        &mut self,
        sheet: &str,
        row: usize,
        column: usize,
        value: Option<&Value>,
    ) -> Result<(), MergeError>;

    fn save(self: Box<Self>) -> Result<(), MergeError>;
}

pub(crate) fn missing_sheet(sheet: &str, path: &Path) -> MergeError {
    MergeError::workbook(
        format!("Reading workbook {path:?}"),
        anyhow::anyhow!("Sheet '{sheet}' not found"),
    )
}
