#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use sheet_matcher::{
    config::{MergeJob, WorkbookSelection},
    data::display_cell,
    mapping::FieldMapping,
    table::Table,
};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Files in the workspace whose name contains `marker`.
    pub fn files_containing(&self, marker: &str) -> Vec<PathBuf> {
        let mut found = fs::read_dir(self.path())
            .expect("read workspace")
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .is_some_and(|n| n.to_string_lossy().contains(marker))
            })
            .collect::<Vec<_>>();
        found.sort();
        found
    }
}

pub fn staff_table() -> Table {
    Table::from_strings(&["ID", "Name"], &[vec!["1", "Alice"], vec!["2", "Bob"]])
}

pub fn dept_table() -> Table {
    Table::from_strings(&["ID", "Dept"], &[vec!["1", "Eng"], vec!["3", "Sales"]])
}

/// Column `column` of every row, rendered as text.
pub fn column_values(table: &Table, column: &str) -> Vec<String> {
    (0..table.len())
        .map(|row| display_cell(table.cell(row, column)))
        .collect()
}

/// Single-sheet job joining on `ID` and copying `Dept`.
pub fn dept_job(primary: &Path, primary_sheet: &str, secondary: &Path, secondary_sheet: &str) -> MergeJob {
    MergeJob {
        primary: WorkbookSelection::new(primary, vec![primary_sheet.to_string()]),
        secondary: WorkbookSelection::new(secondary, vec![secondary_sheet.to_string()]),
        primary_match_fields: vec!["ID".to_string()],
        secondary_match_fields: vec!["ID".to_string()],
        mappings: vec![FieldMapping::same_name("Dept")],
        ..MergeJob::default()
    }
}
