use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    data::{ColumnType, Value},
    error::MergeError,
    table::{Column, Table},
    workbook::{TableReader, TableWriter, WritableWorkbook, missing_sheet},
};

#[derive(Debug, Clone, Default)]
struct StoredWorkbook {
    password: Option<String>,
    sheets: Vec<(String, Table)>,
}

impl StoredWorkbook {
    fn sheet(&self, name: &str) -> Option<&Table> {
        self.sheets.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    fn sheet_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.sheets
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }
}

/// Shared in-memory store of multi-sheet workbooks addressed by path.
///
/// Clones share the same store, so a caller can keep one handle while the
/// merge worker owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbooks {
    books: Arc<Mutex<HashMap<PathBuf, StoredWorkbook>>>,
}

impl MemoryWorkbooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<P, S>(&self, path: P, sheets: Vec<(S, Table)>)
    where
        P: Into<PathBuf>,
        S: Into<String>,
    {
        self.insert_book(path.into(), None, sheets);
    }

    pub fn insert_protected<P, S>(&self, path: P, password: &str, sheets: Vec<(S, Table)>)
    where
        P: Into<PathBuf>,
        S: Into<String>,
    {
        self.insert_book(path.into(), Some(password.to_string()), sheets);
    }

    fn insert_book<S: Into<String>>(
        &self,
        path: PathBuf,
        password: Option<String>,
        sheets: Vec<(S, Table)>,
    ) {
        let sheets = sheets.into_iter().map(|(n, t)| (n.into(), t)).collect();
        self.lock().insert(path, StoredWorkbook { password, sheets });
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Snapshot of one stored sheet.
    pub fn sheet(&self, path: &Path, sheet: &str) -> Option<Table> {
        self.lock().get(path)?.sheet(sheet).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, StoredWorkbook>> {
        self.books.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn open(&self, path: &Path, password: Option<&str>) -> Result<StoredWorkbook, MergeError> {
        let books = self.lock();
        let book = books.get(path).ok_or_else(|| {
            MergeError::io(
                format!("Opening workbook {path:?}"),
                io::Error::new(io::ErrorKind::NotFound, "No such file"),
            )
        })?;
        if let Some(expected) = &book.password {
            if password != Some(expected.as_str()) {
                return Err(MergeError::io(
                    format!("Opening workbook {path:?}"),
                    io::Error::new(io::ErrorKind::PermissionDenied, "Invalid workbook password"),
                ));
            }
        }
        Ok(book.clone())
    }
}

impl TableReader for MemoryWorkbooks {
    fn list_sheets(&self, path: &Path, password: Option<&str>) -> Result<Vec<String>, MergeError> {
        let book = self.open(path, password)?;
        Ok(book.sheets.into_iter().map(|(name, _)| name).collect())
    }

    fn load_sheet(&self, path: &Path, password: Option<&str>, sheet: &str) -> Result<Table, MergeError> {
        let book = self.open(path, password)?;
        book.sheet(sheet)
            .cloned()
            .ok_or_else(|| missing_sheet(sheet, path))
    }
}

impl TableWriter for MemoryWorkbooks {
    fn copy_workbook(&self, source: &Path, dest: &Path) -> Result<(), MergeError> {
        let mut books = self.lock();
        let copy = books.get(source).cloned().ok_or_else(|| {
            MergeError::io(
                format!("Copying {source:?} to {dest:?}"),
                io::Error::new(io::ErrorKind::NotFound, "No such file"),
            )
        })?;
        books.insert(dest.to_path_buf(), copy);
        Ok(())
    }

    fn open_for_merge(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<Box<dyn WritableWorkbook>, MergeError> {
        let book = self.open(path, password)?;
        Ok(Box::new(MemorySession {
            store: self.clone(),
            path: path.to_path_buf(),
            book,
        }))
    }
}

struct MemorySession {
    store: MemoryWorkbooks,
    path: PathBuf,
    book: StoredWorkbook,
}

impl MemorySession {
    fn table_mut(&mut self, sheet: &str) -> Result<&mut Table, MergeError> {
        let path = &self.path;
        self.book
            .sheet_mut(sheet)
            .ok_or_else(|| missing_sheet(sheet, path))
    }
}

impl WritableWorkbook for MemorySession {
    fn has_sheet(&self, sheet: &str) -> bool {
        self.book.sheet(sheet).is_some()
    }

    fn header(&self, sheet: &str) -> Result<Vec<String>, MergeError> {
        self.book
            .sheet(sheet)
            .map(Table::headers)
            .ok_or_else(|| missing_sheet(sheet, &self.path))
    }

    fn get_or_create_column(&mut self, sheet: &str, name: &str) -> Result<usize, MergeError> {
        let table = self.table_mut(sheet)?;
        Ok(match table.column_index(name) {
            Some(idx) => idx,
            None => table.add_column(name, ColumnType::String),
        })
    }

    fn clear_data_rows(&mut self, sheet: &str) -> Result<(), MergeError> {
        let table = self.table_mut(sheet)?;
        *table = Table::new(table.columns().to_vec());
        Ok(())
    }

    fn write_cell(
        &mut self,
        sheet: &str,
        row: usize,
        column: usize,
        value: Option<&Value>,
    ) -> Result<(), MergeError> {
        let table = self.table_mut(sheet)?;
        let width = table.columns().len();
        if column >= width {
            return Err(MergeError::Fatal(format!(
                "Column {column} is outside sheet '{sheet}' ({width} column(s))"
            )));
        }
        while table.len() <= row {
            table.push_row(vec![None; width])?;
        }
        table.set_cell(row, column, value.cloned());
        Ok(())
    }

    fn save(self: Box<Self>) -> Result<(), MergeError> {
        let MemorySession { store, path, book } = *self;
        store.lock().insert(path, book);
        Ok(())
    }
}

/// Convenience for building string columns in tests and embedders.
pub fn string_columns(names: &[&str]) -> Vec<Column> {
    names
        .iter()
        .map(|n| Column::new(*n, ColumnType::String))
        .collect()
}
