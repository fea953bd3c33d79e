use std::collections::{HashMap, hash_map::Entry};

use log::debug;

use crate::{
    key::{KeyColumns, is_usable_key},
    table::Table,
};

/// Location of an indexed row: the position of its sheet in the indexed set
/// and the row offset inside that sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowRef {
    pub sheet: usize,
    pub row: usize,
}

/// Lookup from composite key to the first row carrying it.
///
/// Later rows with an already indexed key are dropped and only counted.
#[derive(Debug, Clone, Default)]
pub struct JoinIndex {
    entries: HashMap<String, RowRef>,
    duplicates: usize,
    blank_keys: usize,
}

impl JoinIndex {
    pub fn build<S: AsRef<str>>(table: &Table, key_fields: &[S]) -> Self {
        Self::build_multi([table], key_fields)
    }

    /// Builds one index over several sheets, scanning them in the given order.
    pub fn build_multi<'t, I, S>(tables: I, key_fields: &[S]) -> Self
    where
        I: IntoIterator<Item = &'t Table>,
        S: AsRef<str>,
    {
        let mut index = JoinIndex::default();
        for (sheet, table) in tables.into_iter().enumerate() {
            let columns = KeyColumns::resolve(table, key_fields);
            for (row, cells) in table.rows().iter().enumerate() {
                index.insert(columns.key_for(Some(cells)), RowRef { sheet, row });
            }
        }
        if index.duplicates > 0 {
            debug!(
                "Join index dropped {} row(s) with duplicate keys",
                index.duplicates
            );
        }
        index
    }

    fn insert(&mut self, key: String, location: RowRef) {
        if !is_usable_key(&key) {
            self.blank_keys += 1;
            return;
        }
        match self.entries.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(location);
            }
            Entry::Occupied(_) => self.duplicates += 1,
        }
    }

    pub fn find(&self, key: &str) -> Option<RowRef> {
        if !is_usable_key(key) {
            return None;
        }
        self.entries.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicates
    }

    pub fn blank_key_count(&self) -> usize {
        self.blank_keys
    }
}
