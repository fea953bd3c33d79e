use crate::table::{Row, Table};

pub const KEY_SEPARATOR: &str = "||";

/// Match fields resolved against one table schema.
///
/// Fields the table lacks stay in place as empty segments so that multi-field
/// keys keep their positional alignment.
#[derive(Debug, Clone)]
pub struct KeyColumns {
    fields: Vec<String>,
    indices: Vec<Option<usize>>,
}

impl KeyColumns {
    pub fn resolve<S: AsRef<str>>(table: &Table, fields: &[S]) -> Self {
        Self {
            fields: fields.iter().map(|f| f.as_ref().to_string()).collect(),
            indices: fields
                .iter()
                .map(|f| table.column_index(f.as_ref()))
                .collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn column_index(&self, position: usize) -> Option<usize> {
        self.indices.get(position).copied().flatten()
    }

    /// Trimmed textual parts of the key, one per field.
    pub fn parts(&self, row: &Row) -> Vec<String> {
        self.indices
            .iter()
            .map(|idx| {
                idx.and_then(|i| row.get(i))
                    .and_then(|cell| cell.as_ref())
                    .map(|value| value.as_display().trim().to_string())
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Composite key for `row`; empty when there are no fields or no row.
    pub fn key_for(&self, row: Option<&Row>) -> String {
        match row {
            Some(row) if !self.indices.is_empty() => self.parts(row).join(KEY_SEPARATOR),
            _ => String::new(),
        }
    }
}

pub fn composite_key<S: AsRef<str>>(table: &Table, row: Option<&Row>, fields: &[S]) -> String {
    KeyColumns::resolve(table, fields).key_for(row)
}

/// Empty keys never enter or match a join index.
pub fn is_usable_key(key: &str) -> bool {
    !key.is_empty()
}
