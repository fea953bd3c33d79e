use std::borrow::Cow;
use std::fmt::Write as _;

use crate::{
    data::{ColumnType, Value, display_cell},
    error::MergeError,
};

/// One positional row; `None` marks a null or missing cell.
pub type Row = Vec<Option<Value>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// In-memory sheet: named columns plus rows that all share the same width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_headers<S: AsRef<str>>(headers: &[S]) -> Self {
        Self::new(
            headers
                .iter()
                .map(|h| Column::new(h.as_ref(), ColumnType::String))
                .collect(),
        )
    }

    /// Builds a string-typed table; empty strings become null cells.
    pub fn from_strings<S: AsRef<str>>(headers: &[S], rows: &[Vec<&str>]) -> Self {
        let mut table = Self::from_headers(headers);
        for row in rows {
            let mut cells: Row = row
                .iter()
                .map(|v| (!v.is_empty()).then(|| Value::from(*v)))
                .collect();
            cells.resize(table.columns.len(), None);
            table.rows.push(cells);
        }
        table
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn headers(&self) -> Vec<String> {
        self.column_names().map(str::to_string).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> Option<&Row> {
        self.rows.get(idx)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Row) -> Result<(), MergeError> {
        if row.len() != self.columns.len() {
            return Err(MergeError::validation(format!(
                "Row has {} cell(s) but the table declares {} column(s)",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_ref()
    }

    pub fn set_cell(&mut self, row: usize, column: usize, value: Option<Value>) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell = value;
        }
    }

    /// Appends a column, padding every existing row with nulls.
    pub fn add_column(&mut self, name: impl Into<String>, data_type: ColumnType) -> usize {
        self.columns.push(Column::new(name, data_type));
        for row in &mut self.rows {
            row.push(None);
        }
        self.columns.len() - 1
    }

    /// Copy of this table keeping its schema and the rows selected by `keep`.
    pub fn retain_rows<F>(&self, mut keep: F) -> Result<Table, MergeError>
    where
        F: FnMut(&Row) -> Result<bool, MergeError>,
    {
        let mut rows = Vec::new();
        for row in &self.rows {
            if keep(row)? {
                rows.push(row.clone());
            }
        }
        Ok(Table {
            columns: self.columns.clone(),
            rows,
        })
    }

    pub fn head(&self, limit: usize) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(limit).cloned().collect(),
        }
    }

    pub fn text_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|v| display_cell(v.as_ref())).collect())
            .collect()
    }
}

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(cell));
        }
    }

    for width in &mut widths {
        *width = (*width).max(1);
    }

    let mut output = String::new();

    let header_line = format_row(headers, &widths);
    let _ = writeln!(output, "{header_line}");

    let separator_widths = widths.iter().map(|w| (*w).max(3)).collect::<Vec<usize>>();
    let separator_cells = separator_widths
        .iter()
        .map(|w| "-".repeat(*w))
        .collect::<Vec<_>>();
    let separator_line = format_row(&separator_cells, &separator_widths);
    let _ = writeln!(output, "{separator_line}");

    for row in rows {
        let row_line = format_row(row, &widths);
        let _ = writeln!(output, "{row_line}");
    }

    output
}

pub fn print_table(table: &Table) {
    let rendered = render_table(&table.headers(), &table.text_rows());
    print!("{rendered}");
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let mut cells = Vec::with_capacity(values.len());
    for (idx, value) in values.iter().enumerate() {
        if idx >= widths.len() {
            break;
        }
        let sanitized = sanitize_cell(value);
        let display = display_width(sanitized.as_ref());
        let mut cell = sanitized.into_owned();
        let padding = widths
            .get(idx)
            .copied()
            .unwrap_or_default()
            .saturating_sub(display);
        if padding > 0 {
            cell.push_str(&" ".repeat(padding));
        }
        cells.push(cell);
    }
    let mut line = cells.join("  ");
    while line.ends_with(' ') {
        line.pop();
    }
    line
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
