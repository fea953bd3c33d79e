//! CSV backend for the workbook collaborator traits.
//!
//! A CSV file is treated as a workbook holding exactly one sheet, named after
//! the file stem (`staff.csv` holds sheet `staff`).
//!
//! - **Delimiter resolution**: `.tsv` files use tab, everything else comma,
//!   unless a delimiter is configured explicitly.
//! - **Encoding**: input decoding and output encoding via `encoding_rs`,
//!   defaulting to UTF-8.
//! - **Types**: column types are inferred losslessly, so rewriting a file
//!   leaves untouched cells byte-for-byte identical.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use anyhow::{Context, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use log::{debug, warn};

use crate::{
    data::{Value, infer_column_types, parse_typed_value},
    error::MergeError,
    merge::{OUTPUT_MARKER, OUTPUT_STAMP_LEN},
    table::{Column, Table},
    workbook::{TableReader, TableWriter, WritableWorkbook, missing_sheet},
};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding, MergeError> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| MergeError::validation(format!("Unknown encoding '{value}'")))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

/// Sheet name of the single sheet a CSV file holds.
///
/// A merge output copy (`staff_merge-result_20250102030405.csv`) keeps the
/// sheet name of the file it was copied from.
pub fn sheet_name_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Sheet1".to_string());
    match stem.rsplit_once(OUTPUT_MARKER) {
        Some((base, stamp))
            if !base.is_empty()
                && stamp.len() == OUTPUT_STAMP_LEN
                && stamp.bytes().all(|b| b.is_ascii_digit()) =>
        {
            base.to_string()
        }
        _ => stem,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CsvWorkbooks {
    delimiter: Option<u8>,
    encoding: &'static Encoding,
}

impl Default for CsvWorkbooks {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: UTF_8,
        }
    }
}

impl CsvWorkbooks {
    pub fn new(delimiter: Option<u8>, encoding: &'static Encoding) -> Self {
        Self {
            delimiter,
            encoding,
        }
    }

    fn check_password(path: &Path, password: Option<&str>) {
        if password.is_some_and(|p| !p.is_empty()) {
            warn!("Ignoring password for {path:?}: CSV files cannot be encrypted");
        }
    }

    fn check_sheet(path: &Path, sheet: &str) -> Result<(), MergeError> {
        if sheet_name_for(path) == sheet {
            Ok(())
        } else {
            Err(missing_sheet(sheet, path))
        }
    }

    fn read_grid(&self, path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), MergeError> {
        let file = File::open(path)
            .map_err(|err| MergeError::io(format!("Opening input file {path:?}"), err))?;
        let delimiter = resolve_delimiter(path, self.delimiter);
        let mut reader = open_csv_reader(BufReader::new(file), delimiter);
        let grid = read_records(&mut reader, self.encoding);
        grid.map_err(|err| MergeError::workbook(format!("Reading CSV file {path:?}"), err))
    }
}

impl TableReader for CsvWorkbooks {
    fn list_sheets(&self, path: &Path, password: Option<&str>) -> Result<Vec<String>, MergeError> {
        Self::check_password(path, password);
        if !path.is_file() {
            return Err(MergeError::io(
                format!("Opening input file {path:?}"),
                std::io::Error::new(std::io::ErrorKind::NotFound, "No such file"),
            ));
        }
        Ok(vec![sheet_name_for(path)])
    }

    fn load_sheet(&self, path: &Path, password: Option<&str>, sheet: &str) -> Result<Table, MergeError> {
        Self::check_password(path, password);
        Self::check_sheet(path, sheet)?;
        let (headers, rows) = self.read_grid(path)?;
        let types = infer_column_types(headers.len(), &rows);
        let columns = headers
            .iter()
            .zip(types.iter())
            .enumerate()
            .map(|(idx, (name, ty))| {
                let name = if name.trim().is_empty() {
                    format!("Column{}", idx + 1)
                } else {
                    name.clone()
                };
                Column::new(name, *ty)
            })
            .collect::<Vec<_>>();

        let mut table = Table::new(columns);
        for (row_idx, raw) in rows.iter().enumerate() {
            let cells = raw
                .iter()
                .zip(types.iter())
                .map(|(value, ty)| parse_typed_value(value, *ty))
                .collect::<anyhow::Result<Vec<_>>>()
                .map_err(|err| {
                    MergeError::workbook(format!("Parsing row {} of {path:?}", row_idx + 2), err)
                })?;
            table.push_row(cells)?;
        }
        debug!(
            "Loaded sheet '{sheet}' from {path:?}: {} row(s), {} column(s)",
            table.len(),
            table.columns().len()
        );
        Ok(table)
    }
}

impl TableWriter for CsvWorkbooks {
    fn open_for_merge(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<Box<dyn WritableWorkbook>, MergeError> {
        Self::check_password(path, password);
        let (headers, rows) = self.read_grid(path)?;
        Ok(Box::new(CsvMergeSession {
            path: path.to_path_buf(),
            sheet: sheet_name_for(path),
            delimiter: resolve_delimiter(path, self.delimiter),
            encoding: self.encoding,
            headers,
            rows,
        }))
    }
}

struct CsvMergeSession {
    path: PathBuf,
    sheet: String,
    delimiter: u8,
    encoding: &'static Encoding,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvMergeSession {
    fn ensure_sheet(&self, sheet: &str) -> Result<(), MergeError> {
        if self.has_sheet(sheet) {
            Ok(())
        } else {
            Err(missing_sheet(sheet, &self.path))
        }
    }

    fn render(&self) -> anyhow::Result<Vec<u8>> {
        let width = self
            .rows
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .max(self.headers.len());
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .quote_style(QuoteStyle::Necessary)
            .double_quote(true)
            .from_writer(Vec::new());
        let mut padded = self.headers.clone();
        padded.resize(width, String::new());
        writer.write_record(&padded).context("Writing header row")?;
        for row in &self.rows {
            padded.clear();
            padded.extend(row.iter().cloned());
            padded.resize(width, String::new());
            writer.write_record(&padded).context("Writing data row")?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| anyhow!("Flushing CSV output: {}", err.error()))?;
        if self.encoding == UTF_8 {
            return Ok(bytes);
        }
        let text = String::from_utf8(bytes).context("CSV output is not valid UTF-8")?;
        let (encoded, _, had_errors) = self.encoding.encode(&text);
        if had_errors {
            return Err(anyhow!(
                "Failed to encode text using {}",
                self.encoding.name()
            ));
        }
        Ok(encoded.into_owned())
    }
}

impl WritableWorkbook for CsvMergeSession {
    fn has_sheet(&self, sheet: &str) -> bool {
        self.sheet == sheet
    }

    fn header(&self, sheet: &str) -> Result<Vec<String>, MergeError> {
        self.ensure_sheet(sheet)?;
        Ok(self.headers.clone())
    }

    fn get_or_create_column(&mut self, sheet: &str, name: &str) -> Result<usize, MergeError> {
        self.ensure_sheet(sheet)?;
        if let Some(idx) = self.headers.iter().position(|h| !h.is_empty() && h == name) {
            return Ok(idx);
        }
        self.headers.push(name.to_string());
        Ok(self.headers.len() - 1)
    }

    fn clear_data_rows(&mut self, sheet: &str) -> Result<(), MergeError> {
        self.ensure_sheet(sheet)?;
        self.rows.clear();
        Ok(())
    }

    fn write_cell(
        &mut self,
        sheet: &str,
        row: usize,
        column: usize,
        value: Option<&Value>,
    ) -> Result<(), MergeError> {
        self.ensure_sheet(sheet)?;
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= column {
            cells.resize(column + 1, String::new());
        }
        cells[column] = value.map(Value::as_display).unwrap_or_default();
        Ok(())
    }

    fn save(self: Box<Self>) -> Result<(), MergeError> {
        let bytes = self
            .render()
            .map_err(|err| MergeError::workbook(format!("Rendering {:?}", self.path), err))?;
        std::fs::write(&self.path, bytes)
            .map_err(|err| MergeError::io(format!("Saving output file {:?}", self.path), err))
    }
}

fn open_csv_reader<R: Read>(reader: R, delimiter: u8) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false)
        .from_reader(reader)
}

fn read_records<R: Read>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> anyhow::Result<(Vec<String>, Vec<Vec<String>>)> {
    let header_record = reader.byte_headers()?.clone();
    let headers = decode_record(&header_record, encoding)?;
    let mut rows = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
        rows.push(decode_record(&record, encoding)?);
    }
    Ok((headers, rows))
}

fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> anyhow::Result<Vec<String>> {
    record
        .iter()
        .map(|field| {
            let (text, _, had_errors) = encoding.decode(field);
            if had_errors {
                Err(anyhow!(
                    "Failed to decode text with encoding {}",
                    encoding.name()
                ))
            } else {
                Ok(text.into_owned())
            }
        })
        .collect()
}
