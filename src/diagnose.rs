//! Read-only match diagnostics over a small sample of both tables.
//!
//! Keys and lookups go through [`KeyColumns`] and [`JoinIndex`], the same
//! primitives the merge uses, so a diagnosed key always matches the way the
//! real merge would match it.

use std::fmt::{self, Write as _};

use crate::{
    config::{MergeJob, WorkbookSelection},
    data::ColumnType,
    error::MergeError,
    index::JoinIndex,
    key::{KeyColumns, is_usable_key},
    table::Table,
    workbook::TableReader,
};

pub const DEFAULT_SAMPLE_ROWS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldSample {
    /// The table has no such column.
    Missing,
    Null,
    Value { text: String, type_name: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeySample {
    pub key: String,
    pub fields: Vec<(String, FieldSample)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMismatch {
    pub primary_field: String,
    pub primary_type: ColumnType,
    pub secondary_field: String,
    pub secondary_type: ColumnType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched,
    Unmatched,
    InvalidKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleMatch {
    pub key: String,
    pub outcome: MatchOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticReport {
    pub primary_fields: Vec<String>,
    pub secondary_fields: Vec<String>,
    pub primary_samples: Vec<KeySample>,
    pub secondary_samples: Vec<KeySample>,
    pub type_mismatches: Vec<TypeMismatch>,
    pub matches: Vec<SampleMatch>,
    /// Sample secondary rows whose key was already indexed.
    pub duplicate_keys: usize,
}

impl DiagnosticReport {
    pub fn matched_count(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| m.outcome == MatchOutcome::Matched)
            .count()
    }

    /// Percentage of sampled primary rows that found a partner.
    pub fn match_rate(&self) -> f64 {
        if self.matches.is_empty() {
            0.0
        } else {
            self.matched_count() as f64 * 100.0 / self.matches.len() as f64
        }
    }
}

/// Builds the report from the first `sample_rows` rows of each table.
pub fn diagnose<S: AsRef<str>>(
    primary: &Table,
    secondary: &Table,
    primary_fields: &[S],
    secondary_fields: &[S],
    sample_rows: usize,
) -> DiagnosticReport {
    let primary = primary.head(sample_rows);
    let secondary = secondary.head(sample_rows);
    let primary_keys = KeyColumns::resolve(&primary, primary_fields);
    let secondary_keys = KeyColumns::resolve(&secondary, secondary_fields);

    let type_mismatches = primary_fields
        .iter()
        .zip(secondary_fields)
        .filter_map(|(p, s)| {
            let left = primary.column(p.as_ref())?;
            let right = secondary.column(s.as_ref())?;
            (left.data_type != right.data_type).then(|| TypeMismatch {
                primary_field: left.name.clone(),
                primary_type: left.data_type,
                secondary_field: right.name.clone(),
                secondary_type: right.data_type,
            })
        })
        .collect();

    let index = JoinIndex::build(&secondary, secondary_fields);
    let matches = primary
        .rows()
        .iter()
        .map(|row| {
            let key = primary_keys.key_for(Some(row));
            let outcome = if !is_usable_key(&key) {
                MatchOutcome::InvalidKey
            } else if index.contains(&key) {
                MatchOutcome::Matched
            } else {
                MatchOutcome::Unmatched
            };
            SampleMatch { key, outcome }
        })
        .collect();

    DiagnosticReport {
        primary_fields: primary_keys.fields().to_vec(),
        secondary_fields: secondary_keys.fields().to_vec(),
        primary_samples: samples(&primary, &primary_keys),
        secondary_samples: samples(&secondary, &secondary_keys),
        type_mismatches,
        matches,
        duplicate_keys: index.duplicate_count(),
    }
}

/// Loads the first selected sheet of each side and diagnoses the job's match fields.
pub fn diagnose_workbooks<R: TableReader + ?Sized>(
    reader: &R,
    job: &MergeJob,
    sample_rows: usize,
) -> Result<DiagnosticReport, MergeError> {
    let primary = load_first_sheet(reader, &job.primary, "primary")?;
    let secondary = load_first_sheet(reader, &job.secondary, "secondary")?;
    Ok(diagnose(
        &primary,
        &secondary,
        &job.primary_match_fields,
        &job.secondary_match_fields,
        sample_rows,
    ))
}

fn load_first_sheet<R: TableReader + ?Sized>(
    reader: &R,
    selection: &WorkbookSelection,
    side: &str,
) -> Result<Table, MergeError> {
    let sheet = selection
        .sheets
        .first()
        .ok_or_else(|| MergeError::validation(format!("No {side} sheets were selected")))?;
    reader.load_sheet(&selection.path, selection.password(), sheet)
}

fn samples(table: &Table, keys: &KeyColumns) -> Vec<KeySample> {
    table
        .rows()
        .iter()
        .map(|row| KeySample {
            key: keys.key_for(Some(row)),
            fields: keys
                .fields()
                .iter()
                .enumerate()
                .map(|(pos, field)| {
                    let sample = match keys.column_index(pos) {
                        None => FieldSample::Missing,
                        Some(idx) => match row.get(idx).and_then(Option::as_ref) {
                            None => FieldSample::Null,
                            Some(value) => FieldSample::Value {
                                text: value.as_display(),
                                type_name: value.type_name(),
                            },
                        },
                    };
                    (field.clone(), sample)
                })
                .collect(),
        })
        .collect()
}

impl fmt::Display for FieldSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSample::Missing => f.write_str("<missing column>"),
            FieldSample::Null => f.write_str("'' (null)"),
            FieldSample::Value { text, type_name } => write!(f, "'{text}' ({type_name})"),
        }
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        let _ = writeln!(out, "Match field diagnostics");
        let _ = writeln!(out, "=======================");
        let _ = writeln!(out, "Primary fields: {}", self.primary_fields.join(", "));
        let _ = writeln!(out, "Secondary fields: {}", self.secondary_fields.join(", "));

        for (title, rows) in [
            ("Primary sample", &self.primary_samples),
            ("Secondary sample", &self.secondary_samples),
        ] {
            let _ = writeln!(out);
            let _ = writeln!(out, "{title}:");
            for sample in rows {
                let values = sample
                    .fields
                    .iter()
                    .map(|(field, value)| format!("{field}={value}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = writeln!(out, "  key '{}': [{values}]", sample.key);
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Potential problems:");
        if self.type_mismatches.is_empty() && self.duplicate_keys == 0 {
            let _ = writeln!(out, "  none detected");
        }
        for mismatch in &self.type_mismatches {
            let _ = writeln!(
                out,
                "  warning: type mismatch between primary '{}' ({}) and secondary '{}' ({})",
                mismatch.primary_field,
                mismatch.primary_type,
                mismatch.secondary_field,
                mismatch.secondary_type
            );
        }
        if self.duplicate_keys > 0 {
            let _ = writeln!(
                out,
                "  warning: {} secondary sample row(s) repeat an earlier key and would be ignored",
                self.duplicate_keys
            );
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Sample matching:");
        for sample in &self.matches {
            let line = match sample.outcome {
                MatchOutcome::Matched => format!("  matched: key '{}'", sample.key),
                MatchOutcome::Unmatched => format!("  unmatched: key '{}'", sample.key),
                MatchOutcome::InvalidKey => "  invalid key: empty".to_string(),
            };
            let _ = writeln!(out, "{line}");
        }
        let _ = writeln!(out);
        let _ = write!(
            out,
            "Sample match rate: {}/{} ({:.2}%)",
            self.matched_count(),
            self.matches.len(),
            self.match_rate()
        );
        f.write_str(&out)
    }
}
