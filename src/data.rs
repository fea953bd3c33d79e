use std::fmt;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ColumnType {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::String => "String",
            ColumnType::Integer => "Integer",
            ColumnType::Float => "Float",
            ColumnType::Boolean => "Boolean",
            ColumnType::Date => "Date",
            ColumnType::DateTime => "DateTime",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Value {
    /// Textual form of the value as the table materialises it.
    ///
    /// Filters and composite keys compare this form, never the typed value.
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Boolean(b) => b.to_string(),
            Value::Date(d) => d.format(DATE_FORMAT).to_string(),
            Value::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
        }
    }

    /// Runtime type label reported by diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.column_type().as_str()
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::String(_) => ColumnType::String,
            Value::Integer(_) => ColumnType::Integer,
            Value::Float(_) => ColumnType::Float,
            Value::Boolean(_) => ColumnType::Boolean,
            Value::Date(_) => ColumnType::Date,
            Value::DateTime(_) => ColumnType::DateTime,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

pub fn display_cell(value: Option<&Value>) -> String {
    value.map(Value::as_display).unwrap_or_default()
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| anyhow!("Failed to parse '{value}' as date"))
}

pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[DATETIME_FORMAT, "%Y-%m-%dT%H:%M:%S"];
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as datetime"))
}

pub fn parse_typed_value(value: &str, ty: ColumnType) -> Result<Option<Value>> {
    if value.is_empty() {
        return Ok(None);
    }
    let parsed = match ty {
        ColumnType::String => Value::String(value.to_string()),
        ColumnType::Integer => {
            let parsed: i64 = value
                .parse()
                .with_context(|| format!("Failed to parse '{value}' as integer"))?;
            Value::Integer(parsed)
        }
        ColumnType::Float => {
            let parsed: f64 = value
                .parse()
                .with_context(|| format!("Failed to parse '{value}' as float"))?;
            Value::Float(parsed)
        }
        ColumnType::Boolean => match value {
            "true" => Value::Boolean(true),
            "false" => Value::Boolean(false),
            _ => bail!("Failed to parse '{value}' as boolean"),
        },
        ColumnType::Date => Value::Date(parse_naive_date(value)?),
        ColumnType::DateTime => Value::DateTime(parse_naive_datetime(value)?),
    };
    Ok(Some(parsed))
}

#[derive(Debug, Clone)]
struct TypeCandidate {
    possible_integer: bool,
    possible_float: bool,
    possible_boolean: bool,
    possible_date: bool,
    possible_datetime: bool,
    seen_value: bool,
}

impl TypeCandidate {
    fn new() -> Self {
        Self {
            possible_integer: true,
            possible_float: true,
            possible_boolean: true,
            possible_date: true,
            possible_datetime: true,
            seen_value: false,
        }
    }

    fn observe(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        self.seen_value = true;
        for (flag, ty) in [
            (&mut self.possible_boolean, ColumnType::Boolean),
            (&mut self.possible_integer, ColumnType::Integer),
            (&mut self.possible_float, ColumnType::Float),
            (&mut self.possible_date, ColumnType::Date),
            (&mut self.possible_datetime, ColumnType::DateTime),
        ] {
            if *flag && !round_trips(raw, ty) {
                *flag = false;
            }
        }
    }

    fn decide(&self) -> ColumnType {
        if !self.seen_value {
            ColumnType::String
        } else if self.possible_boolean {
            ColumnType::Boolean
        } else if self.possible_integer {
            ColumnType::Integer
        } else if self.possible_float {
            ColumnType::Float
        } else if self.possible_date {
            ColumnType::Date
        } else if self.possible_datetime {
            ColumnType::DateTime
        } else {
            ColumnType::String
        }
    }
}

// A typed column must render every sample back to its original text.
fn round_trips(raw: &str, ty: ColumnType) -> bool {
    matches!(parse_typed_value(raw, ty), Ok(Some(value)) if value.as_display() == raw)
}

/// Infers one declared type per column from raw text rows.
pub fn infer_column_types(column_count: usize, rows: &[Vec<String>]) -> Vec<ColumnType> {
    let mut candidates = vec![TypeCandidate::new(); column_count];
    for row in rows {
        for (idx, raw) in row.iter().enumerate().take(column_count) {
            candidates[idx].observe(raw);
        }
    }
    candidates.iter().map(TypeCandidate::decide).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(values: &[&[&str]]) -> Vec<Vec<String>> {
        values
            .iter()
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect()
    }

    #[test]
    fn parse_typed_value_handles_empty_and_boolean_inputs() {
        assert_eq!(parse_typed_value("", ColumnType::Integer).unwrap(), None);
        assert_eq!(
            parse_typed_value("true", ColumnType::Boolean).unwrap(),
            Some(Value::Boolean(true))
        );
        assert!(parse_typed_value("maybe", ColumnType::Boolean).is_err());
    }

    #[test]
    fn float_display_drops_integral_fraction() {
        assert_eq!(Value::Float(3.0).as_display(), "3");
        assert_eq!(Value::Float(2.5).as_display(), "2.5");
    }

    #[test]
    fn inference_detects_integer_and_date_columns() {
        let sample = rows(&[&["1", "2024-01-01", "x"], &["42", "2024-02-29", ""]]);
        assert_eq!(
            infer_column_types(3, &sample),
            vec![ColumnType::Integer, ColumnType::Date, ColumnType::String]
        );
    }

    #[test]
    fn inference_keeps_lossy_columns_as_strings() {
        let sample = rows(&[&["007", "1.50", "yes"], &["12", "2.25", "no"]]);
        assert_eq!(
            infer_column_types(3, &sample),
            vec![ColumnType::String, ColumnType::String, ColumnType::String]
        );
    }

    #[test]
    fn inference_defaults_empty_columns_to_string() {
        let sample = rows(&[&[""], &[""]]);
        assert_eq!(infer_column_types(1, &sample), vec![ColumnType::String]);
    }

    #[test]
    fn type_names_follow_variants() {
        assert_eq!(Value::from("a").type_name(), "String");
        assert_eq!(Value::from(3_i64).type_name(), "Integer");
    }
}
