//! Row filtering over the textual form of cell values.
//!
//! Conditions are folded strictly left to right: each condition joins the
//! accumulated result of everything before it through its own logical
//! operator, so `[a, or b, and c]` evaluates as `(a OR b) AND c`. Conditions
//! naming a column the table does not have are dropped before folding.

use std::{borrow::Cow, cmp::Reverse};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    data::display_cell,
    error::MergeError,
    table::{Row, Table},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum FilterOperator {
    #[default]
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterCondition {
    pub field: String,
    #[serde(default)]
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: String,
    /// How this condition joins the conditions before it.
    #[serde(default)]
    pub logical_operator: LogicalOperator,
}

impl FilterCondition {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            logical_operator: LogicalOperator::And,
        }
    }

    pub fn or(mut self) -> Self {
        self.logical_operator = LogicalOperator::Or;
        self
    }

    pub fn and(mut self) -> Self {
        self.logical_operator = LogicalOperator::And;
        self
    }

    fn test(&self, cell: &str) -> bool {
        use FilterOperator::*;
        let needle = self.value.as_str();
        match self.operator {
            Equals => cell == needle,
            NotEquals => cell != needle,
            Contains => cell.contains(needle),
            NotContains => !cell.contains(needle),
            StartsWith => cell.starts_with(needle),
            EndsWith => cell.ends_with(needle),
            GreaterThan => cell > needle,
            LessThan => cell < needle,
            GreaterThanOrEqual => cell >= needle,
            LessThanOrEqual => cell <= needle,
            IsNull => cell.is_empty(),
            IsNotNull => !cell.is_empty(),
        }
    }
}

#[derive(Debug)]
struct CompiledTerm<'a> {
    column: usize,
    combine: LogicalOperator,
    condition: &'a FilterCondition,
}

/// Predicate over the rows of one table schema.
#[derive(Debug)]
pub struct CompiledFilter<'a> {
    terms: Vec<CompiledTerm<'a>>,
    width: usize,
}

impl<'a> CompiledFilter<'a> {
    pub fn compile(conditions: &'a [FilterCondition], table: &Table) -> Self {
        let mut terms = Vec::with_capacity(conditions.len());
        for condition in conditions {
            match table.column_index(&condition.field) {
                Some(column) => terms.push(CompiledTerm {
                    column,
                    combine: condition.logical_operator,
                    condition,
                }),
                None => debug!(
                    "Dropping filter on '{}': column not present in table",
                    condition.field
                ),
            }
        }
        Self {
            terms,
            width: table.columns().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn matches(&self, row: &Row) -> Result<bool, MergeError> {
        if row.len() != self.width {
            return Err(MergeError::Evaluation(format!(
                "Row has {} cell(s) but the filter was compiled for {} column(s)",
                row.len(),
                self.width
            )));
        }
        let mut terms = self.terms.iter();
        let Some(first) = terms.next() else {
            return Ok(true);
        };
        let mut result = first.evaluate(row);
        for term in terms {
            result = match term.combine {
                LogicalOperator::And => result && term.evaluate(row),
                LogicalOperator::Or => result || term.evaluate(row),
            };
        }
        Ok(result)
    }
}

impl CompiledTerm<'_> {
    fn evaluate(&self, row: &Row) -> bool {
        let text = display_cell(row[self.column].as_ref());
        self.condition.test(&text)
    }
}

/// Rows of `table` satisfying the combined predicate, in their original order.
///
/// Returns the input untouched when no condition applies to the table.
pub fn apply_filters<'t>(
    table: &'t Table,
    conditions: &[FilterCondition],
) -> Result<Cow<'t, Table>, MergeError> {
    let filter = CompiledFilter::compile(conditions, table);
    if filter.is_empty() {
        return Ok(Cow::Borrowed(table));
    }
    let filtered = table.retain_rows(|row| filter.matches(row))?;
    debug!(
        "Filters kept {}/{} row(s) using {} condition(s)",
        filtered.len(),
        table.len(),
        filter.len()
    );
    Ok(Cow::Owned(filtered))
}

pub fn parse_filters(filters: &[String]) -> Result<Vec<FilterCondition>, MergeError> {
    filters.iter().map(|f| parse_filter(f)).collect()
}

/// Operators that take a value. The one appearing first in the text wins,
/// the longer token on a tie (`>=` over `>`).
const BINARY_OPERATORS: [(&str, FilterOperator); 10] = [
    (" !contains ", FilterOperator::NotContains),
    (" contains ", FilterOperator::Contains),
    (" startswith ", FilterOperator::StartsWith),
    (" endswith ", FilterOperator::EndsWith),
    ("!=", FilterOperator::NotEquals),
    (">=", FilterOperator::GreaterThanOrEqual),
    ("<=", FilterOperator::LessThanOrEqual),
    ("=", FilterOperator::Equals),
    (">", FilterOperator::GreaterThan),
    ("<", FilterOperator::LessThan),
];

/// Parses `[and:|or:]<field> <op> <value>`.
fn parse_filter(filter: &str) -> Result<FilterCondition, MergeError> {
    let mut trimmed = filter.trim();
    if trimmed.is_empty() {
        return Err(MergeError::Evaluation("Empty filter expression".into()));
    }

    let mut logical = LogicalOperator::And;
    let lowered = trimmed.to_ascii_lowercase();
    if lowered.starts_with("or:") {
        logical = LogicalOperator::Or;
        trimmed = trimmed[3..].trim_start();
    } else if lowered.starts_with("and:") {
        trimmed = trimmed[4..].trim_start();
    }

    // lowercasing is ASCII-only, so offsets in `lowered` are valid in `trimmed`
    let lowered = trimmed.to_ascii_lowercase();
    let earliest = BINARY_OPERATORS
        .iter()
        .filter_map(|(needle, op)| lowered.find(needle).map(|idx| (idx, needle.len(), *op)))
        .min_by_key(|(idx, len, _)| (*idx, Reverse(*len)));
    if let Some((idx, len, op)) = earliest {
        let left = trimmed[..idx].trim();
        let right = trimmed[idx + len..].trim();
        return build(left, op, unquote(right), logical, filter);
    }

    for (needle, op) in [
        (" isnull", FilterOperator::IsNull),
        (" notnull", FilterOperator::IsNotNull),
    ] {
        if lowered.ends_with(needle) {
            let field = trimmed[..trimmed.len() - needle.len()].trim();
            return build(field, op, "", logical, filter);
        }
    }

    Err(MergeError::Evaluation(format!(
        "Failed to parse filter expression '{}'",
        filter.trim()
    )))
}

fn build(
    field: &str,
    operator: FilterOperator,
    value: &str,
    logical_operator: LogicalOperator,
    raw: &str,
) -> Result<FilterCondition, MergeError> {
    if field.is_empty() {
        return Err(MergeError::Evaluation(format!(
            "Filter expression '{}' is missing a field name",
            raw.trim()
        )));
    }
    Ok(FilterCondition {
        field: field.to_string(),
        operator,
        value: value.to_string(),
        logical_operator,
    })
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comparison_with_logical_prefix() {
        let parsed = parse_filter("or: Age >= '30'").unwrap();
        assert_eq!(parsed.field, "Age");
        assert_eq!(parsed.operator, FilterOperator::GreaterThanOrEqual);
        assert_eq!(parsed.value, "30");
        assert_eq!(parsed.logical_operator, LogicalOperator::Or);
    }

    #[test]
    fn parses_word_operators_case_insensitively() {
        let parsed = parse_filter("City STARTSWITH New").unwrap();
        assert_eq!(parsed.operator, FilterOperator::StartsWith);
        assert_eq!(parsed.value, "New");

        let negated = parse_filter("Name !contains \"test\"").unwrap();
        assert_eq!(negated.operator, FilterOperator::NotContains);
        assert_eq!(negated.value, "test");
    }

    #[test]
    fn operator_appearing_first_splits_field_from_value() {
        let parsed = parse_filter("Note > a=b").unwrap();
        assert_eq!(parsed.field, "Note");
        assert_eq!(parsed.operator, FilterOperator::GreaterThan);
        assert_eq!(parsed.value, "a=b");

        let parsed = parse_filter("Email = x contains y").unwrap();
        assert_eq!(parsed.field, "Email");
        assert_eq!(parsed.operator, FilterOperator::Equals);
        assert_eq!(parsed.value, "x contains y");

        let parsed = parse_filter("Title contains <b>").unwrap();
        assert_eq!(parsed.operator, FilterOperator::Contains);
        assert_eq!(parsed.value, "<b>");

        let parsed = parse_filter("Code != 7").unwrap();
        assert_eq!(parsed.operator, FilterOperator::NotEquals);
        assert_eq!(parsed.value, "7");
    }

    #[test]
    fn parses_null_checks() {
        let parsed = parse_filter("Email isnull").unwrap();
        assert_eq!(parsed.field, "Email");
        assert_eq!(parsed.operator, FilterOperator::IsNull);

        let parsed = parse_filter("and: Email notnull").unwrap();
        assert_eq!(parsed.operator, FilterOperator::IsNotNull);
        assert_eq!(parsed.logical_operator, LogicalOperator::And);
    }

    #[test]
    fn rejects_expressions_without_operator_or_field() {
        assert!(parse_filter("just words").is_err());
        assert!(parse_filter("= 5").is_err());
        assert!(parse_filter("  ").is_err());
    }
}
