use proptest::prelude::*;
use sheet_matcher::{
    data::{ColumnType, Value},
    key::{KEY_SEPARATOR, KeyColumns, composite_key, is_usable_key},
    table::{Column, Table},
};

fn typed_table() -> Table {
    let mut table = Table::new(vec![
        Column::new("Code", ColumnType::Integer),
        Column::new("Region", ColumnType::String),
    ]);
    table
        .push_row(vec![Some(Value::Integer(7)), Some(Value::from("  North "))])
        .unwrap();
    table
}

#[test]
fn missing_first_field_keeps_empty_segment() {
    let table = Table::from_strings(&["a", "b"], &[vec!["", "X"]]);
    let key = composite_key(&table, table.row(0), &["a", "b"]);
    assert_eq!(key, "||X");
}

#[test]
fn field_absent_from_schema_is_an_empty_segment() {
    let table = Table::from_strings(&["b"], &[vec!["X"]]);
    assert_eq!(composite_key(&table, table.row(0), &["ghost", "b"]), "||X");
}

#[test]
fn values_are_trimmed_and_rendered_as_text() {
    let table = typed_table();
    let key = composite_key(&table, table.row(0), &["Code", "Region"]);
    assert_eq!(key, format!("7{KEY_SEPARATOR}North"));
}

#[test]
fn no_fields_or_no_row_give_empty_key() {
    let table = typed_table();
    let none: [&str; 0] = [];
    assert_eq!(composite_key(&table, table.row(0), &none), "");
    assert_eq!(composite_key(&table, None, &["Code"]), "");
    assert!(!is_usable_key(""));
}

#[test]
fn all_empty_multi_field_key_is_still_usable() {
    let table = Table::from_strings(&["a", "b"], &[vec!["", ""]]);
    let key = composite_key(&table, table.row(0), &["a", "b"]);
    assert_eq!(key, "||");
    assert!(is_usable_key(&key));
}

#[test]
fn single_blank_field_key_is_not_usable() {
    let table = Table::from_strings(&["a"], &[vec!["   "]]);
    let key = composite_key(&table, table.row(0), &["a"]);
    assert!(!is_usable_key(&key));
}

#[test]
fn resolved_columns_report_indices() {
    let table = typed_table();
    let columns = KeyColumns::resolve(&table, &["Region", "ghost"]);
    assert_eq!(columns.fields(), ["Region".to_string(), "ghost".to_string()]);
    assert_eq!(columns.column_index(0), Some(1));
    assert_eq!(columns.column_index(1), None);
}

proptest! {
    #[test]
    fn key_is_deterministic(a in "[A-Za-z0-9 ]{0,8}", b in "[A-Za-z0-9 ]{0,8}") {
        let table = Table::from_strings(&["a", "b"], &[vec![a.as_str(), b.as_str()]]);
        let first = composite_key(&table, table.row(0), &["a", "b"]);
        let second = composite_key(&table, table.row(0), &["a", "b"]);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn key_has_one_segment_per_field(a in "[A-Za-z0-9]{0,8}", b in "[A-Za-z0-9]{0,8}") {
        let table = Table::from_strings(&["a", "b"], &[vec![a.as_str(), b.as_str()]]);
        let key = composite_key(&table, table.row(0), &["a", "b"]);
        prop_assert_eq!(key, format!("{a}||{b}"));
    }
}
