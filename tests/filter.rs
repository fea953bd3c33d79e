use sheet_matcher::{
    data::{ColumnType, Value},
    filter::{CompiledFilter, FilterCondition, FilterOperator, apply_filters, parse_filters},
    table::{Column, Table},
};

fn people() -> Table {
    Table::from_strings(
        &["Name", "Age", "City"],
        &[
            vec!["row1", "25", "NY"],
            vec!["row2", "35", "LA"],
            vec!["row3", "40", "NY"],
        ],
    )
}

fn names(table: &Table) -> Vec<String> {
    (0..table.len())
        .map(|row| table.cell(row, "Name").map(Value::as_display).unwrap_or_default())
        .collect()
}

#[test]
fn and_then_or_folds_left_to_right() {
    let table = people();
    let conditions = vec![
        FilterCondition::new("Age", FilterOperator::GreaterThan, "30"),
        FilterCondition::new("City", FilterOperator::Equals, "NY").or(),
    ];
    let filtered = apply_filters(&table, &conditions).unwrap();
    assert_eq!(names(&filtered), ["row1", "row2", "row3"]);
}

#[test]
fn or_then_and_applies_and_last() {
    let table = people();
    let conditions = vec![
        FilterCondition::new("City", FilterOperator::Equals, "LA"),
        FilterCondition::new("City", FilterOperator::Equals, "NY").or(),
        FilterCondition::new("Age", FilterOperator::GreaterThanOrEqual, "35").and(),
    ];
    let filtered = apply_filters(&table, &conditions).unwrap();
    assert_eq!(names(&filtered), ["row2", "row3"]);
}

#[test]
fn ordering_is_lexicographic() {
    let table = Table::from_strings(&["Name", "Age"], &[vec!["a", "9"], vec!["b", "10"]]);
    let conditions = vec![FilterCondition::new("Age", FilterOperator::GreaterThan, "5")];
    let filtered = apply_filters(&table, &conditions).unwrap();
    assert_eq!(names(&filtered), ["a"]);
}

#[test]
fn unknown_fields_are_dropped_with_their_operator() {
    let table = people();
    let conditions = vec![
        FilterCondition::new("Ghost", FilterOperator::Equals, "x"),
        FilterCondition::new("City", FilterOperator::Equals, "LA").or(),
    ];
    let filtered = apply_filters(&table, &conditions).unwrap();
    assert_eq!(names(&filtered), ["row2"]);
}

#[test]
fn no_applicable_condition_keeps_every_row() {
    let table = people();
    let conditions = vec![FilterCondition::new("Ghost", FilterOperator::IsNull, "")];
    let filtered = apply_filters(&table, &conditions).unwrap();
    assert_eq!(filtered.len(), 3);
    assert!(apply_filters(&table, &[]).unwrap().len() == 3);
}

#[test]
fn null_cells_compare_as_empty_text() {
    let table = Table::from_strings(
        &["Name", "Email"],
        &[vec!["a", ""], vec!["b", "b@example.com"]],
    );
    let nulls = apply_filters(&table, &[FilterCondition::new("Email", FilterOperator::IsNull, "")])
        .unwrap();
    assert_eq!(names(&nulls), ["a"]);
    let present = apply_filters(
        &table,
        &[FilterCondition::new("Email", FilterOperator::NotContains, "@")],
    )
    .unwrap();
    assert_eq!(names(&present), ["a"]);
}

#[test]
fn string_operators_are_case_sensitive() {
    let table = Table::from_strings(&["Name", "City"], &[vec!["a", "New York"], vec!["b", "newark"]]);
    let starts = apply_filters(
        &table,
        &[FilterCondition::new("City", FilterOperator::StartsWith, "New")],
    )
    .unwrap();
    assert_eq!(names(&starts), ["a"]);
    let ends = apply_filters(&table, &[FilterCondition::new("City", FilterOperator::EndsWith, "ark")])
        .unwrap();
    assert_eq!(names(&ends), ["b"]);
}

#[test]
fn typed_values_filter_on_display_text() {
    let mut table = Table::new(vec![
        Column::new("Name", ColumnType::String),
        Column::new("Active", ColumnType::Boolean),
    ]);
    table
        .push_row(vec![Some(Value::from("a")), Some(Value::Boolean(true))])
        .unwrap();
    table
        .push_row(vec![Some(Value::from("b")), Some(Value::Boolean(false))])
        .unwrap();
    let filtered = apply_filters(
        &table,
        &[FilterCondition::new("Active", FilterOperator::Equals, "true")],
    )
    .unwrap();
    assert_eq!(names(&filtered), ["a"]);
}

#[test]
fn compiled_filter_rejects_rows_of_another_width() {
    let table = people();
    let conditions = vec![FilterCondition::new("Age", FilterOperator::Equals, "25")];
    let filter = CompiledFilter::compile(&conditions, &table);
    assert!(filter.matches(&vec![None]).is_err());
}

#[test]
fn parsed_filters_behave_like_built_ones() {
    let table = people();
    let conditions = parse_filters(&["Age > 30".to_string(), "or: City = NY".to_string()]).unwrap();
    assert_eq!(conditions[1].operator, FilterOperator::Equals);
    let filtered = apply_filters(&table, &conditions).unwrap();
    assert_eq!(filtered.len(), 3);
}
