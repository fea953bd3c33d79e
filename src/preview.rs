//! Recompute-on-demand merge preview.
//!
//! Callers invoke this after a batch of edits to a job instead of reacting
//! to every change. Nothing is written; the returned table holds the first
//! filtered primary rows as the merge would leave them.

use log::debug;

use crate::{
    config::MergeJob,
    error::MergeError,
    filter::apply_filters,
    index::JoinIndex,
    mapping::resolve_mappings,
    merge::merge_rows,
    table::Table,
    workbook::TableReader,
};

pub const DEFAULT_PREVIEW_ROWS: usize = 10;

pub fn preview_merge(
    primary: &Table,
    secondary: &Table,
    job: &MergeJob,
    max_rows: usize,
) -> Result<Table, MergeError> {
    let primary = apply_filters(primary, &job.primary_filters)?;
    let secondary = apply_filters(secondary, &job.secondary_filters)?;
    let index = JoinIndex::build(secondary.as_ref(), &job.secondary_match_fields);
    let resolution = resolve_mappings(&job.mappings, secondary.column_names());

    let mut preview = primary.head(max_rows);
    let stats = merge_rows(
        &mut preview,
        &job.primary_match_fields,
        &[secondary.as_ref()],
        &index,
        &resolution.valid,
        |_, _| Ok(()),
    )?;
    debug!(
        "Preview matched {}/{} row(s)",
        stats.matched_rows, stats.processed_rows
    );
    Ok(preview)
}

/// Loads the first selected sheet of each side, then previews the merge.
pub fn preview_workbooks<R: TableReader + ?Sized>(
    reader: &R,
    job: &MergeJob,
    max_rows: usize,
) -> Result<Table, MergeError> {
    let mut tables = Vec::with_capacity(2);
    for (side, selection) in [("primary", &job.primary), ("secondary", &job.secondary)] {
        let sheet = selection
            .sheets
            .first()
            .ok_or_else(|| MergeError::validation(format!("No {side} sheets were selected")))?;
        tables.push(reader.load_sheet(&selection.path, selection.password(), sheet)?);
    }
    let secondary = tables.pop().unwrap_or_default();
    let primary = tables.pop().unwrap_or_default();
    preview_merge(&primary, &secondary, job, max_rows)
}
