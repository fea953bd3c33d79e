//! Merge orchestrator.
//!
//! A run moves through [`MergePhase`] strictly in order. The primary workbook
//! is copied to a timestamped output path once the in-memory merge is done,
//! and every edit is applied to that copy:
//!
//! - **Single sheet**: one primary sheet enriched from one secondary sheet.
//! - **Multi sheet**: every selected primary sheet is matched against one
//!   index built over all selected secondary sheets. A failure inside one
//!   primary sheet is recorded on the result and the remaining sheets carry on.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};

use chrono::{Local, NaiveDateTime};
use crossbeam_channel::Receiver;
use log::{debug, error, info};

use crate::{
    config::{MergeJob, WorkbookSelection},
    data::ColumnType,
    error::{MergeError, error_chain},
    filter::apply_filters,
    index::JoinIndex,
    key::KeyColumns,
    mapping::{FieldMapping, plan_new_columns, resolve_mappings, validate_mappings},
    progress::{ChannelProgress, NoProgress, Progress, ProgressSink},
    table::Table,
    workbook::{TableReader, TableWriter, WritableWorkbook, missing_sheet},
};

pub const PROGRESS_TOTAL: u32 = 100;
const ROW_BATCH: usize = 100;
/// Separates the primary file stem from the timestamp in an output file name.
pub const OUTPUT_MARKER: &str = "_merge-result_";
/// Length of the `yyyyMMddHHmmss` stamp that follows [`OUTPUT_MARKER`].
pub const OUTPUT_STAMP_LEN: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePhase {
    #[default]
    Idle,
    LoadPrimary,
    LoadSecondary,
    ApplyFilters,
    BuildIndex,
    IterateAndMatch,
    ReconcileOutputSchema,
    WriteOutput,
    Done,
    Failed,
    Cancelled,
}

impl MergePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            MergePhase::Idle => "idle",
            MergePhase::LoadPrimary => "load-primary",
            MergePhase::LoadSecondary => "load-secondary",
            MergePhase::ApplyFilters => "apply-filters",
            MergePhase::BuildIndex => "build-index",
            MergePhase::IterateAndMatch => "iterate-and-match",
            MergePhase::ReconcileOutputSchema => "reconcile-output-schema",
            MergePhase::WriteOutput => "write-output",
            MergePhase::Done => "done",
            MergePhase::Failed => "failed",
            MergePhase::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MergePhase::Done | MergePhase::Failed | MergePhase::Cancelled
        )
    }
}

impl fmt::Display for MergePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A primary sheet that could not be merged in a multi-sheet run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetFailure {
    pub sheet: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub processed_rows: usize,
    pub matched_rows: usize,
    pub new_columns_added: usize,
    pub output_path: PathBuf,
    pub sheet_failures: Vec<SheetFailure>,
    /// Secondary rows ignored because an earlier row already held their key.
    pub duplicate_keys_dropped: usize,
}

impl MergeResult {
    pub fn is_partial(&self) -> bool {
        !self.sheet_failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct MatchStats {
    pub processed_rows: usize,
    pub matched_rows: usize,
    pub new_columns_added: usize,
}

impl MatchStats {
    fn add(&mut self, other: &MatchStats) {
        self.processed_rows += other.processed_rows;
        self.matched_rows += other.matched_rows;
        self.new_columns_added += other.new_columns_added;
    }
}

/// Checks the job parameters without touching any workbook.
pub fn validate_job(job: &MergeJob) -> Result<(), MergeError> {
    for (side, selection) in [("primary", &job.primary), ("secondary", &job.secondary)] {
        if selection.path.as_os_str().is_empty() {
            return Err(MergeError::validation(format!(
                "No {side} workbook was selected"
            )));
        }
        if selection.sheets.is_empty() {
            return Err(MergeError::validation(format!(
                "No {side} sheets were selected"
            )));
        }
        if selection.sheets.iter().any(|s| s.trim().is_empty()) {
            return Err(MergeError::validation(format!(
                "The {side} sheet list contains a blank sheet name"
            )));
        }
    }
    if job.primary_match_fields.is_empty() || job.secondary_match_fields.is_empty() {
        return Err(MergeError::validation(
            "At least one match field is required on each side",
        ));
    }
    if job.primary_match_fields.len() != job.secondary_match_fields.len() {
        return Err(MergeError::validation(format!(
            "Primary has {} match field(s) but secondary has {}; match fields pair up by position",
            job.primary_match_fields.len(),
            job.secondary_match_fields.len()
        )));
    }
    if job
        .primary_match_fields
        .iter()
        .chain(&job.secondary_match_fields)
        .any(|f| f.trim().is_empty())
    {
        return Err(MergeError::validation("Match fields cannot be blank"));
    }
    validate_mappings(&job.mappings, std::iter::empty())
}

/// `<dir>/<stem>_merge-result_<yyyyMMddHHmmss><ext>` beside `primary`.
pub fn output_path_for(primary: &Path, timestamp: NaiveDateTime) -> PathBuf {
    let stem = primary
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = primary
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let name = format!(
        "{stem}{OUTPUT_MARKER}{}{extension}",
        timestamp.format("%Y%m%d%H%M%S")
    );
    primary.with_file_name(name)
}

/// Matches every row of `primary` against `index` and copies mapped values in place.
///
/// Target columns missing from `primary` are appended before the row loop.
/// `index` must have been built over `secondary` in the same order.
pub(crate) fn merge_rows<S, F>(
    primary: &mut Table,
    primary_fields: &[S],
    secondary: &[&Table],
    index: &JoinIndex,
    mappings: &[FieldMapping],
    mut on_row: F,
) -> Result<MatchStats, MergeError>
where
    S: AsRef<str>,
    F: FnMut(usize, usize) -> Result<(), MergeError>,
{
    let new_columns = plan_new_columns(mappings, primary.column_names());
    for name in &new_columns {
        primary.add_column(name.as_str(), ColumnType::String);
    }

    let mut targets = Vec::with_capacity(mappings.len());
    for mapping in mappings {
        let idx = primary.column_index(&mapping.target_field).ok_or_else(|| {
            MergeError::Fatal(format!(
                "Column '{}' not found after schema update",
                mapping.target_field
            ))
        })?;
        targets.push(idx);
    }
    let sources: Vec<Vec<Option<usize>>> = secondary
        .iter()
        .map(|table| {
            mappings
                .iter()
                .map(|m| table.column_index(&m.source_field))
                .collect()
        })
        .collect();

    let keys = KeyColumns::resolve(primary, primary_fields);
    let total = primary.len();
    let mut stats = MatchStats {
        processed_rows: 0,
        matched_rows: 0,
        new_columns_added: new_columns.len(),
    };
    for row in 0..total {
        let key = keys.key_for(primary.row(row));
        if let Some(hit) = index.find(&key) {
            stats.matched_rows += 1;
            let source_row = secondary
                .get(hit.sheet)
                .and_then(|table| table.row(hit.row));
            if let Some(source_row) = source_row {
                for (pos, target) in targets.iter().enumerate() {
                    if let Some(src) = sources[hit.sheet][pos] {
                        primary.set_cell(row, *target, source_row[src].clone());
                    }
                }
            }
        }
        stats.processed_rows += 1;
        on_row(row + 1, total)?;
    }
    Ok(stats)
}

/// Runs merge jobs against a reader and writer collaborator.
pub struct MergeEngine<R, W> {
    reader: R,
    writer: W,
    progress: Box<dyn ProgressSink>,
    cancel: Arc<AtomicBool>,
    timestamp: Option<NaiveDateTime>,
    phase: MergePhase,
}

impl<R: TableReader, W: TableWriter> MergeEngine<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            progress: Box::new(NoProgress),
            cancel: Arc::new(AtomicBool::new(false)),
            timestamp: None,
            phase: MergePhase::Idle,
        }
    }

    pub fn with_progress<P: ProgressSink + 'static>(mut self, progress: P) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fixes the timestamp used in the output file name.
    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn phase(&self) -> MergePhase {
        self.phase
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn run(&mut self, job: &MergeJob) -> Result<MergeResult, MergeError> {
        self.phase = MergePhase::Idle;
        let outcome = validate_job(job).and_then(|()| {
            if job.is_multi_sheet() {
                self.run_multi(job)
            } else {
                self.run_single(job)
            }
        });
        self.phase = match &outcome {
            Ok(result) => {
                info!(
                    "Merge finished: {} row(s) processed, {} matched, {} new column(s), output {:?}",
                    result.processed_rows,
                    result.matched_rows,
                    result.new_columns_added,
                    result.output_path
                );
                MergePhase::Done
            }
            Err(err) if err.is_cancelled() => {
                info!("Merge cancelled during {}", self.phase);
                MergePhase::Cancelled
            }
            Err(err) => {
                error!("Merge failed during {}: {}", self.phase, error_chain(err));
                MergePhase::Failed
            }
        };
        outcome
    }

    fn run_single(&mut self, job: &MergeJob) -> Result<MergeResult, MergeError> {
        let primary_sheet = first_sheet(&job.primary)?;
        let secondary_sheet = first_sheet(&job.secondary)?;

        self.enter(MergePhase::LoadPrimary, 10, "Loading primary sheet")?;
        let primary = self.load(&job.primary, primary_sheet)?;
        validate_mappings(&job.mappings, primary.column_names())?;

        self.enter(MergePhase::LoadSecondary, 30, "Loading secondary sheet")?;
        let secondary = self.load(&job.secondary, secondary_sheet)?;

        self.enter(MergePhase::ApplyFilters, 35, "Applying filters")?;
        let mut working = apply_filters(&primary, &job.primary_filters)?.into_owned();
        let secondary = apply_filters(&secondary, &job.secondary_filters)?;

        self.enter(MergePhase::BuildIndex, 40, "Building secondary index")?;
        let index = JoinIndex::build(secondary.as_ref(), &job.secondary_match_fields);
        log_index(&index);
        let resolution = resolve_mappings(&job.mappings, secondary.column_names());

        self.enter(MergePhase::IterateAndMatch, 50, "Matching rows")?;
        let stats = merge_rows(
            &mut working,
            &job.primary_match_fields,
            &[secondary.as_ref()],
            &index,
            &resolution.valid,
            |done, total| self.row_tick(done, total, 50, 80),
        )?;

        self.enter(
            MergePhase::ReconcileOutputSchema,
            80,
            "Preparing output workbook",
        )?;
        let output_path = self.create_output(&job.primary)?;
        let mut book = self
            .writer
            .open_for_merge(&output_path, job.primary.password())?;
        if !book.has_sheet(primary_sheet) {
            return Err(missing_sheet(primary_sheet, &output_path));
        }
        let layout = reconcile_sheet(book.as_mut(), primary_sheet, &working)?;

        self.enter(MergePhase::WriteOutput, 85, "Writing merged rows")?;
        write_rows(book.as_mut(), primary_sheet, &working, &layout).map_err(into_fatal)?;
        self.report(90, "Saving output workbook");
        book.save().map_err(into_fatal)?;
        self.report(PROGRESS_TOTAL, "Merge completed");

        Ok(MergeResult {
            processed_rows: stats.processed_rows,
            matched_rows: stats.matched_rows,
            new_columns_added: stats.new_columns_added,
            output_path,
            sheet_failures: Vec::new(),
            duplicate_keys_dropped: index.duplicate_count(),
        })
    }

    fn run_multi(&mut self, job: &MergeJob) -> Result<MergeResult, MergeError> {
        let mut failures = Vec::new();

        self.enter(MergePhase::LoadPrimary, 10, "Loading primary sheets")?;
        let loaded = self.load_all(&job.primary, "primary", &mut failures)?;
        for (_, table) in &loaded {
            validate_mappings(&job.mappings, table.column_names())?;
        }

        self.enter(MergePhase::LoadSecondary, 15, "Loading secondary sheets")?;
        let secondary = self.load_all(&job.secondary, "secondary", &mut failures)?;

        self.enter(MergePhase::ApplyFilters, 18, "Applying filters")?;
        let mut primaries = Vec::with_capacity(loaded.len());
        for (name, table) in loaded {
            match apply_filters(&table, &job.primary_filters) {
                Ok(filtered) => {
                    let filtered = filtered.into_owned();
                    primaries.push((name, filtered));
                }
                Err(err) => isolate(&mut failures, &name, err)?,
            }
        }
        let mut secondaries = Vec::with_capacity(secondary.len());
        for (_, table) in &secondary {
            secondaries.push(apply_filters(table, &job.secondary_filters)?.into_owned());
        }

        self.enter(MergePhase::BuildIndex, 20, "Building secondary index")?;
        let index = JoinIndex::build_multi(secondaries.iter(), &job.secondary_match_fields);
        log_index(&index);
        let resolution = resolve_mappings(
            &job.mappings,
            secondaries.iter().flat_map(|t| t.column_names()),
        );
        let secondary_refs: Vec<&Table> = secondaries.iter().collect();

        self.enter(MergePhase::IterateAndMatch, 20, "Matching rows")?;
        let share = 30 / (primaries.len().max(1) as u32);
        let mut matched = Vec::with_capacity(primaries.len());
        for (pos, (name, mut table)) in primaries.into_iter().enumerate() {
            self.check_cancelled()?;
            let from = 20 + pos as u32 * share;
            self.report(from, &format!("Matching sheet '{name}'"));
            let outcome = merge_rows(
                &mut table,
                &job.primary_match_fields,
                &secondary_refs,
                &index,
                &resolution.valid,
                |done, total| self.row_tick(done, total, from, from + share),
            );
            match outcome {
                Ok(stats) => matched.push((name, table, stats)),
                Err(err) => isolate(&mut failures, &name, err)?,
            }
        }

        self.enter(
            MergePhase::ReconcileOutputSchema,
            50,
            "Preparing output workbook",
        )?;
        let output_path = self.create_output(&job.primary)?;
        let mut book = self
            .writer
            .open_for_merge(&output_path, job.primary.password())?;
        let mut ready = Vec::with_capacity(matched.len());
        for (name, table, stats) in matched {
            self.check_cancelled()?;
            if !book.has_sheet(&name) {
                isolate(&mut failures, &name, missing_sheet(&name, &output_path))?;
                continue;
            }
            match reconcile_sheet(book.as_mut(), &name, &table) {
                Ok(layout) => ready.push((name, table, stats, layout)),
                Err(err) => isolate(&mut failures, &name, err)?,
            }
        }

        self.enter(MergePhase::WriteOutput, 60, "Writing merged rows")?;
        let mut totals = MatchStats::default();
        let count = ready.len().max(1);
        for (pos, (name, table, stats, layout)) in ready.iter().enumerate() {
            self.check_cancelled()?;
            let current = 60 + (pos * 30 / count) as u32;
            self.report(current, &format!("Writing sheet '{name}'"));
            match write_rows(book.as_mut(), name, table, layout) {
                Ok(()) => totals.add(stats),
                Err(err) => isolate(&mut failures, name, err)?,
            }
        }
        self.report(90, "Saving output workbook");
        book.save().map_err(into_fatal)?;
        self.report(PROGRESS_TOTAL, "Merge completed");

        Ok(MergeResult {
            processed_rows: totals.processed_rows,
            matched_rows: totals.matched_rows,
            new_columns_added: totals.new_columns_added,
            output_path,
            sheet_failures: failures,
            duplicate_keys_dropped: index.duplicate_count(),
        })
    }

    fn load(&self, selection: &WorkbookSelection, sheet: &str) -> Result<Table, MergeError> {
        let table = self
            .reader
            .load_sheet(&selection.path, selection.password(), sheet)?;
        debug!(
            "Loaded '{sheet}' from {:?}: {} row(s)",
            selection.path,
            table.len()
        );
        Ok(table)
    }

    fn load_all(
        &self,
        selection: &WorkbookSelection,
        side: &str,
        failures: &mut Vec<SheetFailure>,
    ) -> Result<Vec<(String, Table)>, MergeError> {
        let available = self
            .reader
            .list_sheets(&selection.path, selection.password())?;
        let mut tables = Vec::with_capacity(selection.sheets.len());
        for sheet in &selection.sheets {
            self.check_cancelled()?;
            if !available.iter().any(|s| s == sheet) {
                isolate(failures, sheet, missing_sheet(sheet, &selection.path))?;
                continue;
            }
            match self.load(selection, sheet) {
                Ok(table) => tables.push((sheet.clone(), table)),
                Err(err) => isolate(failures, sheet, err)?,
            }
        }
        if tables.is_empty() {
            return Err(MergeError::validation(format!(
                "None of the selected {side} sheets could be loaded"
            )));
        }
        Ok(tables)
    }

    fn create_output(&self, primary: &WorkbookSelection) -> Result<PathBuf, MergeError> {
        let timestamp = self
            .timestamp
            .unwrap_or_else(|| Local::now().naive_local());
        let output = output_path_for(&primary.path, timestamp);
        self.writer.copy_workbook(&primary.path, &output)?;
        info!("Copied {:?} to {:?}", primary.path, output);
        Ok(output)
    }

    fn enter(&mut self, phase: MergePhase, current: u32, message: &str) -> Result<(), MergeError> {
        self.check_cancelled()?;
        debug!("Entering phase {phase}");
        self.phase = phase;
        self.report(current, message);
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), MergeError> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(MergeError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn report(&self, current: u32, message: &str) {
        self.progress.report(current, PROGRESS_TOTAL, message);
    }

    fn row_tick(&self, done: usize, total: usize, from: u32, to: u32) -> Result<(), MergeError> {
        if done % ROW_BATCH != 0 && done != total {
            return Ok(());
        }
        self.check_cancelled()?;
        let span = to.saturating_sub(from) as usize;
        let current = from + (done * span / total.max(1)) as u32;
        debug!("Processed {done}/{total} row(s)");
        self.report(current, &format!("Processed {done} of {total} rows"));
        Ok(())
    }
}

impl<R, W> MergeEngine<R, W>
where
    R: TableReader + 'static,
    W: TableWriter + 'static,
{
    /// Runs `job` on a dedicated worker thread, streaming progress over a channel.
    pub fn spawn(self, job: MergeJob) -> Result<MergeHandle, MergeError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let cancel = self.cancel_flag();
        let mut engine = self.with_progress(ChannelProgress::new(tx));
        let worker = thread::Builder::new()
            .name("merge-worker".to_string())
            .spawn(move || engine.run(&job))
            .map_err(|err| MergeError::io("Starting merge worker", err))?;
        Ok(MergeHandle {
            progress: rx,
            cancel,
            worker,
        })
    }
}

pub fn spawn_merge<R, W>(job: MergeJob, reader: R, writer: W) -> Result<MergeHandle, MergeError>
where
    R: TableReader + 'static,
    W: TableWriter + 'static,
{
    MergeEngine::new(reader, writer).spawn(job)
}

/// Handle on a merge running in the background.
///
/// The progress channel closes once the worker finishes.
pub struct MergeHandle {
    progress: Receiver<Progress>,
    cancel: Arc<AtomicBool>,
    worker: JoinHandle<Result<MergeResult, MergeError>>,
}

impl MergeHandle {
    pub fn progress(&self) -> &Receiver<Progress> {
        &self.progress
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn join(self) -> Result<MergeResult, MergeError> {
        self.worker
            .join()
            .unwrap_or_else(|_| Err(MergeError::Fatal("Merge worker panicked".to_string())))
    }
}

fn first_sheet(selection: &WorkbookSelection) -> Result<&str, MergeError> {
    selection
        .sheets
        .first()
        .map(String::as_str)
        .ok_or_else(|| MergeError::validation("No sheet was selected"))
}

fn log_index(index: &JoinIndex) {
    info!(
        "Indexed {} secondary key(s); {} duplicate(s) dropped, {} blank key(s) skipped",
        index.len(),
        index.duplicate_count(),
        index.blank_key_count()
    );
}

/// Maps each in-memory column to an output header cell, appending missing headers.
///
/// A header cell at the column's own position wins over a same-named cell
/// elsewhere, so repeated header names keep their order.
fn reconcile_sheet(
    book: &mut dyn WritableWorkbook,
    sheet: &str,
    table: &Table,
) -> Result<Vec<usize>, MergeError> {
    let header = book.header(sheet)?;
    let mut claimed = vec![false; header.len()];
    let mut layout = Vec::with_capacity(table.columns().len());
    for (pos, column) in table.columns().iter().enumerate() {
        let free = |idx: usize| !claimed.get(idx).copied().unwrap_or(false);
        let in_place = header.get(pos).is_some_and(|h| *h == column.name) && free(pos);
        let by_name = || {
            header
                .iter()
                .enumerate()
                .position(|(idx, h)| !h.is_empty() && *h == column.name && free(idx))
        };
        let idx = if in_place {
            pos
        } else if let Some(idx) = by_name() {
            idx
        } else if header.get(pos).is_some_and(|h| h.trim().is_empty()) && free(pos) {
            pos
        } else {
            let idx = book.get_or_create_column(sheet, &column.name)?;
            info!("Added column '{}' to sheet '{sheet}'", column.name);
            idx
        };
        if let Some(slot) = claimed.get_mut(idx) {
            *slot = true;
        }
        layout.push(idx);
    }
    Ok(layout)
}

fn write_rows(
    book: &mut dyn WritableWorkbook,
    sheet: &str,
    table: &Table,
    layout: &[usize],
) -> Result<(), MergeError> {
    book.clear_data_rows(sheet)?;
    for (row_idx, row) in table.rows().iter().enumerate() {
        for (cell, column) in row.iter().zip(layout) {
            book.write_cell(sheet, row_idx, *column, cell.as_ref())?;
        }
    }
    debug!("Wrote {} row(s) to sheet '{sheet}'", table.len());
    Ok(())
}

fn isolate(failures: &mut Vec<SheetFailure>, sheet: &str, err: MergeError) -> Result<(), MergeError> {
    if err.is_cancelled() {
        return Err(err);
    }
    let message = error_chain(&MergeError::sheet(sheet, err));
    error!("{message}");
    failures.push(SheetFailure {
        sheet: sheet.to_string(),
        message,
    });
    Ok(())
}

fn into_fatal(err: MergeError) -> MergeError {
    match err {
        MergeError::Fatal(_) | MergeError::Cancelled => err,
        other => MergeError::Fatal(error_chain(&other)),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn output_name_keeps_directory_and_extension() {
        let path = output_path_for(Path::new("/data/in/staff.csv"), at(9, 7, 3));
        assert_eq!(
            path,
            PathBuf::from("/data/in/staff_merge-result_20240305090703.csv")
        );
    }

    #[test]
    fn output_name_without_extension() {
        let path = output_path_for(Path::new("report"), at(23, 59, 0));
        assert_eq!(path, PathBuf::from("report_merge-result_20240305235900"));
    }

    #[test]
    fn write_errors_become_fatal() {
        let err = into_fatal(MergeError::validation("bad cell"));
        assert!(matches!(err, MergeError::Fatal(ref msg) if msg.contains("bad cell")));
        assert!(into_fatal(MergeError::Cancelled).is_cancelled());
    }

    #[test]
    fn arity_mismatch_is_rejected_before_io() {
        let job = MergeJob {
            primary: WorkbookSelection::new("a.csv", vec!["a".into()]),
            secondary: WorkbookSelection::new("b.csv", vec!["b".into()]),
            primary_match_fields: vec!["ID".into(), "Name".into()],
            secondary_match_fields: vec!["ID".into()],
            mappings: vec![FieldMapping::same_name("Dept")],
            ..MergeJob::default()
        };
        let err = validate_job(&job).unwrap_err();
        assert!(matches!(err, MergeError::Validation(_)));
    }

    #[test]
    fn later_mapping_wins_on_shared_target() {
        let mut primary = Table::from_strings(&["ID"], &[vec!["1"]]);
        let secondary = Table::from_strings(&["ID", "A", "B"], &[vec!["1", "first", "second"]]);
        let index = JoinIndex::build(&secondary, &["ID"]);
        let mappings = vec![FieldMapping::new("A", "Out"), FieldMapping::new("B", "Out")];
        let stats = merge_rows(&mut primary, &["ID"], &[&secondary], &index, &mappings, |_, _| Ok(()))
            .unwrap();
        assert_eq!(stats.new_columns_added, 1);
        assert_eq!(primary.cell(0, "Out").map(|v| v.as_display()), Some("second".to_string()));
    }
}
