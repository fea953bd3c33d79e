pub mod cli;
pub mod config;
pub mod csv_workbook;
pub mod data;
pub mod diagnose;
pub mod error;
pub mod filter;
pub mod index;
pub mod key;
pub mod mapping;
pub mod memory;
pub mod merge;
pub mod preview;
pub mod progress;
pub mod table;
pub mod workbook;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, error, info, warn};

use crate::{
    cli::{Cli, Commands, JobArgs},
    config::MergeJob,
    csv_workbook::{CsvWorkbooks, resolve_encoding},
    error::{MergeError, error_chain, friendly_message},
    filter::parse_filters,
    mapping::FieldMapping,
    merge::{MergeResult, spawn_merge},
    workbook::TableReader,
};

pub use crate::merge::{MergeEngine, MergeHandle, MergePhase};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheet_matcher", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Merge(args) => handle_merge(&args.job),
        Commands::Diagnose(args) => handle_diagnose(&args.job, args.sample_rows),
        Commands::Preview(args) => handle_preview(&args.job, args.rows),
        Commands::Sheets(args) => handle_sheets(&args),
    }
}

fn handle_merge(args: &JobArgs) -> Result<()> {
    let workbooks = workbooks_for(args)?;
    let job = build_job(args, &workbooks)?;
    info!(
        "Merging {:?} with {:?} on {} match field(s)",
        job.primary.path,
        job.secondary.path,
        job.primary_match_fields.len()
    );
    let handle = spawn_merge(job, workbooks, workbooks).map_err(report_failure)?;
    for update in handle.progress().iter() {
        if update.message.starts_with("Processed ") {
            debug!("[{:>3}%] {}", update.percent(), update.message);
        } else {
            info!("[{:>3}%] {}", update.percent(), update.message);
        }
    }
    let result = handle.join().map_err(report_failure)?;
    print_summary(&result);
    Ok(())
}

fn handle_diagnose(args: &JobArgs, sample_rows: usize) -> Result<()> {
    let workbooks = workbooks_for(args)?;
    let job = build_job(args, &workbooks)?;
    let report =
        diagnose::diagnose_workbooks(&workbooks, &job, sample_rows).map_err(report_failure)?;
    println!("{report}");
    Ok(())
}

fn handle_preview(args: &JobArgs, rows: usize) -> Result<()> {
    let workbooks = workbooks_for(args)?;
    let job = build_job(args, &workbooks)?;
    let table = preview::preview_workbooks(&workbooks, &job, rows).map_err(report_failure)?;
    table::print_table(&table);
    info!("Displayed {} merged row(s)", table.len());
    Ok(())
}

fn handle_sheets(args: &cli::SheetsArgs) -> Result<()> {
    let workbooks = CsvWorkbooks::default();
    let sheets = workbooks
        .list_sheets(&args.input, args.password.as_deref())
        .map_err(report_failure)?;
    for sheet in sheets {
        println!("{sheet}");
    }
    Ok(())
}

fn workbooks_for(args: &JobArgs) -> Result<CsvWorkbooks> {
    let encoding = resolve_encoding(args.input_encoding.as_deref())?;
    Ok(CsvWorkbooks::new(args.delimiter, encoding))
}

/// Starts from `--job` when given, applies flag overrides and fills empty
/// sheet selections with the first sheet of each workbook.
fn build_job(args: &JobArgs, reader: &dyn TableReader) -> Result<MergeJob> {
    let mut job = match &args.job {
        Some(path) => {
            MergeJob::load(path).with_context(|| format!("Loading job from {path:?}"))?
        }
        None => MergeJob::default(),
    };
    if let Some(path) = &args.primary {
        job.primary.path = path.clone();
    }
    if let Some(path) = &args.secondary {
        job.secondary.path = path.clone();
    }
    if !args.primary_sheets.is_empty() {
        job.primary.sheets = args.primary_sheets.clone();
    }
    if !args.secondary_sheets.is_empty() {
        job.secondary.sheets = args.secondary_sheets.clone();
    }
    if args.primary_password.is_some() {
        job.primary.password = args.primary_password.clone();
    }
    if args.secondary_password.is_some() {
        job.secondary.password = args.secondary_password.clone();
    }
    if !args.primary_key.is_empty() {
        job.primary_match_fields = args.primary_key.clone();
    }
    if !args.secondary_key.is_empty() {
        job.secondary_match_fields = args.secondary_key.clone();
    }
    if !args.mappings.is_empty() {
        job.mappings = args
            .mappings
            .iter()
            .map(|m| FieldMapping::parse(m))
            .collect::<Result<Vec<_>, _>>()?;
    }
    if !args.primary_filters.is_empty() {
        job.primary_filters = parse_filters(&args.primary_filters)?;
    }
    if !args.secondary_filters.is_empty() {
        job.secondary_filters = parse_filters(&args.secondary_filters)?;
    }

    for selection in [&mut job.primary, &mut job.secondary] {
        if selection.sheets.is_empty() && !selection.path.as_os_str().is_empty() {
            let available = reader
                .list_sheets(&selection.path, selection.password())
                .map_err(report_failure)?;
            if let Some(first) = available.into_iter().next() {
                debug!("Defaulting to sheet '{first}' of {:?}", selection.path);
                selection.sheets.push(first);
            }
        }
    }

    let job = job.normalized();
    if let Some(path) = &args.save_job {
        job.save(path)
            .with_context(|| format!("Writing job definition to {path:?}"))?;
        info!("Job definition written to {path:?}");
    }
    Ok(job)
}

fn report_failure(err: MergeError) -> anyhow::Error {
    if err.is_cancelled() {
        warn!("Merge cancelled");
        return anyhow!(err);
    }
    error!("{}", error_chain(&err));
    anyhow!(friendly_message(&err))
}

fn print_summary(result: &MergeResult) {
    println!("Merge completed");
    println!("  Processed rows: {}", result.processed_rows);
    println!("  Matched rows: {}", result.matched_rows);
    println!("  New columns: {}", result.new_columns_added);
    if result.duplicate_keys_dropped > 0 {
        println!(
            "  Duplicate secondary keys ignored: {}",
            result.duplicate_keys_dropped
        );
    }
    println!("  Output: {}", result.output_path.display());
    for failure in &result.sheet_failures {
        println!("  Sheet '{}' failed: {}", failure.sheet, failure.message);
    }
}
