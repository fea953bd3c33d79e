use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{diagnose::DEFAULT_SAMPLE_ROWS, preview::DEFAULT_PREVIEW_ROWS};

#[derive(Debug, Parser)]
#[command(author, version, about = "Join two workbooks on key fields and copy mapped columns", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Merge mapped secondary columns into a copy of the primary workbook
    Merge(MergeArgs),
    /// Report how the match fields of both workbooks line up on a small sample
    Diagnose(DiagnoseArgs),
    /// Show the first rows of the merged primary sheet without writing anything
    Preview(PreviewArgs),
    /// List the sheets of a workbook
    Sheets(SheetsArgs),
}

/// Job definition shared by every merge-related command.
///
/// Flags override the matching fields of `--job` when both are given.
#[derive(Debug, Args, Default)]
pub struct JobArgs {
    /// YAML or JSON job file to start from
    #[arg(long = "job")]
    pub job: Option<PathBuf>,
    /// Primary workbook (the one being enriched)
    #[arg(long = "primary")]
    pub primary: Option<PathBuf>,
    /// Secondary workbook supplying the copied values
    #[arg(long = "secondary")]
    pub secondary: Option<PathBuf>,
    /// Primary sheet to merge (repeat for several sheets)
    #[arg(long = "primary-sheet", action = clap::ArgAction::Append)]
    pub primary_sheets: Vec<String>,
    /// Secondary sheet to index (repeat for several sheets)
    #[arg(long = "secondary-sheet", action = clap::ArgAction::Append)]
    pub secondary_sheets: Vec<String>,
    /// Password of the primary workbook
    #[arg(long = "primary-password")]
    pub primary_password: Option<String>,
    /// Password of the secondary workbook
    #[arg(long = "secondary-password")]
    pub secondary_password: Option<String>,
    /// Comma-separated primary match fields, paired by position with --secondary-key
    #[arg(long = "primary-key", value_delimiter = ',')]
    pub primary_key: Vec<String>,
    /// Comma-separated secondary match fields
    #[arg(long = "secondary-key", value_delimiter = ',')]
    pub secondary_key: Vec<String>,
    /// Field mapping `Source` or `Source:Target` (repeatable)
    #[arg(long = "map", action = clap::ArgAction::Append)]
    pub mappings: Vec<String>,
    /// Primary row filter such as `Age > 30` or `or: City = NY` (repeatable)
    #[arg(long = "primary-filter", action = clap::ArgAction::Append)]
    pub primary_filters: Vec<String>,
    /// Secondary row filter (repeatable)
    #[arg(long = "secondary-filter", action = clap::ArgAction::Append)]
    pub secondary_filters: Vec<String>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the workbooks (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Write the effective job definition to this file
    #[arg(long = "save-job")]
    pub save_job: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    #[command(flatten)]
    pub job: JobArgs,
}

#[derive(Debug, Args)]
pub struct DiagnoseArgs {
    #[command(flatten)]
    pub job: JobArgs,
    /// Number of rows sampled from each side
    #[arg(long = "sample-rows", default_value_t = DEFAULT_SAMPLE_ROWS)]
    pub sample_rows: usize,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub job: JobArgs,
    /// Number of rows to display
    #[arg(long, default_value_t = DEFAULT_PREVIEW_ROWS)]
    pub rows: usize,
}

#[derive(Debug, Args)]
pub struct SheetsArgs {
    /// Workbook to inspect
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Workbook password
    #[arg(long)]
    pub password: Option<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
