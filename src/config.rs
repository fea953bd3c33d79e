//! Merge job settings document.
//!
//! A job is stored as YAML, or as pretty JSON when the path ends in `.json`.
//! Older documents carried a single `sheet` per workbook; it is folded into
//! `sheets` on load.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{filter::FilterCondition, mapping::FieldMapping};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkbookSelection {
    #[serde(default)]
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub sheets: Vec<String>,
    #[serde(default, skip_serializing)]
    sheet: Option<String>,
}

impl WorkbookSelection {
    pub fn new(path: impl Into<PathBuf>, sheets: Vec<String>) -> Self {
        Self {
            path: path.into(),
            password: None,
            sheets,
            sheet: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    fn fold_legacy_sheet(&mut self) {
        if let Some(sheet) = self.sheet.take() {
            if self.sheets.is_empty() && !sheet.trim().is_empty() {
                self.sheets.push(sheet);
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeJob {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub primary: WorkbookSelection,
    #[serde(default)]
    pub secondary: WorkbookSelection,
    #[serde(default)]
    pub primary_match_fields: Vec<String>,
    #[serde(default)]
    pub secondary_match_fields: Vec<String>,
    #[serde(default)]
    pub mappings: Vec<FieldMapping>,
    #[serde(default)]
    pub primary_filters: Vec<FilterCondition>,
    #[serde(default)]
    pub secondary_filters: Vec<FilterCondition>,
}

impl MergeJob {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening job file {path:?}"))?;
        let reader = BufReader::new(file);
        let mut job: MergeJob = if is_json(path) {
            serde_json::from_reader(reader).context("Parsing job JSON")?
        } else {
            serde_yaml::from_reader(reader).context("Parsing job YAML")?
        };
        job.primary.fold_legacy_sheet();
        job.secondary.fold_legacy_sheet();
        Ok(job)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating job file {path:?}"))?;
        if is_json(path) {
            serde_json::to_writer_pretty(file, self).context("Writing job JSON")
        } else {
            serde_yaml::to_writer(file, self).context("Writing job YAML")
        }
    }

    /// Trims every field name and defaults empty mapping targets to their source.
    pub fn normalized(&self) -> Self {
        let trim_all = |fields: &[String]| -> Vec<String> {
            fields.iter().map(|f| f.trim().to_string()).collect()
        };
        let trim_filters = |filters: &[FilterCondition]| -> Vec<FilterCondition> {
            filters
                .iter()
                .map(|f| FilterCondition {
                    field: f.field.trim().to_string(),
                    ..f.clone()
                })
                .collect()
        };
        let mut job = self.clone();
        job.primary_match_fields = trim_all(&self.primary_match_fields);
        job.secondary_match_fields = trim_all(&self.secondary_match_fields);
        job.mappings = self.mappings.iter().map(FieldMapping::normalized).collect();
        job.primary_filters = trim_filters(&self.primary_filters);
        job.secondary_filters = trim_filters(&self.secondary_filters);
        job.primary.sheets = trim_all(&self.primary.sheets);
        job.secondary.sheets = trim_all(&self.secondary.sheets);
        job.primary.fold_legacy_sheet();
        job.secondary.fold_legacy_sheet();
        job
    }

    /// True when either side selects more than one sheet.
    pub fn is_multi_sheet(&self) -> bool {
        self.primary.sheets.len() > 1 || self.secondary.sheets.len() > 1
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
