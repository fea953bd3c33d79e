use std::collections::{BTreeMap, HashSet};

use itertools::Itertools;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::MergeError;

/// Copies `source_field` of a matched secondary row into `target_field` of the primary row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldMapping {
    pub source_field: String,
    #[serde(default)]
    pub target_field: String,
}

impl FieldMapping {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_field: source.into(),
            target_field: target.into(),
        }
    }

    /// Maps a field onto the same name in the primary table.
    pub fn same_name(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(field.clone(), field)
    }

    /// Trims both names and defaults an empty target to the source name.
    pub fn normalized(&self) -> Self {
        let source = self.source_field.trim();
        let target = match self.target_field.trim() {
            "" => source,
            other => other,
        };
        Self::new(source, target)
    }

    /// Parses `Source` or `Source:Target`.
    pub fn parse(spec: &str) -> Result<Self, MergeError> {
        let (source, target) = spec.split_once(':').unwrap_or((spec, ""));
        let mapping = FieldMapping::new(source, target).normalized();
        if mapping.source_field.is_empty() {
            return Err(MergeError::validation(format!(
                "Field mapping '{spec}' is missing a source field"
            )));
        }
        Ok(mapping)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingResolution {
    pub valid: Vec<FieldMapping>,
    pub skipped: Vec<FieldMapping>,
}

/// Keeps the mappings whose source exists in `source_columns`.
///
/// The target schema never affects validity; absent targets become new
/// columns downstream.
pub fn resolve_mappings<'c, I>(mappings: &[FieldMapping], source_columns: I) -> MappingResolution
where
    I: IntoIterator<Item = &'c str>,
{
    let known: HashSet<&str> = source_columns.into_iter().collect();
    let mut resolution = MappingResolution::default();
    for mapping in mappings {
        if known.contains(mapping.source_field.as_str()) {
            resolution.valid.push(mapping.clone());
        } else {
            warn!(
                "Source field '{}' does not exist in the secondary table; skipping mapping to '{}'",
                mapping.source_field, mapping.target_field
            );
            resolution.skipped.push(mapping.clone());
        }
    }
    resolution
}

/// Strict pre-merge check over the whole mapping list.
///
/// Rejects an empty list, blank field names, and more than one mapping
/// writing to the same column that already exists in the target schema.
pub fn validate_mappings<'c, I>(mappings: &[FieldMapping], target_columns: I) -> Result<(), MergeError>
where
    I: IntoIterator<Item = &'c str>,
{
    if mappings.is_empty() {
        return Err(MergeError::validation("No field mappings were defined"));
    }
    for mapping in mappings {
        if mapping.source_field.is_empty() {
            return Err(MergeError::validation(
                "Field mappings cannot have an empty source field",
            ));
        }
        if mapping.target_field.is_empty() {
            return Err(MergeError::validation(format!(
                "Mapping from '{}' has an empty target field",
                mapping.source_field
            )));
        }
    }

    let existing: HashSet<&str> = target_columns.into_iter().collect();
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for mapping in mappings {
        if existing.contains(mapping.target_field.as_str()) {
            *counts.entry(mapping.target_field.as_str()).or_default() += 1;
        }
    }
    let duplicates = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(name, _)| name)
        .collect::<Vec<_>>();
    if !duplicates.is_empty() {
        return Err(MergeError::validation(format!(
            "Several mappings target the same existing column: {}",
            duplicates.iter().join(", ")
        )));
    }
    Ok(())
}

/// Distinct target names missing from `existing`, in first-mapping order.
pub fn plan_new_columns<'c, I>(mappings: &[FieldMapping], existing: I) -> Vec<String>
where
    I: IntoIterator<Item = &'c str>,
{
    let existing: HashSet<&str> = existing.into_iter().collect();
    let mut planned: Vec<String> = Vec::new();
    for mapping in mappings {
        let target = mapping.target_field.as_str();
        if !existing.contains(target) && !planned.iter().any(|p| p == target) {
            planned.push(target.to_string());
        }
    }
    planned
}
