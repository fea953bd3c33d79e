use std::{error::Error as StdError, io};

use thiserror::Error;

/// Error taxonomy for a merge invocation.
///
/// `Validation` is raised before any output is created. `Sheet` only appears
/// inside multi-sheet runs, where it is recorded on the result instead of
/// aborting the whole merge.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Invalid merge parameters: {0}")]
    Validation(String),
    #[error("Failed to apply filter conditions: {0}")]
    Evaluation(String),
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("{context}")]
    Workbook {
        context: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Processing sheet '{sheet}' failed")]
    Sheet {
        sheet: String,
        #[source]
        source: Box<MergeError>,
    },
    #[error("Writing merge output failed: {0}")]
    Fatal(String),
    #[error("Merge cancelled")]
    Cancelled,
}

impl MergeError {
    pub fn validation(message: impl Into<String>) -> Self {
        MergeError::Validation(message.into())
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        MergeError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn workbook(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        MergeError::Workbook {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn sheet(sheet: impl Into<String>, source: MergeError) -> Self {
        MergeError::Sheet {
            sheet: sheet.into(),
            source: Box::new(source),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MergeError::Cancelled)
    }
}

/// Concatenates every message in the `source()` chain into one diagnostic string.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(inner) = current {
        let text = inner.to_string();
        if !message.ends_with(&text) {
            message.push_str("\nDetails: ");
            message.push_str(&text);
        }
        current = inner.source();
    }
    message
}

/// Maps well-known failure messages onto an actionable hint.
///
/// The full chain is always appended so the underlying cause stays visible.
pub fn friendly_message(err: &(dyn StdError + 'static)) -> String {
    let chain = error_chain(err);
    let lowered = chain.to_ascii_lowercase();

    let hint = if lowered.contains("being used by another process")
        || lowered.contains("locked")
    {
        Some(
            "The file is in use by another program. Close any application that has the \
             workbooks open and retry the merge."
                .to_string(),
        )
    } else if lowered.contains("permission denied") {
        Some("Access to the file was denied. Check file permissions and retry the merge.".into())
    } else if let Some(column) = quoted_after(&chain, "Column '") {
        Some(format!(
            "Column '{column}' does not exist in some of the selected sheets. Check the field \
             mappings and make sure every source field exists in the selected secondary sheets."
        ))
    } else if lowered.contains("column") && lowered.contains("not found") {
        Some(
            "A referenced column does not exist. Check the field mappings and make sure every \
             source field exists in the selected secondary sheets."
                .to_string(),
        )
    } else if lowered.contains("no such file") || lowered.contains("cannot find the file") {
        Some("An input file could not be found. Check the file paths and retry.".to_string())
    } else {
        None
    };

    match hint {
        Some(hint) => format!("{hint}\n\n{chain}"),
        None => chain,
    }
}

fn quoted_after<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let start = text.find(prefix)? + prefix.len();
    let len = text[start..].find('\'')?;
    if len == 0 || !text[start + len..].to_ascii_lowercase().contains("not found") {
        return None;
    }
    Some(&text[start..start + len])
}
