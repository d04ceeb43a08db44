// Task collection persistence and JSON document import/export

use crate::slot::Slot;
use crate::task::{Task, TaskId};
use eyre::{Context, Result};
use fs2::FileExt;
use serde_json::Value;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Slot key holding the serialized collection
pub const TASKS_KEY: &str = "tasks";

/// File name used when exporting into a directory
pub const EXPORT_FILE_NAME: &str = "tasks.json";

const REQUIRED_FIELDS: [&str; 4] = ["id", "title", "priority", "status"];

/// Reasons an import document is rejected
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to parse JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("document is not a list of tasks")]
    NotAnArray,

    #[error("task at index {index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("task at index {index} is invalid: {reason}")]
    InvalidTask { index: usize, reason: String },

    #[error("duplicate task id {0}")]
    DuplicateId(TaskId),

    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
}

impl ImportError {
    /// True when the text was not well-formed JSON at all
    pub fn is_parse_error(&self) -> bool {
        matches!(self, ImportError::Parse(_))
    }
}

/// Overwrite the durable slot with the full collection
pub fn save(slot: &mut dyn Slot, tasks: &[Task]) -> Result<()> {
    let json = serde_json::to_string(tasks).context("Failed to serialize tasks")?;
    slot.write(TASKS_KEY, &json)?;
    debug!(count = tasks.len(), "Saved tasks");
    Ok(())
}

/// Read the collection from the durable slot
///
/// An absent, unreadable or corrupt slot yields an empty collection.
pub fn load(slot: &dyn Slot) -> Vec<Task> {
    let text = match slot.read(TASKS_KEY) {
        Ok(Some(text)) => text,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(error = ?e, "Failed to read task slot, starting empty");
            return Vec::new();
        }
    };

    match import_document(&text) {
        Ok(tasks) => {
            info!(count = tasks.len(), "Loaded tasks");
            tasks
        }
        Err(e) => {
            warn!(error = %e, "Stored tasks are unreadable, starting empty");
            Vec::new()
        }
    }
}

/// Pretty-printed JSON array of the full collection
pub fn export_document(tasks: &[Task]) -> Result<String> {
    serde_json::to_string_pretty(tasks).context("Failed to serialize tasks")
}

/// Parse and validate an import document
///
/// The top-level value must be an array and every element must carry a
/// non-empty `id`, `title`, `priority` and `status`.
pub fn import_document(text: &str) -> Result<Vec<Task>, ImportError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Array(items) = value else {
        return Err(ImportError::NotAnArray);
    };

    for (index, item) in items.iter().enumerate() {
        for field in REQUIRED_FIELDS {
            if !is_present(item.get(field)) {
                return Err(ImportError::MissingField { index, field });
            }
        }
    }

    let mut tasks = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let task: Task = serde_json::from_value(item).map_err(|e| ImportError::InvalidTask {
            index,
            reason: e.to_string(),
        })?;
        tasks.push(task);
    }

    validate(&tasks)?;
    Ok(tasks)
}

/// Check a typed collection against the rules an import document must meet
///
/// Ids and titles must be non-blank and ids unique. Anything accepted here
/// loads back unchanged after `save`.
pub fn validate(tasks: &[Task]) -> Result<(), ImportError> {
    for (index, task) in tasks.iter().enumerate() {
        if task.id.as_str().trim().is_empty() {
            return Err(ImportError::MissingField { index, field: "id" });
        }
        if task.title.trim().is_empty() {
            return Err(ImportError::MissingField { index, field: "title" });
        }
    }

    let mut seen = HashSet::new();
    match tasks.iter().find(|task| !seen.insert(&task.id)) {
        Some(task) => Err(ImportError::DuplicateId(task.id.clone())),
        None => Ok(()),
    }
}

/// Write the export document to any byte sink
pub fn export_to<W: Write>(tasks: &[Task], mut writer: W) -> Result<()> {
    let document = export_document(tasks)?;
    writer.write_all(document.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Read and validate an import document from any byte source
pub fn import_from<R: Read>(mut reader: R) -> Result<Vec<Task>, ImportError> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    import_document(&text)
}

/// Write the export document to a file, or to `tasks.json` inside a directory
///
/// Returns the path written.
pub fn write_export_file(path: &Path, tasks: &[Task]) -> Result<PathBuf> {
    let path = if path.is_dir() {
        path.join(EXPORT_FILE_NAME)
    } else {
        path.to_path_buf()
    };

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .context("Failed to open export file")?;

    // Truncate only once we hold the lock
    file.lock_exclusive().context("Failed to acquire file lock")?;
    file.set_len(0)?;
    export_to(tasks, &file)?;
    file.sync_all()?;

    info!(path = ?path, count = tasks.len(), "Exported tasks");
    Ok(path)
}

// Mirrors the browser app's truthiness check on required fields
fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(Value::Bool(b)) => *b,
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}
