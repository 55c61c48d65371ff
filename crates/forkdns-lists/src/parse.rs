use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::ListError;

/// Calls `process_line` for every entry of a list source, passing the 1-based line number.
///
/// A `reason` returned by `process_line` is turned into a [`ListError::Parse`] for that line.
pub(crate) fn for_each_entry<R, F>(source_name: &str, reader: R, mut process_line: F) -> Result<(), ListError>
where
    R: BufRead,
    F: FnMut(&str) -> Result<(), String>,
{
    for (idx, line) in reader.split(b'\n').enumerate() {
        let line = line.map_err(|source| ListError::Io {
            source_name: source_name.to_owned(),
            source,
        })?;
        let line = std::str::from_utf8(&line).map_err(|e| ListError::Parse {
            source_name: source_name.to_owned(),
            line: idx + 1,
            reason: format!("invalid UTF-8: {}", e),
        })?;

        let entry = line.trim();
        // Skip comments and empty lines
        if entry.is_empty() || entry.starts_with('#') {
            continue;
        }

        process_line(entry).map_err(|reason| ListError::Parse {
            source_name: source_name.to_owned(),
            line: idx + 1,
            reason,
        })?;
    }

    Ok(())
}

pub(crate) fn open(path: &Path) -> Result<BufReader<File>, ListError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ListError::Io {
            source_name: path.display().to_string(),
            source,
        })
}
