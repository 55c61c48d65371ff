use thiserror::Error;

#[derive(Debug, Error)]
pub enum ListError {
    #[error("error while reading '{source_name}': {source}")]
    Io {
        source_name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{source_name}' line {line}: {reason}")]
    Parse {
        source_name: String,
        line: usize,
        reason: String,
    },
}
