use std::io::BufRead;
use std::path::Path;

use regex::Regex;

use crate::parse::{for_each_entry, open};
use crate::ListError;

/// A list of regular expressions matched against query names.
///
/// Every pattern is tried in order, so long lists get slow quickly.
#[derive(Debug, Clone, Default)]
pub struct PatternList {
    patterns: Vec<Regex>,
}

impl PatternList {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn from_path(path: &Path) -> Result<Self, ListError> {
        let reader = open(path)?;
        PatternList::from_reader(&path.display().to_string(), reader)
    }

    /// One pattern per line. `source_name` is only used in error messages.
    pub fn from_reader(source_name: &str, reader: impl BufRead) -> Result<Self, ListError> {
        let mut list = PatternList::new();
        for_each_entry(source_name, reader, |entry| {
            let re = Regex::new(entry).map_err(|e| format!("failed to compile regex '{}': {}", entry, e))?;
            list.patterns.push(re);
            Ok(())
        })?;

        tracing::debug!(source = source_name, len = list.len(), "Loaded pattern list");

        Ok(list)
    }

    pub fn is_match(&self, qname: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(qname))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
