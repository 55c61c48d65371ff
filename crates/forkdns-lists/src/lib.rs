//! Immutable lookup structures built from line-oriented list files.
//!
//! All lists share one text format: UTF-8, one entry per line, surrounding
//! whitespace trimmed, blank lines and lines starting with `#` ignored.

mod domain_list;
mod error;
mod ip_list;
mod parse;
mod pattern_list;

pub use domain_list::DomainList;
pub use error::ListError;
pub use ip_list::{IpList, NetworkRange};
pub use pattern_list::PatternList;
