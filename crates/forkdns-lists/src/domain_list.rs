use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;

use crate::parse::{for_each_entry, open};
use crate::ListError;

const MAX_LABEL_LENGTH: usize = 63;
/// Longest canonical name (text form, trailing dot included) that fits into a bucket
const MAX_NAME_LENGTH: usize = 256;

/// Set of names keyed by a zero-padded byte array, so lookups hash a fixed-size key.
#[derive(Debug, Clone, Default)]
struct Bucket<const N: usize> {
    keys: HashSet<[u8; N]>,
}

impl<const N: usize> Bucket<N> {
    fn key(fqdn: &str) -> [u8; N] {
        let mut key = [0; N];
        key[..fqdn.len()].copy_from_slice(fqdn.as_bytes());
        key
    }

    fn insert(&mut self, fqdn: &str) {
        self.keys.insert(Self::key(fqdn));
    }

    fn contains(&self, fqdn: &str) -> bool {
        self.keys.contains(&Self::key(fqdn))
    }
}

/// A set of domains where every entry also covers all of its subdomains.
///
/// Adding `example.com` makes `example.com`, `a.example.com` and `a.b.example.com` members,
/// but not `badexample.com`.
#[derive(Debug, Clone, Default)]
pub struct DomainList {
    short: Bucket<16>,
    medium: Bucket<32>,
    long: Bucket<MAX_NAME_LENGTH>,
}

impl DomainList {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn from_path(path: &Path) -> Result<Self, ListError> {
        let reader = open(path)?;
        DomainList::from_reader(&path.display().to_string(), reader)
    }

    /// `source_name` is only used in error messages.
    pub fn from_reader(source_name: &str, reader: impl BufRead) -> Result<Self, ListError> {
        let mut list = DomainList::new();
        for_each_entry(source_name, reader, |entry| list.insert(entry))?;

        tracing::debug!(source = source_name, len = list.len(), "Loaded domain list");

        Ok(list)
    }

    /// Adds a domain, returning the reason if it isn't a valid domain name.
    pub fn insert(&mut self, domain: &str) -> Result<(), String> {
        let fqdn = canonicalize(domain).ok_or_else(|| format!("invalid domain name '{}'", domain))?;
        match fqdn.len() {
            0..=16 => self.short.insert(&fqdn),
            17..=32 => self.medium.insert(&fqdn),
            _ => self.long.insert(&fqdn),
        }
        Ok(())
    }

    /// Checks whether the domain or any of its parent domains is in the list.
    ///
    /// Invalid names are never members.
    pub fn has(&self, domain: &str) -> bool {
        let Some(fqdn) = canonicalize(domain) else {
            return false;
        };

        let mut suffix = fqdn.as_str();
        loop {
            if self.contains_exact(suffix) {
                return true;
            }
            match suffix.find('.') {
                // Stop before the root label
                Some(dot_idx) if dot_idx + 1 < suffix.len() => suffix = &suffix[dot_idx + 1..],
                _ => return false,
            }
        }
    }

    fn contains_exact(&self, fqdn: &str) -> bool {
        match fqdn.len() {
            0 => false,
            1..=16 => self.short.contains(fqdn),
            17..=32 => self.medium.contains(fqdn),
            _ => self.long.contains(fqdn),
        }
    }

    pub fn len(&self) -> usize {
        self.short.keys.len() + self.medium.keys.len() + self.long.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lowercases the name and appends the root label.
///
/// Returns `None` for empty or oversized names, empty or oversized labels and
/// non-printable characters.
fn canonicalize(domain: &str) -> Option<String> {
    if domain.is_empty() {
        return None;
    }
    if domain == "." {
        return Some(".".into());
    }

    let mut fqdn = domain.to_ascii_lowercase();
    if !fqdn.ends_with('.') {
        fqdn.push('.');
    }
    if fqdn.len() > MAX_NAME_LENGTH {
        return None;
    }

    let labels_valid = fqdn[..fqdn.len() - 1].split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LENGTH
            && label.bytes().all(|byte| byte.is_ascii_graphic() && byte != b'\\')
    });

    labels_valid.then_some(fqdn)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn list(domains: &[&str]) -> DomainList {
        let mut list = DomainList::new();
        for domain in domains {
            list.insert(domain).expect("shouldn't have failed");
        }
        list
    }

    #[test]
    fn suffix_matching() {
        let list = list(&["cn", "a.com", "b.com", "abc.com", "123456789012345678901234567890.com"]);

        assert!(list.has("a.cn"));
        assert!(list.has("a.b.cn"));
        assert!(list.has("a.com"));
        assert!(list.has("b.com"));
        assert!(!list.has("c.com"));
        assert!(!list.has("a.c.com"));
        assert!(list.has("123456789012345678901234567890.com"));
        assert!(list.has("abc.abc.com"));
        assert!(!list.has("com"));
    }

    #[test]
    fn no_partial_label_matches() {
        let list = list(&["example.com"]);

        assert!(!list.has("badexample.com"));
        assert!(!list.has("example.com.evil"));
        assert!(list.has("www.example.com."));
    }

    #[test]
    fn names_are_case_insensitive_and_fqdn() {
        let list = list(&["Example.COM."]);

        assert!(list.has("example.com"));
        assert!(list.has("WWW.EXAMPLE.COM."));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn names_land_in_every_bucket() {
        let long_name = format!("{}.{}.com", "a".repeat(63), "b".repeat(63));
        let list = list(&["short.io", "a-medium-length-name.org", long_name.as_str()]);

        assert_eq!(list.len(), 3);
        assert!(list.has("x.short.io"));
        assert!(list.has("y.a-medium-length-name.org"));
        assert!(list.has(&format!("z.{}", long_name)));
    }

    #[test]
    fn insert_rejects_invalid_names() {
        let mut list = DomainList::new();

        assert!(list.insert("").is_err());
        assert!(list.insert("a..com").is_err());
        assert!(list.insert("has space.com").is_err());
        assert!(list.insert(&"a".repeat(64)).is_err());
        assert!(list.insert(&"a.".repeat(129)).is_err());
        assert!(list.insert(&String::from_utf8(vec![0; 256]).unwrap()).is_err());
        assert!(list.is_empty());
    }

    #[test]
    fn has_is_total() {
        let list = list(&["com"]);

        assert!(!list.has(""));
        assert!(!list.has("a..com"));
        assert!(!list.has(&format!("{}.com", "a.".repeat(200))));
    }

    #[test]
    fn root_entry_matches_only_root() {
        let list = list(&["."]);

        assert!(list.has("."));
        assert!(!list.has("com"));
    }

    #[test]
    fn from_reader_skips_comments() {
        let list = DomainList::from_reader("domains", "# ads\n\n  ads.example  \nexample.org\n".as_bytes())
            .expect("shouldn't have failed");

        assert_eq!(list.len(), 2);
        assert!(list.has("x.ads.example"));
        assert!(list.has("example.org"));
    }

    #[test]
    fn from_reader_reports_line() {
        let err = DomainList::from_reader("domains", "ok.com\nnot a domain\n".as_bytes()).unwrap_err();

        assert!(matches!(err, ListError::Parse { line: 2, .. }));
        assert!(err.to_string().contains("'domains' line 2"));
    }

    fn arb_label() -> impl Strategy<Value = String> {
        "[a-z0-9][a-z0-9-]{0,20}"
    }

    fn arb_domain() -> impl Strategy<Value = String> {
        proptest::collection::vec(arb_label(), 1..4).prop_map(|labels| labels.join("."))
    }

    proptest! {
        #[test]
        fn members_cover_subdomains(domain in arb_domain(), prefix in arb_label()) {
            let list = list(&[domain.as_str()]);

            let subdomain = format!("{}.{}", prefix, domain);

            prop_assert!(list.has(&domain));
            prop_assert!(list.has(&subdomain));
        }

        #[test]
        fn siblings_are_not_members(domain in arb_domain(), other in arb_label()) {
            let member = format!("{}.test", domain);
            let list = list(&[member.as_str()]);
            let sibling = format!("{}x.test", domain);

            let below_sibling = format!("{}.{}", other, sibling);

            prop_assert!(!list.has(&sibling));
            prop_assert!(!list.has(&below_sibling));
        }

        #[test]
        fn loading_twice_is_equivalent(domains in proptest::collection::vec(arb_domain(), 0..10), probe in arb_domain()) {
            let src = domains.join("\n");
            let first = DomainList::from_reader("a", src.as_bytes()).unwrap();
            let second = DomainList::from_reader("b", src.as_bytes()).unwrap();

            prop_assert_eq!(first.len(), second.len());
            prop_assert_eq!(first.has(&probe), second.has(&probe));
        }
    }
}
