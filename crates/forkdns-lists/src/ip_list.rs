use std::io::BufRead;
use std::net::IpAddr;
use std::path::Path;

use crate::parse::{for_each_entry, open};
use crate::ListError;

/// Number of bits an IPv4 prefix is shifted by once the address is mapped into the IPv6 space
const IPV4_PREFIX_OFFSET: u8 = 96;

/// Maps an address into the shared 128-bit space. IPv4 addresses become `::ffff:a.b.c.d`.
pub fn normalize(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(ip) => u128::from(ip.to_ipv6_mapped()),
        IpAddr::V6(ip) => u128::from(ip),
    }
}

/// An IP network in the normalized 128-bit space. The base is always stored masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkRange {
    base: u128,
    prefix_len: u8,
}

impl NetworkRange {
    /// `prefix_len` is interpreted in the address family of `addr` (0..=32 for IPv4).
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self, String> {
        let (prefix_len, max) = match addr {
            IpAddr::V4(_) => (prefix_len as u16 + IPV4_PREFIX_OFFSET as u16, 32),
            IpAddr::V6(_) => (prefix_len as u16, 128),
        };
        if prefix_len > 128 {
            return Err(format!(
                "prefix length {} is out of range for {} (max {})",
                prefix_len - (128 - max),
                addr,
                max
            ));
        }
        let prefix_len = prefix_len as u8;

        Ok(NetworkRange {
            base: normalize(addr) & mask(prefix_len),
            prefix_len,
        })
    }

    /// Parses `address` or `address/prefix_len`. A bare address covers exactly one host.
    pub fn parse(s: &str) -> Result<Self, String> {
        let (raw_addr, raw_prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let addr: IpAddr = raw_addr
            .parse()
            .map_err(|e| format!("invalid IP address '{}': {}", raw_addr, e))?;

        let prefix_len = match (raw_prefix, addr) {
            (Some(raw_prefix), _) => raw_prefix
                .parse::<u8>()
                .map_err(|e| format!("invalid prefix length '{}': {}", raw_prefix, e))?,
            (None, IpAddr::V4(_)) => 32,
            (None, IpAddr::V6(_)) => 128,
        };

        NetworkRange::new(addr, prefix_len)
    }

    pub fn base(&self) -> u128 {
        self.base
    }

    /// Prefix length in the normalized space
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.contains_normalized(normalize(ip))
    }

    fn contains_normalized(&self, ip: u128) -> bool {
        ip & mask(self.prefix_len) == self.base
    }
}

fn mask(prefix_len: u8) -> u128 {
    match prefix_len {
        0 => 0,
        n => u128::MAX << (128 - n as u32),
    }
}

/// A sorted list of IPv4/IPv6 networks with `O(log n)` membership tests.
#[derive(Debug, Clone)]
pub struct IpList {
    ranges: Vec<NetworkRange>,
    sorted: bool,
}

impl Default for IpList {
    fn default() -> Self {
        IpList::new()
    }
}

impl IpList {
    pub fn new() -> Self {
        IpList {
            ranges: Vec::new(),
            sorted: true,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ListError> {
        let reader = open(path)?;
        IpList::from_reader(&path.display().to_string(), reader)
    }

    /// Builds a sorted list. `source_name` is only used in error messages.
    pub fn from_reader(source_name: &str, reader: impl BufRead) -> Result<Self, ListError> {
        let mut list = IpList::new();
        for_each_entry(source_name, reader, |entry| {
            list.push(NetworkRange::parse(entry)?);
            Ok(())
        })?;
        list.sort();

        tracing::debug!(source = source_name, len = list.len(), "Loaded IP list");

        Ok(list)
    }

    /// Adds a range. The list has to be sorted again before the next lookup.
    pub fn push(&mut self, range: NetworkRange) {
        self.ranges.push(range);
        self.sorted = false;
    }

    /// Sorts ranges by base address and drops ranges nested inside another one.
    ///
    /// CIDR ranges are either nested or disjoint, so after this pass the ranges are
    /// disjoint and the rightmost range starting at or below an address is the only
    /// one that can contain it.
    pub fn sort(&mut self) {
        self.ranges
            .sort_unstable_by(|a, b| a.base.cmp(&b.base).then(a.prefix_len.cmp(&b.prefix_len)));

        let mut kept: Vec<NetworkRange> = Vec::with_capacity(self.ranges.len());
        for range in self.ranges.drain(..) {
            match kept.last() {
                Some(last) if last.contains_normalized(range.base) => continue,
                _ => kept.push(range),
            }
        }
        self.ranges = kept;
        self.sorted = true;
    }

    /// # Panics
    ///
    /// Panics if a range was pushed after the last [`IpList::sort`].
    pub fn contains(&self, ip: IpAddr) -> bool {
        assert!(self.sorted, "bug: IpList lookup before sort()");

        let ip = normalize(ip);
        let idx = self.ranges.partition_point(|range| range.base <= ip);
        idx.checked_sub(1)
            .is_some_and(|idx| self.ranges[idx].contains_normalized(ip))
    }

    /// Number of disjoint ranges kept after sorting
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
