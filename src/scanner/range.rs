//! IPv4 host ranges under a /24 prefix

use std::fmt;
use std::net::Ipv4Addr;

use crate::error::ConfigError;

/// Inclusive host-suffix range under a three-octet prefix
///
/// `192.168.31` with `1..=3` covers `192.168.31.1` to `192.168.31.3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    prefix: [u8; 3],
    start: u8,
    end: u8,
}

impl ScanRange {
    /// Validate and build a range
    pub fn new(base: &str, start: u32, end: u32) -> Result<Self, ConfigError> {
        let prefix = parse_base(base)?;
        let start = suffix(start)?;
        let end = suffix(end)?;

        if start > end {
            return Err(ConfigError::EmptyRange {
                start: start.into(),
                end: end.into(),
            });
        }

        Ok(Self { prefix, start, end })
    }

    /// Prefix in `a.b.c` form
    pub fn base(&self) -> String {
        let [a, b, c] = self.prefix;
        format!("{}.{}.{}", a, b, c)
    }

    pub fn start(&self) -> u8 {
        self.start
    }

    pub fn end(&self) -> u8 {
        self.end
    }

    /// Number of addresses covered
    pub fn len(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    /// Always false; an empty range cannot be constructed
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `ip` falls inside the range
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let [a, b, c, d] = ip.octets();
        [a, b, c] == self.prefix && (self.start..=self.end).contains(&d)
    }

    /// Addresses in ascending order
    pub fn addresses(&self) -> impl Iterator<Item = Ipv4Addr> {
        let [a, b, c] = self.prefix;
        (self.start..=self.end).map(move |d| Ipv4Addr::new(a, b, c, d))
    }

    /// Split into consecutive sub-ranges of at most `size` addresses
    pub fn batches(&self, size: usize) -> Vec<ScanRange> {
        let size = size.clamp(1, 256);
        let mut batches = Vec::with_capacity(self.len().div_ceil(size));

        let mut start = u32::from(self.start);
        let end = u32::from(self.end);
        while start <= end {
            let batch_end = (start + size as u32 - 1).min(end);
            batches.push(ScanRange {
                prefix: self.prefix,
                start: start as u8,
                end: batch_end as u8,
            });
            start = batch_end + 1;
        }
        batches
    }
}

impl fmt::Display for ScanRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{base}.{} ~ {base}.{}", self.start, self.end, base = self.base())
    }
}

fn parse_base(base: &str) -> Result<[u8; 3], ConfigError> {
    let invalid = || ConfigError::InvalidBaseAddress(base.to_string());

    let mut octets = [0u8; 3];
    let mut parts = base.trim().split('.');
    for octet in octets.iter_mut() {
        let part = parts.next().ok_or_else(invalid)?;
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        *octet = part.parse().map_err(|_| invalid())?;
    }

    if parts.next().is_some() {
        return Err(invalid());
    }
    Ok(octets)
}

fn suffix(value: u32) -> Result<u8, ConfigError> {
    u8::try_from(value).map_err(|_| ConfigError::SuffixOutOfRange(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range() {
        let range = ScanRange::new("192.168.31", 1, 3).unwrap();

        assert_eq!(range.base(), "192.168.31");
        assert_eq!(range.len(), 3);
        assert_eq!(
            range.addresses().collect::<Vec<_>>(),
            vec![
                Ipv4Addr::new(192, 168, 31, 1),
                Ipv4Addr::new(192, 168, 31, 2),
                Ipv4Addr::new(192, 168, 31, 3),
            ]
        );
        assert_eq!(range.to_string(), "192.168.31.1 ~ 192.168.31.3");
    }

    #[test]
    fn test_invalid_base() {
        for base in ["192.168", "192.168.31.0", "192.168.x", "300.1.1", "", "1..2"] {
            assert_eq!(
                ScanRange::new(base, 0, 1),
                Err(ConfigError::InvalidBaseAddress(base.to_string())),
                "{base}"
            );
        }
    }

    #[test]
    fn test_invalid_suffixes() {
        assert_eq!(
            ScanRange::new("10.0.0", 0, 256),
            Err(ConfigError::SuffixOutOfRange(256))
        );
        assert_eq!(
            ScanRange::new("10.0.0", 9, 3),
            Err(ConfigError::EmptyRange { start: 9, end: 3 })
        );
    }

    #[test]
    fn test_batches_cover_range() {
        let range = ScanRange::new("10.0.0", 0, 255).unwrap();
        let batches = range.batches(10);

        assert_eq!(batches.len(), 26);
        assert_eq!((batches[0].start(), batches[0].end()), (0, 9));
        assert_eq!((batches[25].start(), batches[25].end()), (250, 255));

        let flattened: Vec<Ipv4Addr> = batches.iter().flat_map(|b| b.addresses()).collect();
        assert_eq!(flattened, range.addresses().collect::<Vec<_>>());
    }

    #[test]
    fn test_single_address_batches() {
        let range = ScanRange::new("10.0.0", 7, 7).unwrap();
        assert_eq!(range.batches(0), vec![range]);
        assert!(range.contains(Ipv4Addr::new(10, 0, 0, 7)));
        assert!(!range.contains(Ipv4Addr::new(10, 0, 1, 7)));
    }
}
