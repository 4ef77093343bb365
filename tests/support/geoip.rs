//! A minimal line-envelope consumer: CIDR + two letter country code, with
//! an optional `-region` suffix, one entry per line. Proves the library's
//! line loader and line envelope against a real, if small, format:
//!
//! ```text
//! geoip 1
//! count 2
//! 1.2.3.0/24 IT
//! 10.0.0.0/8 US-840
//! ```

use confplane::loader::ConfLoader;
use confplane::{ConfError, Result};
use std::net::Ipv4Addr;

pub struct GeoEntry {
    network: u32,
    prefix_len: u32,
    cc: String,
    region: u32,
}

#[derive(Default)]
pub struct GeoIpTable {
    entries: Vec<GeoEntry>,
}

impl GeoIpTable {
    pub fn lookup(&self, addr: Ipv4Addr) -> Option<(&str, u32)> {
        let bits = u32::from(addr);
        self.entries
            .iter()
            .filter(|e| matches(bits, e.network, e.prefix_len))
            .max_by_key(|e| e.prefix_len)
            .map(|e| (e.cc.as_str(), e.region))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn matches(bits: u32, network: u32, prefix_len: u32) -> bool {
    if prefix_len == 0 {
        return true;
    }
    let mask = u32::MAX << (32 - prefix_len);
    (bits & mask) == (network & mask)
}

pub fn load(loader: &mut ConfLoader) -> Result<GeoIpTable> {
    let header = loader
        .read_line()
        .ok_or_else(|| ConfError::parse(loader.path().display().to_string(), loader.line(), "missing type/version header"))?;
    let mut parts = header.split_whitespace();
    if parts.next() != Some("geoip") {
        return Err(ConfError::parse(loader.path().display().to_string(), loader.line(), "expected 'geoip' header"));
    }
    let version: u32 = parts
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ConfError::parse(loader.path().display().to_string(), loader.line(), "missing version"))?;
    if version != 1 {
        return Err(ConfError::parse(loader.path().display().to_string(), loader.line(), format!("unsupported version {version}")));
    }

    let count_line = loader
        .read_line()
        .ok_or_else(|| ConfError::parse(loader.path().display().to_string(), loader.line(), "missing count line"))?;
    let count: usize = count_line
        .strip_prefix("count ")
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| ConfError::parse(loader.path().display().to_string(), loader.line(), "malformed count line"))?;

    let mut table = GeoIpTable::default();
    while let Some(line) = loader.read_line() {
        if line.trim_start().starts_with('#') || line.trim().is_empty() {
            continue;
        }
        table.entries.push(parse_entry(loader, &line)?);
    }
    if let Some(err) = loader.err() {
        return Err(ConfError::parse(loader.path().display().to_string(), loader.line(), err.to_string()));
    }

    if table.entries.len() != count {
        return Err(ConfError::parse(
            loader.path().display().to_string(),
            loader.line(),
            format!("expected {count} entries, got {}", table.entries.len()),
        ));
    }

    Ok(table)
}

fn parse_entry(loader: &ConfLoader, line: &str) -> Result<GeoEntry> {
    let mut columns = line.split_whitespace();
    let cidr = columns
        .next()
        .ok_or_else(|| ConfError::parse(loader.path().display().to_string(), loader.line(), "missing CIDR column"))?;
    let cc_field = columns
        .next()
        .ok_or_else(|| ConfError::parse(loader.path().display().to_string(), loader.line(), "missing country code column"))?;

    let (addr_str, prefix_len) = match cidr.split_once('/') {
        Some((addr, len)) => (
            addr,
            len.parse()
                .map_err(|_| ConfError::parse(loader.path().display().to_string(), loader.line(), "invalid prefix length"))?,
        ),
        None => (cidr, 32),
    };
    let addr: Ipv4Addr = addr_str
        .parse()
        .map_err(|_| ConfError::parse(loader.path().display().to_string(), loader.line(), "invalid IPv4 address"))?;

    let (cc, region) = match cc_field.split_once('-') {
        Some((cc, region)) => (
            cc,
            region
                .parse()
                .map_err(|_| ConfError::parse(loader.path().display().to_string(), loader.line(), "invalid region"))?,
        ),
        None => (cc_field, 0),
    };
    if cc.len() != 2 || !cc.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ConfError::parse(loader.path().display().to_string(), loader.line(), "country code must be two letters"));
    }

    Ok(GeoEntry {
        network: u32::from(addr),
        prefix_len,
        cc: cc.to_ascii_uppercase(),
        region,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_entries_and_finds_longest_prefix_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geoip.conf");
        fs::write(&path, "geoip 1\ncount 2\n1.2.3.0/24 IT\n1.2.3.4/32 US-840\n").unwrap();

        let mut loader = ConfLoader::open(&path).unwrap();
        let table = load(&mut loader).unwrap();

        assert_eq!(table.lookup("1.2.3.4".parse().unwrap()), Some(("US", 840)));
        assert_eq!(table.lookup("1.2.3.5".parse().unwrap()), Some(("IT", 0)));
        assert_eq!(table.lookup("8.8.8.8".parse().unwrap()), None);
    }

    #[test]
    fn count_mismatch_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geoip.conf");
        fs::write(&path, "geoip 1\ncount 2\n1.2.3.0/24 IT\n").unwrap();

        let mut loader = ConfLoader::open(&path).unwrap();
        assert!(load(&mut loader).is_err());
    }
}
