//! Address range -> network number snapshot.
//!
//! ## Dataset format
//!
//! Tab-separated, one range per line, IPv4 and IPv6 mixed:
//!
//! ```text
//! range_start  range_end  as_number  country_code  as_description
//! 1.0.0.0      1.0.0.255  13335      US            CLOUDFLARENET
//! ```
//!
//! The file may be gzip-compressed (detected from the magic bytes). Network
//! number `0` marks unrouted space and never matches.

use flate2::read::GzDecoder;
use std::io::{BufRead, BufReader};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug)]
pub enum TableError {
    Io(std::io::Error),
    Fetch(String),
    Status(u16),
    Empty { skipped: usize },
    Task(String),
}

impl std::fmt::Display for TableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableError::Io(e) => write!(f, "I/O error reading range dataset: {}", e),
            TableError::Fetch(msg) => write!(f, "Failed to download range dataset: {}", msg),
            TableError::Status(code) => write!(f, "Range dataset download returned HTTP {}", code),
            TableError::Empty { skipped } => {
                write!(f, "Range dataset contains no usable ranges ({} lines skipped)", skipped)
            }
            TableError::Task(msg) => write!(f, "Range dataset parser failed: {}", msg),
        }
    }
}

impl std::error::Error for TableError {}

impl From<std::io::Error> for TableError {
    fn from(e: std::io::Error) -> Self {
        TableError::Io(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Range<T> {
    start: T,
    end: T,
    asn: u32,
}

fn find<T: Ord + Copy>(ranges: &[Range<T>], key: T) -> Option<u32> {
    let idx = ranges.partition_point(|r| r.start <= key);
    let candidate = ranges.get(idx.checked_sub(1)?)?;
    (key <= candidate.end && candidate.asn != 0).then_some(candidate.asn)
}

/// Immutable snapshot of the range dataset.
#[derive(Debug, Default)]
pub struct OrganizationTable {
    v4: Vec<Range<u32>>,
    v6: Vec<Range<u128>>,
    skipped: usize,
}

impl OrganizationTable {
    /// Decodes a dataset, gzip-compressed or plain.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TableError> {
        if bytes.starts_with(&GZIP_MAGIC) {
            Self::parse(BufReader::new(GzDecoder::new(bytes)))
        } else {
            Self::parse(bytes)
        }
    }

    pub fn parse<R: BufRead>(reader: R) -> Result<Self, TableError> {
        let mut table = OrganizationTable::default();

        for line in reader.lines() {
            let line = line?;
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if !table.insert_line(line) {
                table.skipped += 1;
            }
        }

        if table.is_empty() {
            return Err(TableError::Empty {
                skipped: table.skipped,
            });
        }

        table.v4.sort_unstable_by_key(|r| r.start);
        table.v6.sort_unstable_by_key(|r| r.start);
        Ok(table)
    }

    fn insert_line(&mut self, line: &str) -> bool {
        let mut fields = line.split('\t');
        let (Some(start), Some(end), Some(asn)) = (fields.next(), fields.next(), fields.next()) else {
            return false;
        };
        let Ok(asn) = asn.trim().parse::<u32>() else {
            return false;
        };

        match (start.trim().parse::<IpAddr>(), end.trim().parse::<IpAddr>()) {
            (Ok(IpAddr::V4(start)), Ok(IpAddr::V4(end))) if start <= end => {
                self.v4.push(Range {
                    start: u32::from(start),
                    end: u32::from(end),
                    asn,
                });
                true
            }
            (Ok(IpAddr::V6(start)), Ok(IpAddr::V6(end))) if start <= end => {
                self.v6.push(Range {
                    start: u128::from(start),
                    end: u128::from(end),
                    asn,
                });
                true
            }
            _ => false,
        }
    }

    /// Network number owning `addr`, `None` for unrouted or unknown space.
    pub fn asn_of(&self, addr: IpAddr) -> Option<u32> {
        match addr {
            IpAddr::V4(v4) => self.asn_of_v4(v4),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => self.asn_of_v4(v4),
                None => self.asn_of_v6(v6),
            },
        }
    }

    fn asn_of_v4(&self, addr: Ipv4Addr) -> Option<u32> {
        find(&self.v4, u32::from(addr))
    }

    fn asn_of_v6(&self, addr: Ipv6Addr) -> Option<u32> {
        find(&self.v6, u128::from(addr))
    }

    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lines ignored as malformed while parsing.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}
