use std::collections::HashSet;
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

use crate::error::{Result, ScanError};

pub const LOWEST_PORT: u16 = 1;
pub const HIGHEST_PORT: u16 = 65535;

/// Parse a port specification into TCP ports (1..=65535), first occurrence
/// order, duplicates dropped.
///
/// Items are single ports (`80`) or inclusive ranges (`8000-8010`),
/// separated by commas or newlines. `#` starts a comment.
pub fn parse_ports_str(s: &str) -> Result<Vec<u16>> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let content = raw_line.split('#').next().unwrap_or_default();
        for item in content.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            let range = parse_item(item)
                .map_err(|e| ScanError::InvalidPorts(format!("line {}: {e}", idx + 1)))?;
            out.extend(range.filter(|p| seen.insert(*p)));
        }
    }
    Ok(out)
}

fn parse_item(item: &str) -> std::result::Result<RangeInclusive<u16>, String> {
    let Some((a, b)) = item.split_once('-') else {
        let port = parse_port_str(item)?;
        return Ok(port..=port);
    };
    let (start, end) = (parse_port_str(a.trim())?, parse_port_str(b.trim())?);
    if start > end {
        return Err(format!("range {start}-{end} runs backwards"));
    }
    Ok(start..=end)
}

/// Load a ports list from a file path. Errors if the file cannot be read or parsed.
pub fn load_ports_from_path(path: impl AsRef<Path>) -> Result<Vec<u16>> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_ports_str(&content)
}

/// Every TCP port, 1 through 65535.
pub fn full_range() -> Vec<u16> {
    (LOWEST_PORT..=HIGHEST_PORT).collect()
}

/// Best-known service name for a handful of well-known ports.
pub fn service_name(port: u16) -> Option<&'static str> {
    let name = match port {
        21 => "FTP",
        22 => "SSH",
        23 => "Telnet",
        25 => "SMTP",
        53 => "DNS",
        80 => "HTTP",
        110 => "POP3",
        143 => "IMAP",
        443 => "HTTPS",
        3389 => "RDP",
        _ => return None,
    };
    Some(name)
}

fn parse_port_str(s: &str) -> std::result::Result<u16, String> {
    let val: u32 = s.parse::<u32>().map_err(|e| format!("{s}: {e}"))?;
    if val < u32::from(LOWEST_PORT) || val > u32::from(HIGHEST_PORT) {
        return Err(format!("port out of range: {val}"));
    }
    Ok(val as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_of_first_appearance() {
        let ports = parse_ports_str("161\n160-162\n  23 \n161").unwrap();
        assert_eq!(ports, vec![161, 160, 162, 23]);
    }

    #[test]
    fn parse_comma_separated() {
        let ports = parse_ports_str("22, 80,8000-8001").unwrap();
        assert_eq!(ports, vec![22, 80, 8000, 8001]);
    }

    #[test]
    fn out_of_range_names_the_line() {
        match parse_ports_str("22\n70000") {
            Err(ScanError::InvalidPorts(msg)) => assert!(msg.starts_with("line 2")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn well_known_services() {
        assert_eq!(service_name(22), Some("SSH"));
        assert_eq!(service_name(3389), Some("RDP"));
        assert_eq!(service_name(8080), None);
    }

    #[test]
    fn full_range_bounds() {
        let all = full_range();
        assert_eq!(all.len(), 65535);
        assert_eq!(all.first(), Some(&1));
        assert_eq!(all.last(), Some(&65535));
    }
}
