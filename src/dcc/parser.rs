//! DCC CTCP message parsing.
//!
//! Handles `DCC SEND <filename> <ip_decimal> <port> <filesize>` offers and
//! `DCC ACCEPT <filename> <port> <offset>` resume confirmations. Filenames
//! may be bare or double-quoted; the peer IP arrives as a decimal u32 in
//! network byte order.

use std::net::{IpAddr, Ipv4Addr};

/// A parsed DCC SEND offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DccSend {
    /// Offered filename with quotes stripped.
    pub filename: String,
    /// Filename exactly as it appeared in the offer, quotes included. Echoed
    /// back in DCC RESUME so the bot can match the request.
    pub raw_name: String,
    pub ip: IpAddr,
    pub port: u16,
    pub size: u64,
}

/// A parsed DCC ACCEPT reply to a resume request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DccAccept {
    pub filename: String,
    pub port: u16,
    pub offset: u64,
}

/// Split a possibly-quoted filename off the front of a DCC argument list.
fn split_name(content: &str) -> Option<(String, String, &str)> {
    if let Some(rest) = content.strip_prefix('"') {
        let end = rest.find('"')?;
        let name = rest[..end].to_string();
        let raw = format!("\"{}\"", name);
        Some((name, raw, rest[end + 1..].trim_start()))
    } else {
        let (name, rest) = content.split_once(' ')?;
        Some((name.to_string(), name.to_string(), rest))
    }
}

/// Parse a `DCC SEND` CTCP payload.
pub fn parse_dcc_send(ctcp: &str) -> Option<DccSend> {
    let content = ctcp.trim().strip_prefix("DCC SEND ")?;
    let (filename, raw_name, rest) = split_name(content)?;

    let parts: Vec<&str> = rest.split_whitespace().collect();
    if parts.len() < 3 {
        return None;
    }

    let ip_decimal: u32 = parts[0].parse().ok()?;
    let ip = IpAddr::V4(Ipv4Addr::from(ip_decimal));
    let port: u16 = parts[1].parse().ok()?;
    let size: u64 = parts[2].parse().ok()?;

    Some(DccSend {
        filename,
        raw_name,
        ip,
        port,
        size,
    })
}

/// Parse a `DCC ACCEPT` CTCP payload.
pub fn parse_dcc_accept(ctcp: &str) -> Option<DccAccept> {
    let content = ctcp.trim().strip_prefix("DCC ACCEPT ")?;
    let (filename, _, rest) = split_name(content)?;

    let parts: Vec<&str> = rest.split_whitespace().collect();
    if parts.len() < 2 {
        return None;
    }

    let port: u16 = parts[0].parse().ok()?;
    let offset: u64 = parts[1].parse().ok()?;

    Some(DccAccept {
        filename,
        port,
        offset,
    })
}
