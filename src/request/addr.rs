//! XDCC address parsing.
//!
//! Accepted forms, one request or request-range per token:
//!
//! ```text
//! irc.example.com/#channel/bot/5
//! irc.example.com/#channel/bot/5..8
//! #channel@irc.example.com/bot/5..20|2&41..46
//! ```
//!
//! A pack spec is a single number, an inclusive range `A..B`, a stepped range
//! `A..B|S`, or several of those joined by `&`. Ranges with `A >= B` are
//! rejected with a diagnostic for that token only.

use super::PackRequest;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddrError {
    #[error("\"{0}\" is not a valid XDCC address (expected irc.server.com/#chan/bot/pack)")]
    Malformed(String),

    #[error("invalid pack number \"{0}\"")]
    BadPack(String),

    #[error("invalid range {0} to {1}")]
    BadRange(u32, u32),

    #[error("invalid range step \"{0}\"")]
    BadStep(String),
}

/// Parse one address token into its expanded list of requests.
///
/// `info_key` is left at the `"*"` default; the caller points it at a
/// server-specific profile when one exists.
pub fn parse_address(token: &str) -> Result<Vec<PackRequest>, AddrError> {
    let token = token.trim();
    let malformed = || AddrError::Malformed(token.to_string());

    let (server, channel, bot, packs) = if let Some(rest) = token.strip_prefix('#') {
        // #channel@server/bot/packs
        let mut parts = rest.splitn(3, '/');
        let head = parts.next().ok_or_else(malformed)?;
        let bot = parts.next().ok_or_else(malformed)?;
        let packs = parts.next().ok_or_else(malformed)?;
        let (channel, server) = head.split_once('@').ok_or_else(malformed)?;
        (server, format!("#{}", channel), bot, packs)
    } else {
        // server/#channel/bot/packs
        let mut parts = token.splitn(4, '/');
        let server = parts.next().ok_or_else(malformed)?;
        let channel = parts.next().ok_or_else(malformed)?;
        let bot = parts.next().ok_or_else(malformed)?;
        let packs = parts.next().ok_or_else(malformed)?;
        if !channel.starts_with('#') {
            return Err(malformed());
        }
        (server, channel.to_string(), bot, packs)
    };

    if server.is_empty() || channel == "#" || bot.is_empty() || packs.is_empty() {
        return Err(malformed());
    }

    let mut requests = Vec::new();
    for spec in packs.split('&') {
        for pack in expand_pack_spec(spec)? {
            requests.push(PackRequest::new(server, &channel, bot, pack));
        }
    }
    Ok(requests)
}

/// Expand `N`, `A..B` or `A..B|S` into ascending pack numbers.
fn expand_pack_spec(spec: &str) -> Result<Vec<u32>, AddrError> {
    let Some((from, to)) = spec.split_once("..") else {
        let pack = spec
            .parse::<u32>()
            .map_err(|_| AddrError::BadPack(spec.to_string()))?;
        return Ok(vec![pack]);
    };

    let (to, step) = match to.split_once('|') {
        Some((to, step)) => {
            let step = step
                .parse::<u32>()
                .ok()
                .filter(|&s| s > 0)
                .ok_or_else(|| AddrError::BadStep(step.to_string()))?;
            (to, step)
        }
        None => (to, 1),
    };

    let from = from
        .parse::<u32>()
        .map_err(|_| AddrError::BadPack(from.to_string()))?;
    let to = to
        .parse::<u32>()
        .map_err(|_| AddrError::BadPack(to.to_string()))?;
    if from >= to {
        return Err(AddrError::BadRange(from, to));
    }

    Ok((from..=to).step_by(step as usize).collect())
}
