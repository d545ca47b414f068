//! Pack requests and the per-server request queue.

pub mod addr;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Profile key used when no server-specific credentials are configured.
pub const DEFAULT_INFO_KEY: &str = "*";

/// One requested pack, identified by `(server, channel, bot, pack)`.
///
/// `info_key` names the credential profile to use and is not part of the
/// request's identity.
#[derive(Debug, Clone, Eq)]
pub struct PackRequest {
    pub server: String,
    pub channel: String,
    pub bot: String,
    pub pack: u32,
    pub info_key: String,
}

impl PackRequest {
    pub fn new(server: &str, channel: &str, bot: &str, pack: u32) -> Self {
        Self {
            server: server.to_string(),
            channel: channel.to_string(),
            bot: bot.to_string(),
            pack,
            info_key: DEFAULT_INFO_KEY.to_string(),
        }
    }

    /// Sort key for deterministic processing within one server.
    fn sort_key(&self) -> (&str, &str, u32) {
        (&self.channel, &self.bot, self.pack)
    }
}

impl PartialEq for PackRequest {
    fn eq(&self, other: &Self) -> bool {
        self.server == other.server
            && self.channel == other.channel
            && self.bot == other.bot
            && self.pack == other.pack
    }
}

impl fmt::Display for PackRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[ {}, {}, {}, {}, {} ]",
            self.server, self.channel, self.bot, self.pack, self.info_key
        )
    }
}

/// Ordered, deduplicated sequence of requests for one server.
///
/// Requests are stably sorted by `(channel, bot, pack)`; no two retained
/// elements are equal under [`PackRequest`] equality.
#[derive(Debug, Default)]
pub struct RequestQueue {
    items: Vec<PackRequest>,
    cursor: usize,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request unless an equal one is already queued.
    pub fn enqueue(&mut self, request: PackRequest) {
        if !self.items.contains(&request) {
            let pos = self
                .items
                .binary_search_by(|probe| {
                    probe
                        .sort_key()
                        .cmp(&request.sort_key())
                        .then(Ordering::Less)
                })
                .unwrap_err();
            self.items.insert(pos, request);
        }
    }

    /// Next request in sorted order, advancing the cursor.
    pub fn next(&mut self) -> Option<PackRequest> {
        let request = self.items.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(request)
    }

    pub fn remaining(&self) -> usize {
        self.items.len() - self.cursor
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackRequest> {
        self.items.iter()
    }
}

/// Group parsed requests into per-server queues, in stable server order.
pub fn group_by_server(requests: Vec<PackRequest>) -> BTreeMap<String, RequestQueue> {
    let mut queues: BTreeMap<String, RequestQueue> = BTreeMap::new();
    for request in requests {
        queues
            .entry(request.server.clone())
            .or_default()
            .enqueue(request);
    }
    queues
}
