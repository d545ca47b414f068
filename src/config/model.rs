//! Configuration data model.
//!
//! All structs derive `Serialize`/`Deserialize` for TOML persistence. Every
//! field has a default so an empty config file works. Server credential
//! profiles live in a table keyed by server name, with `"*"` as the fallback
//! profile for servers that have no entry of their own.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::request::DEFAULT_INFO_KEY;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory downloaded files are written to.
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    /// Skip packs whose file already exists at its full size.
    #[serde(default)]
    pub skip_existing: bool,

    /// Keep waiting when a bot reports its transfer slots are full and has
    /// queued us, instead of cancelling the request.
    #[serde(default = "default_true")]
    pub allow_bot_queue: bool,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Credential profiles keyed by server name; `"*"` is the default.
    #[serde(default)]
    pub servers: BTreeMap<String, ServerProfile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
            skip_existing: false,
            allow_bot_queue: true,
            timeouts: TimeoutConfig::default(),
            servers: BTreeMap::new(),
        }
    }
}

fn default_out_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

/// Protocol timeouts and pacing, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// TCP connect timeout for control and data connections.
    #[serde(default = "default_connect")]
    pub connect_secs: u64,

    /// How long to wait for a DCC SEND offer after an XDCC request.
    #[serde(default = "default_response")]
    pub send_response_secs: u64,

    /// How long to wait for DCC ACCEPT before restarting from offset 0.
    #[serde(default = "default_response")]
    pub resume_accept_secs: u64,

    /// Cooldown between consecutive XDCC requests on one server.
    #[serde(default = "default_cooldown")]
    pub request_cooldown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: default_connect(),
            send_response_secs: default_response(),
            resume_accept_secs: default_response(),
            request_cooldown_secs: default_cooldown(),
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn send_response(&self) -> Duration {
        Duration::from_secs(self.send_response_secs)
    }

    pub fn resume_accept(&self) -> Duration {
        Duration::from_secs(self.resume_accept_secs)
    }

    pub fn request_cooldown(&self) -> Duration {
        Duration::from_secs(self.request_cooldown_secs)
    }
}

fn default_connect() -> u64 {
    10
}

fn default_response() -> u64 {
    10
}

fn default_cooldown() -> u64 {
    5
}

/// Credentials and identity used on one server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerProfile {
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub realname: Option<String>,
    /// Server password, sent with PASS during registration.
    #[serde(default)]
    pub pass: Option<String>,
    /// NickServ password; enables the IDENTIFY step when set.
    #[serde(default)]
    pub nickserv: Option<String>,
}

impl ServerProfile {
    pub fn nick(&self) -> &str {
        self.nick.as_deref().unwrap_or("xget")
    }

    pub fn user(&self) -> &str {
        self.user.as_deref().unwrap_or_else(|| self.nick())
    }

    pub fn realname(&self) -> &str {
        self.realname.as_deref().unwrap_or_else(|| self.nick())
    }
}

/// Resolve the profile for `info_key`, falling back to the `"*"` default and
/// then to built-in defaults. Pure lookup, called once per connection.
pub fn resolve_profile(
    info_key: &str,
    servers: &BTreeMap<String, ServerProfile>,
) -> ServerProfile {
    servers
        .get(info_key)
        .or_else(|| servers.get(DEFAULT_INFO_KEY))
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_parses_with_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.out_dir, PathBuf::from("."));
        assert!(!cfg.skip_existing);
        assert!(cfg.allow_bot_queue);
        assert_eq!(cfg.timeouts.request_cooldown_secs, 5);
    }

    #[test]
    fn parses_server_profiles() {
        let cfg: Config = toml::from_str(
            r#"
            out_dir = "/tmp/downloads"
            skip_existing = true

            [servers."*"]
            nick = "anon"

            [servers."irc.example.com"]
            nick = "someone"
            nickserv = "hunter2"
            "#,
        )
        .unwrap();

        assert!(cfg.skip_existing);
        assert_eq!(cfg.servers.len(), 2);
        assert_eq!(
            cfg.servers["irc.example.com"].nickserv.as_deref(),
            Some("hunter2")
        );
    }

    #[test]
    fn resolve_prefers_exact_key() {
        let mut servers = BTreeMap::new();
        servers.insert(
            "*".to_string(),
            ServerProfile {
                nick: Some("fallback".into()),
                ..Default::default()
            },
        );
        servers.insert(
            "irc.example.com".to_string(),
            ServerProfile {
                nick: Some("exact".into()),
                ..Default::default()
            },
        );

        assert_eq!(resolve_profile("irc.example.com", &servers).nick(), "exact");
        assert_eq!(resolve_profile("irc.other.net", &servers).nick(), "fallback");
        assert_eq!(resolve_profile("*", &servers).nick(), "fallback");
    }

    #[test]
    fn profile_falls_back_to_builtin_nick() {
        let profile = resolve_profile("anything", &BTreeMap::new());
        assert_eq!(profile.nick(), "xget");
        assert_eq!(profile.user(), "xget");
    }
}
