//! IRC line parser.
//!
//! Parses one inbound line into a structured [`IrcMessage`]. The parser is a
//! total function: a line that does not match the grammar still comes back as
//! a partial structure (possibly with an empty command) for the caller to log
//! and ignore. Nothing here is fatal.

/// A decoded IRC line: `[':' prefix SP] command [SP middle]* [SP ':' trailing]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    /// Sender prefix without the leading `:`, e.g. `NickServ!svc@services.`.
    pub prefix: Option<String>,
    /// Command or three-digit numeric, e.g. `PRIVMSG` or `376`.
    pub command: String,
    /// Middle parameters followed by the trailing parameter, if any.
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Parse a single line (line terminator already stripped by the transport).
    pub fn parse(line: &str) -> IrcMessage {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        let prefix = if let Some(tail) = rest.strip_prefix(':') {
            match tail.split_once(' ') {
                Some((prefix, tail)) => {
                    rest = tail;
                    Some(prefix.to_string())
                }
                None => {
                    // A bare `:prefix` with no command.
                    rest = "";
                    Some(tail.to_string())
                }
            }
        } else {
            None
        };

        let mut params = Vec::new();
        let command = match rest.split_once(' ') {
            Some((command, tail)) => {
                let mut tail = tail;
                loop {
                    if let Some(trailing) = tail.strip_prefix(':') {
                        params.push(trailing.to_string());
                        break;
                    }
                    match tail.split_once(' ') {
                        Some((middle, next)) => {
                            if !middle.is_empty() {
                                params.push(middle.to_string());
                            }
                            tail = next;
                        }
                        None => {
                            if !tail.is_empty() {
                                params.push(tail.to_string());
                            }
                            break;
                        }
                    }
                }
                command
            }
            None => rest,
        };

        IrcMessage {
            prefix,
            command: command.to_string(),
            params,
        }
    }

    /// The trailing parameter (message text), if the line had one.
    pub fn text(&self) -> &str {
        self.params.last().map(String::as_str).unwrap_or("")
    }

    /// The first middle parameter (usually the destination).
    pub fn target(&self) -> &str {
        self.params.first().map(String::as_str).unwrap_or("")
    }

    /// Nickname part of the prefix, i.e. everything before `!`.
    pub fn sender_nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split('!').next().unwrap_or(prefix))
    }

    /// The command as a numeric reply code, if it is one.
    pub fn numeric(&self) -> Option<u16> {
        if self.command.is_empty() || !self.command.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        self.command.parse().ok()
    }
}

/// CTCP marker byte framing PRIVMSG payloads.
const CTCP_DELIM: char = '\x01';

/// Extract a CTCP payload from a PRIVMSG trailing parameter.
///
/// Some bots terminate the payload with a CR before the closing marker, so a
/// trailing `\r` is tolerated.
pub fn ctcp_payload(text: &str) -> Option<&str> {
    let inner = text.strip_prefix(CTCP_DELIM)?;
    let inner = inner.trim_end_matches('\r');
    let inner = inner.strip_suffix(CTCP_DELIM).unwrap_or(inner);
    Some(inner.trim_end_matches('\r'))
}

/// Wrap a CTCP payload for sending inside a PRIVMSG.
pub fn ctcp_wrap(payload: &str) -> String {
    format!("{}{}{}", CTCP_DELIM, payload, CTCP_DELIM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_line() {
        let msg = IrcMessage::parse(":irc.example.org 376 xget :End of /MOTD command.");
        assert_eq!(msg.prefix.as_deref(), Some("irc.example.org"));
        assert_eq!(msg.command, "376");
        assert_eq!(msg.params, vec!["xget", "End of /MOTD command."]);
        assert_eq!(msg.numeric(), Some(376));
        assert_eq!(msg.text(), "End of /MOTD command.");
    }

    #[test]
    fn parses_ping_without_prefix() {
        let msg = IrcMessage::parse("PING :token123");
        assert_eq!(msg.prefix, None);
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.text(), "token123");
    }

    #[test]
    fn parses_privmsg_with_sender() {
        let msg = IrcMessage::parse(":Bot!ident@host PRIVMSG xget :hello there");
        assert_eq!(msg.sender_nick(), Some("Bot"));
        assert_eq!(msg.target(), "xget");
        assert_eq!(msg.text(), "hello there");
    }

    #[test]
    fn parses_multiple_middles() {
        let msg = IrcMessage::parse(":srv 005 xget SAFELIST CHANTYPES=# :are supported");
        assert_eq!(
            msg.params,
            vec!["xget", "SAFELIST", "CHANTYPES=#", "are supported"]
        );
    }

    #[test]
    fn malformed_lines_do_not_fail() {
        let msg = IrcMessage::parse("");
        assert_eq!(msg.command, "");
        assert!(msg.params.is_empty());

        let msg = IrcMessage::parse(":lonely-prefix");
        assert_eq!(msg.prefix.as_deref(), Some("lonely-prefix"));
        assert_eq!(msg.command, "");

        let msg = IrcMessage::parse("   ");
        assert!(msg.numeric().is_none());
    }

    #[test]
    fn strips_line_terminators() {
        let msg = IrcMessage::parse("PING :abc\r\n");
        assert_eq!(msg.text(), "abc");
    }

    #[test]
    fn ctcp_roundtrip() {
        let wrapped = ctcp_wrap("DCC RESUME file.bin 5000 1024");
        assert_eq!(ctcp_payload(&wrapped), Some("DCC RESUME file.bin 5000 1024"));
    }

    #[test]
    fn ctcp_tolerates_trailing_cr() {
        assert_eq!(
            ctcp_payload("\u{1}DCC SEND f 1 2 3\u{1}\r"),
            Some("DCC SEND f 1 2 3")
        );
        assert_eq!(
            ctcp_payload("\u{1}DCC SEND f 1 2 3\r\u{1}"),
            Some("DCC SEND f 1 2 3")
        );
        assert_eq!(ctcp_payload("no marker"), None);
    }
}
