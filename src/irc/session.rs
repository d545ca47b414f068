//! Per-server session driver.
//!
//! Owns every piece of per-connection state: registration progress, the
//! request queue cursor, channel bookkeeping, the DCC negotiator, and the
//! handle of the running transfer task. Inbound messages and clock ticks go
//! through pure-ish handlers that return outbound actions; only [`run`]
//! touches the socket, so the whole state machine is testable without a
//! server.
//!
//! Registration policy: NICK/USER (and PASS when configured) are sent
//! immediately on connect, before any server traffic is read. Numerics
//! 400-533 are fatal except 439, 462 and 477.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ServerProfile, TimeoutConfig};
use crate::dcc::negotiator::{self, Negotiator, RequestEnd};
use crate::dcc::parser::{parse_dcc_accept, parse_dcc_send};
use crate::dcc::transfer::{self, TransferDescriptor, TransferOutcome};
use crate::error::XgetError;
use crate::irc::connection::Connection;
use crate::irc::message::{ctcp_payload, IrcMessage};
use crate::progress::elapsed_words;
use crate::request::{PackRequest, RequestQueue};

/// Registration numerics that are not treated as fatal.
const BENIGN_NUMERICS: [u16; 3] = [439, 462, 477];

/// How often time-based housekeeping runs.
const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Outbound work decided by the session state machine.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionAction {
    /// Write a raw line on the control connection.
    Send(String),
    /// Spawn the transfer engine for this descriptor.
    StartTransfer(TransferDescriptor),
    /// All requests are done: send QUIT and end the session.
    Quit,
}

/// Tally for one server run.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionReport {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// All mutable per-connection state. See the module docs for the split
/// between this and [`run`].
pub struct SessionState {
    server: String,
    profile: ServerProfile,
    timeouts: TimeoutConfig,
    queue: RequestQueue,
    negotiator: Negotiator,

    motd_done: bool,
    nickserv_sent: bool,
    nickserv_checked: bool,
    nickserv_valid: bool,

    last_channel: Option<String>,
    /// Request picked from the queue, waiting out the cooldown.
    pending: Option<(PackRequest, Instant)>,
    /// Request whose XDCC SEND is outstanding (negotiating or transferring).
    current: Option<PackRequest>,
    any_request_sent: bool,
    quit_sent: bool,

    report: SessionReport,
}

impl SessionState {
    pub fn new(
        server: String,
        profile: ServerProfile,
        queue: RequestQueue,
        config: &Config,
    ) -> Self {
        let negotiator = Negotiator::new(
            config.out_dir.clone(),
            config.skip_existing,
            config.allow_bot_queue,
            config.timeouts.send_response(),
            config.timeouts.resume_accept(),
        );
        Self {
            server,
            profile,
            timeouts: config.timeouts.clone(),
            queue,
            negotiator,
            motd_done: false,
            nickserv_sent: false,
            nickserv_checked: false,
            nickserv_valid: false,
            last_channel: None,
            pending: None,
            current: None,
            any_request_sent: false,
            quit_sent: false,
            report: SessionReport::default(),
        }
    }

    pub fn report(&self) -> SessionReport {
        self.report
    }

    /// Lines sent immediately on connect.
    pub fn register_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(pass) = &self.profile.pass {
            lines.push(format!("PASS {}", pass));
        }
        lines.push(format!("NICK {}", self.profile.nick()));
        lines.push(format!(
            "USER {} 0 * :{}",
            self.profile.user(),
            self.profile.realname()
        ));
        lines
    }

    /// Whether `nick` is the bot of the outstanding request.
    fn is_expected_bot(&self, nick: &str) -> bool {
        self.current
            .as_ref()
            .map(|r| r.bot.eq_ignore_ascii_case(nick))
            .unwrap_or(false)
    }

    /// Dispatch one inbound message. `Err` means the server run is over.
    pub fn handle_message(
        &mut self,
        msg: &IrcMessage,
        now: Instant,
    ) -> Result<Vec<SessionAction>, XgetError> {
        if let Some(code) = msg.numeric() {
            return self.handle_numeric(code, msg);
        }

        match msg.command.as_str() {
            "PING" => Ok(vec![SessionAction::Send(format!("PONG :{}", msg.text()))]),
            "NOTICE" => self.handle_notice(msg),
            "PRIVMSG" => Ok(self.handle_privmsg(msg, now)),
            "ERROR" => {
                let text = msg.text();
                if text.to_lowercase().contains("closing link") {
                    info!("{}", text);
                } else {
                    warn!(server = %self.server, "server error: {}", text);
                }
                Ok(Vec::new())
            }
            "" => Ok(Vec::new()),
            other => {
                debug!(command = other, "ignoring message");
                Ok(Vec::new())
            }
        }
    }

    fn handle_numeric(
        &mut self,
        code: u16,
        msg: &IrcMessage,
    ) -> Result<Vec<SessionAction>, XgetError> {
        match code {
            1 => info!("{}", msg.text()),
            376 => {
                debug!(server = %self.server, "end of MOTD, queue may start");
                self.motd_done = true;
            }
            400..=533 if !BENIGN_NUMERICS.contains(&code) => {
                return Err(XgetError::Registration {
                    code,
                    reason: msg.text().to_string(),
                });
            }
            _ => {}
        }
        Ok(Vec::new())
    }

    fn handle_notice(&mut self, msg: &IrcMessage) -> Result<Vec<SessionAction>, XgetError> {
        let text = msg.text().to_string();

        if msg.target() == "AUTH" {
            if text.to_lowercase().contains("erroneous nickname") {
                return Err(XgetError::Login(text));
            }
            info!("{}", text);
            return Ok(Vec::new());
        }

        match msg.sender_nick() {
            Some(nick) if nick.eq_ignore_ascii_case("NickServ") => {
                Ok(self.handle_nickserv_notice(&text))
            }
            Some(nick) if self.is_expected_bot(nick) => {
                info!("{}: {}", nick, text);
                let actions = self.negotiator.handle_bot_notice(&text);
                Ok(self.apply(actions))
            }
            _ => {
                debug!("{}", text);
                Ok(Vec::new())
            }
        }
    }

    fn handle_nickserv_notice(&mut self, text: &str) -> Vec<SessionAction> {
        info!("NickServ: {}", text);

        if !self.nickserv_sent {
            if let Some(pass) = &self.profile.nickserv {
                self.nickserv_sent = true;
                return vec![SessionAction::Send(format!(
                    "PRIVMSG NickServ :IDENTIFY {}",
                    pass
                ))];
            }
            return Vec::new();
        }

        if !self.nickserv_checked {
            let lower = text.to_lowercase();
            if lower.contains("password incorrect") {
                self.nickserv_checked = true;
                self.nickserv_valid = false;
                warn!(server = %self.server, "NickServ rejected the configured password");
            } else if lower.contains("password accepted") {
                self.nickserv_checked = true;
                self.nickserv_valid = true;
            }
        }
        Vec::new()
    }

    fn handle_privmsg(&mut self, msg: &IrcMessage, now: Instant) -> Vec<SessionAction> {
        let Some(nick) = msg.sender_nick() else {
            return Vec::new();
        };
        if !self.is_expected_bot(nick) {
            return Vec::new();
        }
        let Some(payload) = ctcp_payload(msg.text()) else {
            return Vec::new();
        };

        if let Some(offer) = parse_dcc_send(payload) {
            info!("Preparing to download: {}", offer.filename);
            let actions = self.negotiator.handle_offer(offer, now);
            self.apply(actions)
        } else if let Some(accept) = parse_dcc_accept(payload) {
            info!("resume accepted at offset {}", accept.offset);
            let actions = self.negotiator.handle_accept(accept);
            self.apply(actions)
        } else {
            debug!(payload, "unhandled CTCP payload");
            Vec::new()
        }
    }

    /// Time-based housekeeping: negotiation timeouts, then queue advancement
    /// gated on MOTD end and an idle negotiation.
    pub fn housekeeping(&mut self, now: Instant) -> Vec<SessionAction> {
        let mut out = {
            let actions = self.negotiator.tick(now);
            self.apply(actions)
        };

        if !self.motd_done || !self.negotiator.is_idle() || self.current.is_some() {
            return out;
        }

        if self.pending.is_none() {
            match self.queue.next() {
                Some(request) => {
                    if self.last_channel.as_deref() != Some(request.channel.as_str()) {
                        if let Some(old) = self.last_channel.take() {
                            out.push(SessionAction::Send(format!("PART {}", old)));
                        }
                        out.push(SessionAction::Send(format!("JOIN {}", request.channel)));
                        self.last_channel = Some(request.channel.clone());
                    }
                    let send_at = if self.any_request_sent {
                        now + self.timeouts.request_cooldown()
                    } else {
                        now
                    };
                    self.pending = Some((request, send_at));
                }
                None if !self.quit_sent => {
                    self.quit_sent = true;
                    out.push(SessionAction::Quit);
                    return out;
                }
                None => return out,
            }
        }

        if let Some((_, send_at)) = &self.pending {
            if now >= *send_at {
                let (request, _) = self.pending.take().expect("pending request");
                out.push(SessionAction::Send(format!(
                    "PRIVMSG {} :XDCC SEND {}",
                    request.bot, request.pack
                )));
                self.negotiator.request_sent(&request.bot, request.pack, now);
                self.any_request_sent = true;
                self.current = Some(request);
            }
        }

        out
    }

    /// The transfer task delivered its terminal result.
    pub fn transfer_finished(&mut self, file: &PathBuf, outcome: &TransferOutcome) {
        match outcome {
            TransferOutcome::Complete { bytes, elapsed } => {
                info!(
                    "SUCCESS: downloaded {} ({} bytes) {}",
                    file.display(),
                    bytes,
                    elapsed_words(*elapsed)
                );
                self.report.completed += 1;
            }
            TransferOutcome::Failed { bytes, error } => {
                error!("{} failed to download: {}", file.display(), error);
                if error.keeps_partial() {
                    info!("{} bytes kept on disk for a future resume", bytes);
                }
                self.report.failed += 1;
            }
        }
        self.negotiator.transfer_finished();
        self.current = None;
    }

    fn finish_request(&mut self, end: RequestEnd) {
        match end {
            RequestEnd::Skipped(reason) => {
                warn!("{}", reason);
                self.report.skipped += 1;
            }
            RequestEnd::Aborted(reason) => {
                error!("{}", reason);
                self.report.failed += 1;
            }
        }
        self.current = None;
    }

    fn apply(&mut self, actions: Vec<negotiator::Action>) -> Vec<SessionAction> {
        let mut out = Vec::new();
        for action in actions {
            match action {
                negotiator::Action::Send(line) => out.push(SessionAction::Send(line)),
                negotiator::Action::StartTransfer(desc) => {
                    out.push(SessionAction::StartTransfer(desc))
                }
                negotiator::Action::Finish(end) => self.finish_request(end),
            }
        }
        out
    }
}

enum Step {
    Line(Option<String>),
    Transfer(Result<TransferOutcome, oneshot::error::RecvError>),
    Tick,
}

/// Run one server's session to completion.
///
/// Connects, registers, then drives the select loop over inbound lines, the
/// housekeeping tick, and the completion channel of the running transfer (at
/// most one at a time). All errors returned here are fatal for this server
/// only.
pub async fn run(
    server: String,
    profile: ServerProfile,
    queue: RequestQueue,
    config: &Config,
) -> Result<SessionReport, XgetError> {
    info!(server = %server, requests = queue.len(), "connecting");
    let mut conn = Connection::connect(&server, config.timeouts.connect()).await?;

    let mut session = SessionState::new(server.clone(), profile, queue, config);
    for line in session.register_lines() {
        conn.send_line(&line).await?;
    }

    let mut tick = tokio::time::interval(TICK_INTERVAL);
    let mut transfer: Option<(PathBuf, oneshot::Receiver<TransferOutcome>)> = None;
    let connect_timeout = config.timeouts.connect();

    loop {
        let step = tokio::select! {
            line = conn.next_line() => Step::Line(line?),
            outcome = async {
                match transfer.as_mut() {
                    Some((_, rx)) => rx.await,
                    None => std::future::pending().await,
                }
            } => Step::Transfer(outcome),
            _ = tick.tick() => Step::Tick,
        };

        let actions = match step {
            Step::Line(Some(line)) => {
                let msg = IrcMessage::parse(&line);
                match session.handle_message(&msg, Instant::now()) {
                    Ok(actions) => actions,
                    Err(err) => {
                        // Best-effort goodbye before surfacing the error.
                        let _ = conn.send_line("QUIT").await;
                        return Err(err);
                    }
                }
            }
            Step::Line(None) => {
                if session.quit_sent {
                    return Ok(session.report());
                }
                return Err(XgetError::ConnectionClosed {
                    host: server.clone(),
                });
            }
            Step::Transfer(outcome) => {
                let (file, _) = transfer.take().expect("transfer handle");
                let outcome = outcome.unwrap_or_else(|_| TransferOutcome::Failed {
                    bytes: 0,
                    error: XgetError::TransferIo {
                        file: file.clone(),
                        source: std::io::Error::other("transfer task dropped"),
                    },
                });
                session.transfer_finished(&file, &outcome);
                Vec::new()
            }
            Step::Tick => session.housekeeping(Instant::now()),
        };

        for action in actions {
            match action {
                SessionAction::Send(line) => conn.send_line(&line).await?,
                SessionAction::StartTransfer(desc) => {
                    info!("Connecting to {}:{}", desc.ip, desc.port);
                    let file = desc.filename.clone();
                    let rx = transfer::spawn(desc, connect_timeout);
                    transfer = Some((file, rx));
                }
                SessionAction::Quit => {
                    conn.send_line("QUIT").await?;
                    return Ok(session.report());
                }
            }
        }
    }
}
