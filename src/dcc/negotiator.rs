//! DCC SEND/RESUME/ACCEPT negotiation.
//!
//! One negotiation is in flight per connection at most. The machine is fed
//! typed inputs (an offer, an accept, a bot notice, or a clock tick) and
//! returns the outbound actions for the session driver to perform; it never
//! touches the socket itself. Timeouts are the only cancellation trigger: a
//! request that draws no offer is aborted, and a resume that draws no ACCEPT
//! downgrades to a fresh transfer of the same offer.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::dcc::filename::{safe_path, sanitize_filename};
use crate::dcc::parser::{DccAccept, DccSend};
use crate::dcc::transfer::TransferDescriptor;
use crate::irc::message::ctcp_wrap;

/// Outbound work decided by the negotiator.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    /// Raw IRC line to queue on the control connection.
    Send(String),
    /// Hand the descriptor to the transfer engine.
    StartTransfer(TransferDescriptor),
    /// The current request is over without a transfer.
    Finish(RequestEnd),
}

/// How a request ended when no transfer ran.
#[derive(Debug, PartialEq, Eq)]
pub enum RequestEnd {
    /// Not an error: the file was already complete on disk.
    Skipped(String),
    /// The request failed; move on to the next one.
    Aborted(String),
}

/// Negotiation state. At most one non-idle negotiation exists per connection.
#[derive(Debug)]
pub enum Negotiation {
    Idle,
    /// XDCC SEND sent, waiting for the DCC SEND offer. `queued` is set when
    /// the bot has parked us in its transfer queue, which suspends the
    /// response timeout.
    Requested {
        bot: String,
        pack: u32,
        sent_at: Instant,
        queued: bool,
    },
    /// DCC RESUME sent, waiting for DCC ACCEPT until `deadline`.
    ResumeRequested {
        bot: String,
        desc: TransferDescriptor,
        deadline: Instant,
    },
    /// Descriptor handed off; the transfer task owns it until completion.
    Transferring,
}

pub struct Negotiator {
    state: Negotiation,
    out_dir: PathBuf,
    skip_existing: bool,
    allow_bot_queue: bool,
    send_timeout: Duration,
    resume_timeout: Duration,
}

impl Negotiator {
    pub fn new(
        out_dir: PathBuf,
        skip_existing: bool,
        allow_bot_queue: bool,
        send_timeout: Duration,
        resume_timeout: Duration,
    ) -> Self {
        Self {
            state: Negotiation::Idle,
            out_dir,
            skip_existing,
            allow_bot_queue,
            send_timeout,
            resume_timeout,
        }
    }

    pub fn state(&self) -> &Negotiation {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, Negotiation::Idle)
    }

    /// The bot the in-flight negotiation belongs to, if any.
    pub fn bot(&self) -> Option<&str> {
        match &self.state {
            Negotiation::Requested { bot, .. } | Negotiation::ResumeRequested { bot, .. } => {
                Some(bot)
            }
            _ => None,
        }
    }

    /// Record that `XDCC SEND <pack>` went out to `bot`.
    pub fn request_sent(&mut self, bot: &str, pack: u32, now: Instant) {
        debug_assert!(self.is_idle());
        self.state = Negotiation::Requested {
            bot: bot.to_string(),
            pack,
            sent_at: now,
            queued: false,
        };
    }

    /// A CTCP DCC SEND offer arrived from the expected bot.
    pub fn handle_offer(&mut self, offer: DccSend, now: Instant) -> Vec<Action> {
        let bot = match &self.state {
            Negotiation::Requested { bot, .. } => bot.clone(),
            _ => {
                warn!(filename = %offer.filename, "unsolicited DCC SEND offer ignored");
                return Vec::new();
            }
        };

        let Some(name) = sanitize_filename(&offer.filename) else {
            self.state = Negotiation::Idle;
            return vec![Action::Finish(RequestEnd::Aborted(format!(
                "offer carried an unusable filename: {:?}",
                offer.filename
            )))];
        };
        let dest = self.out_dir.join(name);

        let on_disk = std::fs::metadata(&dest).map(|m| m.len()).ok();
        match on_disk {
            Some(len) if len < offer.size => {
                // Partial file: try to resume where it left off.
                let resume = format!(
                    "PRIVMSG {} :{}",
                    bot,
                    ctcp_wrap(&format!(
                        "DCC RESUME {} {} {}",
                        offer.raw_name, offer.port, len
                    ))
                );
                let desc = TransferDescriptor {
                    filename: dest,
                    total_size: offer.size,
                    ip: offer.ip,
                    port: offer.port,
                    resume_offset: len,
                };
                self.state = Negotiation::ResumeRequested {
                    bot,
                    desc,
                    deadline: now + self.resume_timeout,
                };
                vec![Action::Send(resume)]
            }
            Some(_) if self.skip_existing => {
                self.state = Negotiation::Idle;
                vec![
                    Action::Send(format!("PRIVMSG {} :XDCC CANCEL", bot)),
                    Action::Finish(RequestEnd::Skipped(format!(
                        "{} already exists, skipping",
                        dest.display()
                    ))),
                ]
            }
            Some(_) => {
                // Same-named complete file: pick a non-colliding name and
                // download fresh.
                let renamed = safe_path(&dest);
                debug!(original = %dest.display(), renamed = %renamed.display(),
                    "file exists, using a safe name");
                self.start_fresh(renamed, &offer)
            }
            None => self.start_fresh(dest, &offer),
        }
    }

    fn start_fresh(&mut self, dest: PathBuf, offer: &DccSend) -> Vec<Action> {
        self.state = Negotiation::Transferring;
        vec![Action::StartTransfer(TransferDescriptor {
            filename: dest,
            total_size: offer.size,
            ip: offer.ip,
            port: offer.port,
            resume_offset: 0,
        })]
    }

    /// A CTCP DCC ACCEPT arrived: the bot honors the resume.
    pub fn handle_accept(&mut self, accept: DccAccept) -> Vec<Action> {
        match std::mem::replace(&mut self.state, Negotiation::Transferring) {
            Negotiation::ResumeRequested { mut desc, .. } => {
                desc.resume_offset = accept.offset;
                vec![Action::StartTransfer(desc)]
            }
            other => {
                warn!("DCC ACCEPT without a pending resume, ignored");
                self.state = other;
                Vec::new()
            }
        }
    }

    /// A NOTICE from the expected bot while a negotiation is in flight.
    pub fn handle_bot_notice(&mut self, text: &str) -> Vec<Action> {
        let bot = match self.bot() {
            Some(bot) => bot.to_string(),
            None => return Vec::new(),
        };
        let lower = text.to_lowercase();

        if lower.contains("already requested that pack")
            || lower.contains("closing connection")
            || lower.contains("you have a dcc pending")
        {
            self.state = Negotiation::Idle;
            return vec![
                Action::Send(format!("PRIVMSG {} :XDCC CANCEL", bot)),
                Action::Finish(RequestEnd::Aborted(text.to_string())),
            ];
        }

        if lower.contains("you can only have") && lower.contains("transfer") {
            if self.allow_bot_queue {
                if let Negotiation::Requested { queued, .. } = &mut self.state {
                    if !*queued {
                        debug!("bot transfer slots full, waiting in its queue");
                        *queued = true;
                    }
                }
                return Vec::new();
            }
            self.state = Negotiation::Idle;
            return vec![
                Action::Send(format!("PRIVMSG {} :XDCC CANCEL", bot)),
                Action::Finish(RequestEnd::Aborted(text.to_string())),
            ];
        }

        Vec::new()
    }

    /// Time-based housekeeping: send-response and resume-accept timeouts.
    pub fn tick(&mut self, now: Instant) -> Vec<Action> {
        match &self.state {
            Negotiation::Requested {
                sent_at,
                queued: false,
                ..
            } if now.duration_since(*sent_at) >= self.send_timeout => {
                match std::mem::replace(&mut self.state, Negotiation::Idle) {
                    Negotiation::Requested { bot, .. } => {
                        vec![Action::Finish(RequestEnd::Aborted(format!(
                            "{} took too long to respond, are you sure it's a bot?",
                            bot
                        )))]
                    }
                    _ => unreachable!(),
                }
            }
            Negotiation::ResumeRequested { deadline, .. } if now >= *deadline => {
                // Peer does not support resume: same offer, fresh pull.
                warn!("no DCC ACCEPT in time, bot does not support resume; restarting from 0");
                match std::mem::replace(&mut self.state, Negotiation::Transferring) {
                    Negotiation::ResumeRequested { mut desc, .. } => {
                        desc.resume_offset = 0;
                        vec![Action::StartTransfer(desc)]
                    }
                    _ => unreachable!(),
                }
            }
            _ => Vec::new(),
        }
    }

    /// The transfer task reported completion; negotiation returns to idle.
    pub fn transfer_finished(&mut self) {
        self.state = Negotiation::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn offer(name: &str, size: u64) -> DccSend {
        DccSend {
            filename: name.to_string(),
            raw_name: name.to_string(),
            ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            port: 5000,
            size,
        }
    }

    fn negotiator(dir: &std::path::Path, skip_existing: bool, allow_queue: bool) -> Negotiator {
        Negotiator::new(
            dir.to_path_buf(),
            skip_existing,
            allow_queue,
            Duration::from_secs(10),
            Duration::from_secs(10),
        )
    }

    #[test]
    fn fresh_file_starts_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut neg = negotiator(dir.path(), false, true);
        neg.request_sent("Bot", 1, Instant::now());

        let actions = neg.handle_offer(offer("file.bin", 100), Instant::now());
        match &actions[..] {
            [Action::StartTransfer(desc)] => {
                assert_eq!(desc.resume_offset, 0);
                assert_eq!(desc.total_size, 100);
                assert_eq!(desc.filename, dir.path().join("file.bin"));
            }
            other => panic!("unexpected actions: {:?}", other),
        }
        assert!(matches!(neg.state(), Negotiation::Transferring));
    }

    #[test]
    fn smaller_partial_file_requests_resume_at_its_size() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.bin"), vec![0u8; 40]).unwrap();
        let mut neg = negotiator(dir.path(), false, true);
        neg.request_sent("Bot", 1, Instant::now());

        let actions = neg.handle_offer(offer("file.bin", 100), Instant::now());
        match &actions[..] {
            [Action::Send(line)] => {
                assert_eq!(line, "PRIVMSG Bot :\u{1}DCC RESUME file.bin 5000 40\u{1}");
            }
            other => panic!("unexpected actions: {:?}", other),
        }
        assert!(matches!(neg.state(), Negotiation::ResumeRequested { .. }));
    }

    #[test]
    fn accept_starts_transfer_at_negotiated_offset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.bin"), vec![0u8; 40]).unwrap();
        let mut neg = negotiator(dir.path(), false, true);
        neg.request_sent("Bot", 1, Instant::now());
        neg.handle_offer(offer("file.bin", 100), Instant::now());

        let actions = neg.handle_accept(DccAccept {
            filename: "file.bin".into(),
            port: 5000,
            offset: 40,
        });
        match &actions[..] {
            [Action::StartTransfer(desc)] => assert_eq!(desc.resume_offset, 40),
            other => panic!("unexpected actions: {:?}", other),
        }
    }

    #[test]
    fn resume_timeout_falls_back_to_offset_zero() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.bin"), vec![0u8; 40]).unwrap();
        let mut neg = negotiator(dir.path(), false, true);
        let start = Instant::now();
        neg.request_sent("Bot", 1, start);
        neg.handle_offer(offer("file.bin", 100), start);

        assert!(neg.tick(start + Duration::from_secs(5)).is_empty());
        let actions = neg.tick(start + Duration::from_secs(11));
        match &actions[..] {
            [Action::StartTransfer(desc)] => assert_eq!(desc.resume_offset, 0),
            other => panic!("unexpected actions: {:?}", other),
        }
    }

    #[test]
    fn complete_file_is_skipped_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.bin"), vec![0u8; 100]).unwrap();
        let mut neg = negotiator(dir.path(), true, true);
        neg.request_sent("Bot", 1, Instant::now());

        let actions = neg.handle_offer(offer("file.bin", 100), Instant::now());
        assert_eq!(actions[0], Action::Send("PRIVMSG Bot :XDCC CANCEL".into()));
        assert!(matches!(
            actions[1],
            Action::Finish(RequestEnd::Skipped(_))
        ));
        assert!(neg.is_idle());
    }

    #[test]
    fn complete_file_is_renamed_when_not_skipping() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.bin"), vec![0u8; 100]).unwrap();
        let mut neg = negotiator(dir.path(), false, true);
        neg.request_sent("Bot", 1, Instant::now());

        let actions = neg.handle_offer(offer("file.bin", 100), Instant::now());
        match &actions[..] {
            [Action::StartTransfer(desc)] => {
                assert_eq!(desc.filename, dir.path().join("file (2).bin"));
                assert_eq!(desc.resume_offset, 0);
            }
            other => panic!("unexpected actions: {:?}", other),
        }
    }

    #[test]
    fn send_timeout_aborts_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut neg = negotiator(dir.path(), false, true);
        let start = Instant::now();
        neg.request_sent("Bot", 1, start);

        assert!(neg.tick(start + Duration::from_secs(9)).is_empty());
        let actions = neg.tick(start + Duration::from_secs(10));
        assert!(matches!(
            actions[..],
            [Action::Finish(RequestEnd::Aborted(_))]
        ));
        assert!(neg.is_idle());
    }

    #[test]
    fn slot_full_notice_parks_request_and_suspends_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut neg = negotiator(dir.path(), false, true);
        let start = Instant::now();
        neg.request_sent("Bot", 1, start);

        let actions = neg.handle_bot_notice("You can only have 1 transfer at a time");
        assert!(actions.is_empty());
        assert!(neg.tick(start + Duration::from_secs(3600)).is_empty());

        // The offer still goes through once a slot frees up.
        let actions = neg.handle_offer(offer("file.bin", 10), start);
        assert!(matches!(actions[..], [Action::StartTransfer(_)]));
    }

    #[test]
    fn slot_full_notice_cancels_when_queueing_disallowed() {
        let dir = tempfile::tempdir().unwrap();
        let mut neg = negotiator(dir.path(), false, false);
        neg.request_sent("Bot", 1, Instant::now());

        let actions = neg.handle_bot_notice("You can only have 2 transfers at a time");
        assert_eq!(actions[0], Action::Send("PRIVMSG Bot :XDCC CANCEL".into()));
        assert!(matches!(
            actions[1],
            Action::Finish(RequestEnd::Aborted(_))
        ));
        assert!(neg.is_idle());
    }

    #[test]
    fn pending_dcc_notice_cancels_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut neg = negotiator(dir.path(), false, true);
        neg.request_sent("Bot", 1, Instant::now());

        let actions = neg.handle_bot_notice("You already requested that pack");
        assert_eq!(actions[0], Action::Send("PRIVMSG Bot :XDCC CANCEL".into()));
        assert!(neg.is_idle());
    }

    #[test]
    fn unsolicited_offer_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut neg = negotiator(dir.path(), false, true);
        assert!(neg
            .handle_offer(offer("file.bin", 10), Instant::now())
            .is_empty());
        assert!(neg.is_idle());
    }
}
