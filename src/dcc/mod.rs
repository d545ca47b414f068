//! DCC (Direct Client-to-Client) subsystem: CTCP offer parsing, the
//! SEND/RESUME/ACCEPT negotiation state machine, filename rules, and the
//! byte-stream transfer engine.

pub mod filename;
pub mod negotiator;
pub mod parser;
pub mod transfer;
