//! IRC control-connection plumbing: line parsing, the line transport, and the
//! per-server session driver.

pub mod connection;
pub mod message;
pub mod session;
