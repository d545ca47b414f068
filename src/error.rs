//! Error taxonomy for a server run.
//!
//! Errors are local to one server's connection loop: a fatal variant aborts
//! the remaining requests for that server but the run continues with other
//! servers. Configuration problems are handled with `anyhow` in `main` before
//! any connection is attempted.

use std::path::PathBuf;

/// Errors produced while talking to one IRC server or its DCC peers.
#[derive(Debug, thiserror::Error)]
pub enum XgetError {
    #[error("failed to connect to {host}: {source}")]
    Connect {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection to {host} timed out")]
    ConnectTimeout { host: String },

    #[error("registration rejected ({code}): {reason}")]
    Registration { code: u16, reason: String },

    #[error("login failed: {0}")]
    Login(String),

    #[error("connection closed by {host}")]
    ConnectionClosed { host: String },

    #[error("transfer of {file} ended early: got {received} of {total} bytes", file = .file.display())]
    TransferIncomplete {
        file: PathBuf,
        received: u64,
        total: u64,
    },

    #[error("transfer of {file} failed: {source}", file = .file.display())]
    TransferIo {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl XgetError {
    /// Whether the partial file on disk is worth keeping for a later resume.
    pub fn keeps_partial(&self) -> bool {
        matches!(self, XgetError::TransferIncomplete { received, .. } if *received > 0)
    }
}
