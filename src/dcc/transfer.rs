//! DCC byte-stream transfer engine.
//!
//! Pulls one file over its own TCP connection, separate from the IRC control
//! connection. Runs as a spawned task that owns the descriptor, the file
//! handle and the data socket; the session driver only ever sees the
//! [`TransferOutcome`] delivered on a oneshot channel. After each chunk is
//! appended to disk the cumulative byte count is acknowledged on the data
//! socket as a big-endian u32, best effort: the counter is cumulative, so a
//! missed ack is harmless.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::XgetError;
use crate::progress::{eta_words, human_bytes, RateEstimator};

/// Read size per loop iteration.
const CHUNK_SIZE: usize = 8192;

/// Everything the engine needs to pull one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDescriptor {
    /// Destination path, output directory already applied.
    pub filename: PathBuf,
    /// Declared size of the complete file.
    pub total_size: u64,
    pub ip: IpAddr,
    pub port: u16,
    /// Bytes already on disk; 0 means a fresh (truncating) download.
    pub resume_offset: u64,
}

/// Terminal result of one transfer.
#[derive(Debug)]
pub enum TransferOutcome {
    Complete {
        /// Final byte count on disk (equals the declared size).
        bytes: u64,
        elapsed: Duration,
    },
    Failed {
        /// Bytes on disk at failure time, kept for a later resume.
        bytes: u64,
        error: XgetError,
    },
}

/// Spawn the transfer task. The returned receiver yields exactly one outcome;
/// the task closes its file and socket before it resolves.
pub fn spawn(
    desc: TransferDescriptor,
    connect_timeout: Duration,
) -> oneshot::Receiver<TransferOutcome> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let outcome = receive_file(desc, connect_timeout).await;
        let _ = tx.send(outcome);
    });
    rx
}

async fn receive_file(desc: TransferDescriptor, connect_timeout: Duration) -> TransferOutcome {
    let started = Instant::now();
    let mut position = desc.resume_offset;

    let bar = ProgressBar::new(desc.total_size);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("> [{bar:10}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_position(position);

    let result = pull(&desc, connect_timeout, &mut position, &bar).await;
    bar.finish_and_clear();

    match result {
        Ok(()) => TransferOutcome::Complete {
            bytes: position,
            elapsed: started.elapsed(),
        },
        Err(error) => TransferOutcome::Failed {
            bytes: position,
            error,
        },
    }
}

async fn pull(
    desc: &TransferDescriptor,
    connect_timeout: Duration,
    position: &mut u64,
    bar: &ProgressBar,
) -> Result<(), XgetError> {
    let io_err = |source| XgetError::TransferIo {
        file: desc.filename.clone(),
        source,
    };

    // Truncate for a fresh download, append when resuming.
    let mut file = if desc.resume_offset == 0 {
        tokio::fs::File::create(&desc.filename).await
    } else {
        tokio::fs::OpenOptions::new()
            .append(true)
            .open(&desc.filename)
            .await
    }
    .map_err(io_err)?;

    let peer = format!("{}:{}", desc.ip, desc.port);
    let mut stream = tokio::time::timeout(connect_timeout, TcpStream::connect((desc.ip, desc.port)))
        .await
        .map_err(|_| XgetError::ConnectTimeout { host: peer.clone() })?
        .map_err(|source| XgetError::Connect { host: peer, source })?;
    debug!(file = %desc.filename.display(), offset = desc.resume_offset, "data connection open");

    let mut rate = RateEstimator::new(Instant::now());
    let mut last_drawn = Instant::now();
    let mut buf = [0u8; CHUNK_SIZE];

    loop {
        let n = stream.read(&mut buf).await.map_err(io_err)?;
        if n == 0 {
            // Keep what made it to disk for a later resume attempt.
            file.flush().await.map_err(io_err)?;
            return Err(XgetError::TransferIncomplete {
                file: desc.filename.clone(),
                received: *position,
                total: desc.total_size,
            });
        }

        file.write_all(&buf[..n]).await.map_err(io_err)?;
        *position += n as u64;

        // Acknowledge the cumulative count after the bytes hit the file.
        // A send that would block is simply skipped.
        let ack = (*position as u32).to_be_bytes();
        let _ = stream.try_write(&ack);

        let now = Instant::now();
        rate.record(n as u64, now);
        if now.duration_since(last_drawn) >= Duration::from_secs(1) {
            draw_status(bar, *position, desc.total_size, &rate);
            last_drawn = now;
        }

        if *position >= desc.total_size {
            break;
        }
    }

    file.flush().await.map_err(io_err)?;
    Ok(())
}

fn draw_status(bar: &ProgressBar, position: u64, total: u64, rate: &RateEstimator) {
    bar.set_position(position);
    let pct = position as f64 / total as f64 * 100.0;
    let mut msg = format!("{:.2}% {}/{}", pct, human_bytes(position), human_bytes(total));
    if let Some(per_sec) = rate.rate() {
        msg.push_str(&format!(" @ {}/s", human_bytes(per_sec as u64)));
        if let Some(eta) = rate.eta_secs(total.saturating_sub(position)) {
            msg.push_str(&format!(" in {}", eta_words(eta)));
        }
    }
    bar.set_message(msg);
}
