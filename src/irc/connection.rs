//! Line transport for the IRC control connection.
//!
//! Turns the raw TCP stream into discrete inbound lines and CRLF-terminated
//! outbound lines. Closure shows up as `Ok(None)` from [`Connection::next_line`].

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::trace;

use crate::error::XgetError;

/// Default IRC port; xget speaks plain text.
pub const IRC_PORT: u16 = 6667;

pub struct Connection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Connection {
    /// Connect to `host` with a connect timeout.
    pub async fn connect(host: &str, timeout: Duration) -> Result<Connection, XgetError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, IRC_PORT)))
            .await
            .map_err(|_| XgetError::ConnectTimeout {
                host: host.to_string(),
            })?
            .map_err(|source| XgetError::Connect {
                host: host.to_string(),
                source,
            })?;

        let (read, writer) = stream.into_split();
        Ok(Connection {
            lines: BufReader::new(read).lines(),
            writer,
        })
    }

    /// Next inbound line, terminator stripped. `None` means the transport
    /// closed.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let line = self.lines.next_line().await?;
        if let Some(line) = &line {
            trace!(target: "xget::wire", ">> {}", line);
        }
        Ok(line)
    }

    /// Write one line, CRLF appended.
    pub async fn send_line(&mut self, line: &str) -> std::io::Result<()> {
        trace!(target: "xget::wire", "<< {}", line);
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await
    }
}
