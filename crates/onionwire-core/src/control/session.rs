//! A single short-lived control-port connection.

use super::reply::{Reply, ReplyBuilder};
use crate::error::{Error, Result};
use crate::logging::sanitize_command;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

/// Where an authenticated session is. Only ever advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Waiting for the PROTOCOLINFO reply.
    Greeting,
    /// Waiting for the AUTHENTICATE reply.
    Authenticating,
    /// Waiting for the reply to the command at this index.
    Commands(usize),
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Greeting => write!(f, "PROTOCOLINFO"),
            Stage::Authenticating => write!(f, "AUTHENTICATE"),
            Stage::Commands(i) => write!(f, "command #{}", i + 1),
        }
    }
}

/// Line-oriented connection to Tor's control port.
pub struct ControlSession {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl ControlSession {
    /// Connect to the control port.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| Error::Control(format!("failed to connect to control port {}:{}: {}", host, port, e)))?;

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    /// Send a command and read its complete reply.
    pub async fn request(&mut self, command: &str) -> Result<Reply> {
        debug!(command = %sanitize_command(command), "Control port request");

        self.writer
            .write_all(format!("{}\r\n", command).as_bytes())
            .await
            .map_err(|e| Error::Control(format!("failed to send command: {}", e)))?;
        self.writer
            .flush()
            .await
            .map_err(|e| Error::Control(format!("failed to flush: {}", e)))?;

        self.read_reply().await
    }

    /// Read lines until a reply is complete.
    pub async fn read_reply(&mut self) -> Result<Reply> {
        let mut builder = ReplyBuilder::new();
        loop {
            let mut line = String::new();
            let n = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| Error::Control(format!("failed to read response: {}", e)))?;

            if n == 0 {
                return Err(Error::Control("control port closed the connection".into()));
            }

            let line = line.trim_end_matches(['\r', '\n']);
            if let Some(reply) = builder.push_line(line)? {
                return Ok(reply);
            }
        }
    }
}
