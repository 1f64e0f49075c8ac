//! Inbound connections.
//!
//! Accepted streams get the same framing, heartbeat and idle handling as
//! dialed ones. No SOCKS5: inbound traffic already arrives from Tor's side.

use super::connection::{Connection, ConnectionEvents};
use super::TransportConfig;
use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// A bound listener that wraps each accepted stream in a [`Connection`].
#[derive(Debug)]
pub struct Listener {
    listener: TcpListener,
    config: TransportConfig,
}

impl Listener {
    /// Bind to `host:port`. Port 0 picks a free port.
    pub async fn bind(host: &str, port: u16, config: TransportConfig) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind((host, port)).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to bind listener on {}:{}: {}", host, port, e),
            ))
        })?;

        info!(local_addr = ?listener.local_addr().ok(), "Listening for connections");
        Ok(Self { listener, config })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept one connection.
    pub async fn accept(&self) -> Result<(Connection, ConnectionEvents)> {
        let (stream, addr) = self.listener.accept().await?;
        debug!(%addr, "Accepted incoming connection");
        Ok(Connection::open(stream, addr.to_string(), &self.config))
    }

    /// Accept forever, handing every connection to `on_accept`.
    ///
    /// Accept errors are logged and retried after a short pause.
    pub fn serve<F>(self, mut on_accept: F) -> ListenerHandle
    where
        F: FnMut(Connection, ConnectionEvents) + Send + 'static,
    {
        let local_addr = self.listener.local_addr().ok();
        let task = tokio::spawn(async move {
            loop {
                match self.accept().await {
                    Ok((connection, events)) => on_accept(connection, events),
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });
        ListenerHandle { local_addr, task }
    }
}

/// A listener running in the background.
#[derive(Debug)]
pub struct ListenerHandle {
    local_addr: Option<SocketAddr>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stop accepting. Connections already handed out stay open.
    pub fn shutdown(&self) {
        self.task.abort();
        info!(local_addr = ?self.local_addr, "Listener stopped");
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
