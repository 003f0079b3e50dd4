use crate::domain::mapper::CommandTransport;
use crate::domain::models::ConnectionStatus;
use anyhow::Result;
use std::io::Write;
use std::net::TcpStream;
use std::time::Duration;
use tracing::{info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Command stream over TCP. Stands in for the serial byte stream of the
/// robot's session layer: fixed 3-byte frames, no framing, no acks.
pub struct TcpCommandTransport {
    addr: String,
    stream: Option<TcpStream>,
    status: ConnectionStatus,
}

impl TcpCommandTransport {
    /// Attempt to connect to the peer. Connection failure degrades to a
    /// disconnected transport rather than an error; command writes stay
    /// suppressed until `reconnect` succeeds.
    pub fn connect(addr: &str) -> Self {
        let mut transport = Self {
            addr: addr.to_string(),
            stream: None,
            status: ConnectionStatus::Disconnected,
        };
        transport.reconnect();
        transport
    }

    pub fn reconnect(&mut self) {
        self.status = ConnectionStatus::Connecting;
        info!("connecting to command peer at {}", self.addr);

        let resolved = match std::net::ToSocketAddrs::to_socket_addrs(&self.addr) {
            Ok(mut addrs) => addrs.next(),
            Err(e) => {
                warn!("cannot resolve {}: {}", self.addr, e);
                None
            }
        };

        match resolved.map(|a| TcpStream::connect_timeout(&a, CONNECT_TIMEOUT)) {
            Some(Ok(stream)) => {
                let _ = stream.set_nodelay(true);
                info!("connected to command peer");
                self.stream = Some(stream);
                self.status = ConnectionStatus::Connected;
            }
            Some(Err(e)) => {
                warn!("connection to {} failed: {}", self.addr, e);
                self.stream = None;
                self.status = ConnectionStatus::Disconnected;
            }
            None => {
                self.stream = None;
                self.status = ConnectionStatus::Disconnected;
            }
        }
    }

    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            info!("disconnected from command peer");
        }
        self.status = ConnectionStatus::Disconnected;
    }
}

impl CommandTransport for TcpCommandTransport {
    fn status(&self) -> ConnectionStatus {
        self.status
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            anyhow::bail!("not connected");
        };
        if let Err(e) = stream.write_all(frame) {
            // A broken pipe drops the session; the caller sees the status
            // change and suppresses further writes.
            self.disconnect();
            return Err(e.into());
        }
        Ok(())
    }
}

/// Transport used when no peer address is configured: always "connected",
/// frames go to the log instead of a socket.
#[derive(Debug, Default)]
pub struct ConsoleTransport;

impl CommandTransport for ConsoleTransport {
    fn status(&self) -> ConnectionStatus {
        ConnectionStatus::Connected
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        info!("command frame: {}", String::from_utf8_lossy(frame));
        Ok(())
    }
}
