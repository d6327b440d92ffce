use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeErrorKind {
    Refused,
    Timeout,
    Unreachable,
    Other,
}

impl fmt::Display for ProbeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Refused => "connection refused",
            Self::Timeout => "timed out",
            Self::Unreachable => "host unreachable",
            Self::Other => "connection failed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub reachable: bool,
    pub latency: Option<Duration>,
    pub error: Option<ProbeErrorKind>,
}

impl ProbeResult {
    pub fn reachable(latency: Duration) -> Self {
        Self {
            reachable: true,
            latency: Some(latency),
            error: None,
        }
    }

    pub fn failed(kind: ProbeErrorKind) -> Self {
        Self {
            reachable: false,
            latency: None,
            error: Some(kind),
        }
    }
}

/// Single reachability check. Failures are reported in the result, never
/// as an error.
#[async_trait]
pub trait PortProbe: Send + Sync + 'static {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> ProbeResult;
}

/// Probe that completes a TCP handshake and closes the connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

#[async_trait]
impl PortProbe for TcpProbe {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> ProbeResult {
        let started = Instant::now();
        match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => {
                let latency = started.elapsed();
                drop(stream);
                ProbeResult::reachable(latency)
            }
            Ok(Err(e)) => ProbeResult::failed(classify(&e)),
            Err(_) => ProbeResult::failed(ProbeErrorKind::Timeout),
        }
    }
}

fn classify(err: &io::Error) -> ProbeErrorKind {
    match err.kind() {
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => ProbeErrorKind::Refused,
        io::ErrorKind::TimedOut => ProbeErrorKind::Timeout,
        io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
            ProbeErrorKind::Unreachable
        }
        _ => ProbeErrorKind::Other,
    }
}
