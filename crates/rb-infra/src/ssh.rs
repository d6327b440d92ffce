//! Password-authenticated SSH backend built on libssh2.
//!
//! libssh2 is blocking, so every operation runs on tokio's blocking pool and
//! owns its own session for the duration of the call.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use async_trait::async_trait;
use ssh2::{ExtendedData, Session};
use tracing::{debug, info, warn};

use crate::installer::InstallPlan;
use crate::specs::{DETECT_SCRIPT, DetectedSpecs};
use crate::types::RemoteTarget;
use crate::{CapabilityDetector, Error, LogSink, RemoteProvisioner, Result};

const DEFAULT_IMAGE_BASE_URL: &str = "https://dl.rdpbot.example/images";

#[derive(Debug, Clone)]
pub struct SshConfig {
    pub connect_timeout: Duration,
    pub image_base_url: String,
}

impl SshConfig {
    /// Create from env vars:
    ///
    /// - `SSH_CONNECT_TIMEOUT_SECS` (default: 30)
    /// - `DEDICATED_IMAGE_BASE_URL` (default: bundled mirror)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let connect_timeout = match std::env::var("SSH_CONNECT_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| Error::MissingEnv(format!("SSH_CONNECT_TIMEOUT_SECS is not a number: {raw}")))?,
            Err(_) => Duration::from_secs(30),
        };

        let image_base_url = std::env::var("DEDICATED_IMAGE_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_IMAGE_BASE_URL.into());

        Ok(Self {
            connect_timeout,
            image_base_url,
        })
    }
}

/// Detector and provisioner over SSH.
#[derive(Debug, Clone)]
pub struct SshBackend {
    config: SshConfig,
}

impl SshBackend {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(SshConfig::from_env()?))
    }
}

#[async_trait]
impl CapabilityDetector for SshBackend {
    async fn detect(&self, target: &RemoteTarget) -> Result<DetectedSpecs> {
        let host = target.host.clone();
        let target = target.clone();
        let timeout = self.config.connect_timeout;

        let output = tokio::task::spawn_blocking(move || {
            let session = connect(&target, timeout)?;
            let (exit, output) = exec_capture(&session, DETECT_SCRIPT)?;
            if exit != 0 {
                return Err(Error::CommandFailed { exit, output });
            }
            Ok(output)
        })
        .await
        .map_err(|e| Error::Task(e.to_string()))??;

        DetectedSpecs::parse(&host, &output)
    }
}

#[async_trait]
impl RemoteProvisioner for SshBackend {
    async fn provision(&self, target: &RemoteTarget, plan: &InstallPlan, log: LogSink) -> Result<()> {
        let target = target.clone();
        let plan = plan.clone();
        let timeout = self.config.connect_timeout;
        let command = plan.command(&self.config.image_base_url);

        info!(host = %target.host, image = plan.image(), "starting remote install");

        tokio::task::spawn_blocking(move || {
            let session = connect(&target, timeout)?;
            upload(&session, plan.remote_path(), plan.script())?;
            // Installs run for many minutes with long silent stretches.
            session.set_timeout(0);

            let exit = exec_streaming(&session, &command, &log)?;
            if exit != 0 {
                return Err(Error::CommandFailed {
                    exit,
                    output: format!("installer for {} failed", plan.image()),
                });
            }
            Ok(())
        })
        .await
        .map_err(|e| Error::Task(e.to_string()))?
    }
}

fn resolve(target: &RemoteTarget) -> Result<SocketAddr> {
    (target.host.as_str(), target.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("no address for {}", target.host),
            ))
        })
}

fn connect(target: &RemoteTarget, timeout: Duration) -> Result<Session> {
    let addr = resolve(target)?;
    let tcp = TcpStream::connect_timeout(&addr, timeout)?;

    let mut session = Session::new()?;
    session.set_tcp_stream(tcp);
    session.set_timeout(timeout.as_millis().try_into().unwrap_or(u32::MAX));
    session.handshake()?;

    if let Err(e) = session.userauth_password(&target.username, target.password.expose()) {
        debug!(host = %target.host, error = %e, "password auth failed");
        return Err(Error::Auth(target.host.clone()));
    }
    if !session.authenticated() {
        return Err(Error::Auth(target.host.clone()));
    }

    Ok(session)
}

fn upload(session: &Session, path: &str, contents: &str) -> Result<()> {
    let sftp = session.sftp()?;
    let mut file = sftp.create(std::path::Path::new(path))?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}

/// Run `command` and collect stdout and stderr together.
fn exec_capture(session: &Session, command: &str) -> Result<(i32, String)> {
    let mut channel = session.channel_session()?;
    channel.handle_extended_data(ExtendedData::Merge)?;
    channel.exec(command)?;

    let mut output = String::new();
    channel.read_to_string(&mut output)?;
    channel.wait_close()?;
    Ok((channel.exit_status()?, output))
}

/// Run `command`, forwarding each output line to `log` as it arrives.
fn exec_streaming(session: &Session, command: &str, log: &LogSink) -> Result<i32> {
    let mut channel = session.channel_session()?;
    channel.handle_extended_data(ExtendedData::Merge)?;
    channel.exec(command)?;

    let mut receiver_gone = false;
    {
        let reader = BufReader::new(&mut channel);
        for line in reader.split(b'\n') {
            let line = String::from_utf8_lossy(&line?).trim_end().to_string();
            if receiver_gone || line.is_empty() {
                continue;
            }
            if log.blocking_send(line).is_err() {
                // Keep draining so the remote side is not blocked on a full window.
                warn!("install log receiver dropped");
                receiver_gone = true;
            }
        }
    }

    channel.wait_close()?;
    Ok(channel.exit_status()?)
}
