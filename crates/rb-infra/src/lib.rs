pub mod installer;
pub mod specs;
#[cfg(feature = "ssh")]
pub mod ssh;
pub mod types;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use installer::InstallPlan;
pub use specs::DetectedSpecs;
pub use types::{Capacity, RemoteTarget, Secret};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[cfg(feature = "ssh")]
    #[error("ssh error: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("authentication rejected for {0}")]
    Auth(String),

    #[error("remote command exited with {exit}: {output}")]
    CommandFailed { exit: i32, output: String },

    #[error("could not parse host specs: {0}")]
    SpecParse(String),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("missing env var: {0}")]
    MissingEnv(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Receives installer output one line at a time.
///
/// Bounded, so a slow consumer applies backpressure to the remote read loop.
pub type LogSink = mpsc::Sender<String>;

/// Inspects a VPS before anything is installed on it.
#[async_trait]
pub trait CapabilityDetector: Send + Sync + 'static {
    async fn detect(&self, target: &RemoteTarget) -> Result<DetectedSpecs>;
}

/// Runs an install plan on a VPS.
///
/// Returning `Ok` means the installer finished; the RDP service may still
/// need minutes before it accepts connections.
#[async_trait]
pub trait RemoteProvisioner: Send + Sync + 'static {
    async fn provision(&self, target: &RemoteTarget, plan: &InstallPlan, log: LogSink) -> Result<()>;
}
