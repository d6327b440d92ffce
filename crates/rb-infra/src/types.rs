use std::fmt;

use serde::{Deserialize, Serialize};

/// A credential that must never reach logs or durable storage.
///
/// `Debug` and `Display` are redacted; the value is only reachable through
/// [`Secret::expose`].
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Asterisks of the same length, for progress logs.
    pub fn masked(&self) -> String {
        "*".repeat(self.0.chars().count())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// SSH endpoint of the VPS being provisioned.
#[derive(Debug, Clone)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Secret,
}

impl RemoteTarget {
    pub const SSH_PORT: u16 = 22;

    /// Root login on the default SSH port, which is what freshly rented VPSes offer.
    pub fn root(host: impl Into<String>, password: Secret) -> Self {
        Self {
            host: host.into(),
            port: Self::SSH_PORT,
            username: "root".into(),
            password,
        }
    }
}

/// Resources handed to the installed Windows guest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capacity {
    pub cpu_cores: u32,
    pub memory_gb: f64,
    pub disk_gb: u32,
}
