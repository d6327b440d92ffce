//! Per-chat conversation state.

use std::fmt;
use std::net::Ipv4Addr;

use rb_infra::installer::{DEDICATED_RDP_PORT, TEMPLATED_RDP_PORT};
use rb_infra::{Capacity, DetectedSpecs, InstallPlan, RemoteTarget, Secret};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::catalog::CatalogEntry;

pub type ChatId = i64;
pub type UserId = i64;

/// A message the bot can edit or delete later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: i64,
}

// ── InstallKind ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallKind {
    /// Windows in a container on the existing Linux host.
    Templated,
    /// Windows replaces the host OS.
    Dedicated,
}

impl InstallKind {
    pub fn rdp_port(self) -> u16 {
        match self {
            Self::Templated => TEMPLATED_RDP_PORT,
            Self::Dedicated => DEDICATED_RDP_PORT,
        }
    }

    pub fn requirements(self) -> Requirements {
        match self {
            Self::Templated => Requirements {
                min_cores: 2,
                min_memory_gb: 4.0,
                min_disk_gb: 40,
            },
            Self::Dedicated => Requirements {
                min_cores: 1,
                min_memory_gb: 1.0,
                min_disk_gb: 20,
            },
        }
    }

    /// Resources handed to Windows. The container keeps 2 GB RAM and 10 GB
    /// disk back for the host.
    pub fn capacity(self, specs: &DetectedSpecs) -> Capacity {
        match self {
            Self::Templated => Capacity {
                cpu_cores: specs.cpu_cores,
                memory_gb: (specs.memory_gb - 2.0).max(0.0),
                disk_gb: specs.disk_gb.saturating_sub(10),
            },
            Self::Dedicated => Capacity {
                cpu_cores: specs.cpu_cores,
                memory_gb: specs.memory_gb,
                disk_gb: specs.disk_gb,
            },
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Templated => "Docker RDP",
            Self::Dedicated => "Dedicated RDP",
        }
    }
}

impl fmt::Display for InstallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Templated => "templated",
            Self::Dedicated => "dedicated",
        })
    }
}

// ── Requirements ────────────────────────────────────────────────────

/// Memory the kernel reserves out of what the provider sells. A 4 GB plan
/// reports roughly 3.8 GB in `MemTotal`.
const MEMORY_SLACK_GB: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Requirements {
    pub min_cores: u32,
    pub min_memory_gb: f64,
    pub min_disk_gb: u32,
}

/// One resource below its minimum.
#[derive(Debug, Clone, PartialEq)]
pub struct Shortfall {
    pub resource: &'static str,
    pub required: String,
    pub actual: String,
}

impl Requirements {
    /// Empty when the host qualifies.
    pub fn shortfalls(&self, specs: &DetectedSpecs) -> Vec<Shortfall> {
        let mut missing = Vec::new();
        if specs.cpu_cores < self.min_cores {
            missing.push(Shortfall {
                resource: "CPU",
                required: format!("{} cores", self.min_cores),
                actual: format!("{} cores", specs.cpu_cores),
            });
        }
        if specs.memory_gb + MEMORY_SLACK_GB < self.min_memory_gb {
            missing.push(Shortfall {
                resource: "RAM",
                required: format!("{} GB", self.min_memory_gb),
                actual: format!("{} GB", specs.memory_gb),
            });
        }
        if specs.disk_gb < self.min_disk_gb {
            missing.push(Shortfall {
                resource: "Disk",
                required: format!("{} GB", self.min_disk_gb),
                actual: format!("{} GB", specs.disk_gb),
            });
        }
        missing
    }
}

// ── Steps ───────────────────────────────────────────────────────────

/// A host whose credentials worked and whose specs passed the requirements.
#[derive(Debug, Clone)]
pub struct VerifiedTarget {
    pub host: Ipv4Addr,
    pub credential: Secret,
    pub specs: DetectedSpecs,
}

impl VerifiedTarget {
    pub fn remote(&self) -> RemoteTarget {
        RemoteTarget::root(self.host.to_string(), self.credential.clone())
    }
}

/// Everything needed to run an install.
#[derive(Debug, Clone)]
pub struct Order {
    pub target: VerifiedTarget,
    pub product: CatalogEntry,
    pub password: Secret,
}

impl Order {
    pub fn plan(&self, kind: InstallKind) -> InstallPlan {
        match kind {
            InstallKind::Templated => InstallPlan::Templated {
                image: self.product.image.clone(),
                capacity: kind.capacity(&self.target.specs),
                password: self.password.clone(),
                kvm: self.target.specs.kvm_capable,
            },
            InstallKind::Dedicated => InstallPlan::Dedicated {
                image: self.product.image.clone(),
                password: self.password.clone(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    AwaitingHost,
    AwaitingRootCredential { host: Ipv4Addr },
    ProbingCapability { host: Ipv4Addr, credential: Secret },
    AwaitingCatalogChoice { target: VerifiedTarget },
    AwaitingNewPassword { target: VerifiedTarget, product: CatalogEntry },
    Provisioning { order: Order },
    MonitoringReadiness { order: Order },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AwaitingHost => "awaiting_host",
            Self::AwaitingRootCredential { .. } => "awaiting_root_credential",
            Self::ProbingCapability { .. } => "probing_capability",
            Self::AwaitingCatalogChoice { .. } => "awaiting_catalog_choice",
            Self::AwaitingNewPassword { .. } => "awaiting_new_password",
            Self::Provisioning { .. } => "provisioning",
            Self::MonitoringReadiness { .. } => "monitoring_readiness",
        }
    }

    /// The remote install has been started and can no longer be replaced.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Provisioning { .. } | Self::MonitoringReadiness { .. })
    }
}

// ── Sessions ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ProvisioningSession {
    pub id: Uuid,
    pub user_id: UserId,
    pub kind: InstallKind,
    /// The single message edited as the conversation advances.
    pub prompt: MessageRef,
    pub started_at: Instant,
    /// Amount deducted when the session started; zero for admins.
    pub charged: i64,
    /// Fired when the session is destroyed for any reason.
    pub lifetime: CancellationToken,
    pub step: Step,
    /// Bumped by every step transition.
    pub revision: u64,
}

impl ProvisioningSession {
    pub fn new(user_id: UserId, kind: InstallKind, prompt: MessageRef, charged: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            prompt,
            started_at: Instant::now(),
            charged,
            lifetime: CancellationToken::new(),
            step: Step::AwaitingHost,
            revision: 0,
        }
    }
}

/// An admin typing `<user_id> <amount>` to credit a balance.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub prompt: MessageRef,
}

/// A user typing the amount of a top-up request.
#[derive(Debug, Clone)]
pub struct DepositSession {
    pub user_id: UserId,
    pub prompt: MessageRef,
}
