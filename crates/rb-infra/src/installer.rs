//! Installer scripts and the commands that run them.

use crate::types::{Capacity, Secret};

const TEMPLATED_SCRIPT: &str = include_str!("../scripts/templated.sh");
const DEDICATED_SCRIPT: &str = include_str!("../scripts/dedicated.sh");

/// Port the templated container publishes RDP on.
pub const TEMPLATED_RDP_PORT: u16 = 3389;
/// Web console of the templated container.
pub const TEMPLATED_CONSOLE_PORT: u16 = 8006;
/// RDP port configured by the dedicated reinstall.
pub const DEDICATED_RDP_PORT: u16 = 8765;

/// Everything the remote installer needs besides the SSH target.
#[derive(Debug, Clone, PartialEq)]
pub enum InstallPlan {
    /// Windows in a container on top of the existing Linux host.
    Templated {
        image: String,
        capacity: Capacity,
        password: Secret,
        kvm: bool,
    },
    /// Replace the host OS with Windows.
    Dedicated { image: String, password: Secret },
}

impl InstallPlan {
    pub fn image(&self) -> &str {
        match self {
            Self::Templated { image, .. } | Self::Dedicated { image, .. } => image,
        }
    }

    pub fn password(&self) -> &Secret {
        match self {
            Self::Templated { password, .. } | Self::Dedicated { password, .. } => password,
        }
    }

    pub fn rdp_port(&self) -> u16 {
        match self {
            Self::Templated { .. } => TEMPLATED_RDP_PORT,
            Self::Dedicated { .. } => DEDICATED_RDP_PORT,
        }
    }

    pub fn script(&self) -> &'static str {
        match self {
            Self::Templated { .. } => TEMPLATED_SCRIPT,
            Self::Dedicated { .. } => DEDICATED_SCRIPT,
        }
    }

    /// Where the script is uploaded on the target.
    pub fn remote_path(&self) -> &'static str {
        match self {
            Self::Templated { .. } => "/root/rb-templated.sh",
            Self::Dedicated { .. } => "/root/rb-dedicated.sh",
        }
    }

    /// Shell command that runs the uploaded script and removes it afterwards.
    ///
    /// `image_base_url` is only used by dedicated installs.
    pub fn command(&self, image_base_url: &str) -> String {
        let args: Vec<String> = match self {
            Self::Templated {
                image,
                capacity,
                password,
                kvm,
            } => vec![
                image.clone(),
                format!("{}", capacity.memory_gb.floor() as u64),
                capacity.cpu_cores.to_string(),
                capacity.disk_gb.to_string(),
                password.expose().to_string(),
                if *kvm { "yes" } else { "no" }.to_string(),
            ],
            Self::Dedicated { image, password } => vec![
                password.expose().to_string(),
                image.clone(),
                image_base_url.to_string(),
                DEDICATED_RDP_PORT.to_string(),
            ],
        };

        let path = self.remote_path();
        let quoted: Vec<String> = args.iter().map(|a| shell_quote(a)).collect();
        format!(
            "chmod +x {path} && bash {path} {}; status=$?; rm -f {path}; exit $status",
            quoted.join(" ")
        )
    }
}

/// Single-quote `raw` for POSIX shells.
pub fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}
