//! Hardware inspection of a target VPS.
//!
//! Detection runs a single shell snippet that prints each probe separated by
//! a marker line, so one round trip is enough and parsing stays independent
//! of the transport.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const SECTION_MARKER: &str = "---rb---";

/// Shell snippet whose output [`DetectedSpecs::parse`] understands.
pub const DETECT_SCRIPT: &str = concat!(
    "nproc; echo '---rb---'; ",
    "grep -m1 'model name' /proc/cpuinfo | cut -d: -f2 | xargs; echo '---rb---'; ",
    "free -m | awk '/^Mem:/{print $2}'; echo '---rb---'; ",
    "df -BG / | awk 'NR==2{gsub(/G/,\"\",$2); print $2}'; echo '---rb---'; ",
    "hostname; echo '---rb---'; ",
    "(lsb_release -ds 2>/dev/null || grep PRETTY_NAME /etc/os-release | cut -d'\"' -f2); echo '---rb---'; ",
    "(test -e /dev/kvm && echo yes || echo no)"
);

/// What capability detection learned about a VPS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedSpecs {
    pub cpu_cores: u32,
    pub cpu_model: String,
    pub memory_gb: f64,
    pub disk_gb: u32,
    pub hostname: String,
    pub os_description: String,
    pub kvm_capable: bool,
}

impl DetectedSpecs {
    /// Parse the output of [`DETECT_SCRIPT`] run on `host`.
    ///
    /// Numeric probes are required; descriptive ones fall back to
    /// placeholders. A blank hostname becomes `RDP-<ip digits>`.
    pub fn parse(host: &str, output: &str) -> Result<Self> {
        let sections: Vec<&str> = output
            .split(SECTION_MARKER)
            .map(str::trim)
            .collect();

        if sections.len() < 7 {
            return Err(Error::SpecParse(format!(
                "expected 7 sections, got {}",
                sections.len()
            )));
        }

        let cpu_cores: u32 = parse_number(sections[0], "cpu cores")?;
        let memory_mb: u64 = parse_number(sections[2], "memory")?;
        let disk_gb: u32 = parse_number(sections[3], "disk")?;

        let hostname = match sections[4] {
            "" | "unknown" | "localhost" => format!("RDP-{}", host.replace('.', "")),
            name => name.to_string(),
        };

        Ok(Self {
            cpu_cores,
            cpu_model: non_empty_or(sections[1], "Unknown CPU"),
            memory_gb: (memory_mb as f64 / 1024.0 * 100.0).round() / 100.0,
            disk_gb,
            hostname,
            os_description: non_empty_or(sections[5], "Unknown OS"),
            kvm_capable: sections[6] == "yes",
        })
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T> {
    raw.lines()
        .next()
        .unwrap_or_default()
        .trim()
        .parse()
        .map_err(|_| Error::SpecParse(format!("{what}: unexpected value {raw:?}")))
}

fn non_empty_or(raw: &str, fallback: &str) -> String {
    if raw.is_empty() {
        fallback.to_string()
    } else {
        raw.to_string()
    }
}
