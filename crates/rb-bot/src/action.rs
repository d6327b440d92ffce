//! Button payloads carried in Telegram callback data.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use rb_infra::installer::{DEDICATED_RDP_PORT, TEMPLATED_RDP_PORT};

use crate::session::InstallKind;

/// Ports a `test_rdp` button may probe. Callback data is client-supplied.
const TESTABLE_PORTS: [u16; 2] = [TEMPLATED_RDP_PORT, DEDICATED_RDP_PORT];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Install(InstallKind),
    Catalog(u32),
    BackToCatalog,
    CancelInstallation,
    BackToMenu,
    Deposit,
    Faq,
    Tutorial,
    ConnectionGuide,
    /// One-shot probe answered as an alert.
    TestRdp { host: Ipv4Addr, port: u16 },
    /// Probe rendered into the message, with a button to check again.
    CheckRdp { host: Ipv4Addr, port: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown button payload: {0}")]
pub struct UnknownAction(pub String);

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install(InstallKind::Templated) => f.write_str("install_templated"),
            Self::Install(InstallKind::Dedicated) => f.write_str("install_dedicated"),
            Self::Catalog(id) => write!(f, "catalog:{id}"),
            Self::BackToCatalog => f.write_str("back_to_catalog"),
            Self::CancelInstallation => f.write_str("cancel_installation"),
            Self::BackToMenu => f.write_str("back_to_menu"),
            Self::Deposit => f.write_str("deposit"),
            Self::Faq => f.write_str("faq"),
            Self::Tutorial => f.write_str("tutorial"),
            Self::ConnectionGuide => f.write_str("rdp_connection_guide"),
            Self::TestRdp { host, port } => write!(f, "test_rdp:{host}:{port}"),
            Self::CheckRdp { host, port } => write!(f, "check_rdp:{host}:{port}"),
        }
    }
}

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownAction(s.to_string());

        let action = match s {
            "install_templated" => Self::Install(InstallKind::Templated),
            "install_dedicated" => Self::Install(InstallKind::Dedicated),
            "back_to_catalog" => Self::BackToCatalog,
            "cancel_installation" => Self::CancelInstallation,
            "back_to_menu" => Self::BackToMenu,
            "deposit" => Self::Deposit,
            "faq" => Self::Faq,
            "tutorial" => Self::Tutorial,
            "rdp_connection_guide" => Self::ConnectionGuide,
            _ => {
                if let Some(id) = s.strip_prefix("catalog:") {
                    Self::Catalog(id.parse().map_err(|_| unknown())?)
                } else if let Some(rest) = s.strip_prefix("test_rdp:") {
                    let (host, port) = parse_endpoint(rest).ok_or_else(unknown)?;
                    Self::TestRdp { host, port }
                } else if let Some(rest) = s.strip_prefix("check_rdp:") {
                    let (host, port) = parse_endpoint(rest).ok_or_else(unknown)?;
                    Self::CheckRdp { host, port }
                } else {
                    return Err(unknown());
                }
            }
        };
        Ok(action)
    }
}

/// `<ipv4>:<port>`, restricted to the RDP ports.
fn parse_endpoint(raw: &str) -> Option<(Ipv4Addr, u16)> {
    let (host, port) = raw.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    if !TESTABLE_PORTS.contains(&port) {
        return None;
    }
    Some((host.parse().ok()?, port))
}
