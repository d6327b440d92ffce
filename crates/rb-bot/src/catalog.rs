//! Windows editions offered for each install kind.

use std::fmt;

use crate::session::InstallKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Desktop,
    Server,
    Standard,
    Lite,
    Uefi,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Desktop => "Desktop",
            Self::Server => "Server",
            Self::Standard => "Standard",
            Self::Lite => "Lite",
            Self::Uefi => "UEFI",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: u32,
    pub name: String,
    /// Image key understood by the installer script.
    pub image: String,
    pub tier: Tier,
}

impl CatalogEntry {
    fn new(id: u32, name: &str, image: &str, tier: Tier) -> Self {
        Self {
            id,
            name: name.into(),
            image: image.into(),
            tier,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    templated: Vec<CatalogEntry>,
    dedicated: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(templated: Vec<CatalogEntry>, dedicated: Vec<CatalogEntry>) -> Self {
        Self {
            templated,
            dedicated,
        }
    }

    pub fn builtin() -> Self {
        Self::new(templated_entries(), dedicated_entries())
    }

    pub fn for_kind(&self, kind: InstallKind) -> &[CatalogEntry] {
        match kind {
            InstallKind::Templated => &self.templated,
            InstallKind::Dedicated => &self.dedicated,
        }
    }

    pub fn find(&self, kind: InstallKind, id: u32) -> Option<&CatalogEntry> {
        self.for_kind(kind).iter().find(|e| e.id == id)
    }

    /// Entries of `kind` grouped by tier, in catalog order.
    pub fn tiers(&self, kind: InstallKind) -> Vec<(Tier, Vec<&CatalogEntry>)> {
        let mut groups: Vec<(Tier, Vec<&CatalogEntry>)> = Vec::new();
        for entry in self.for_kind(kind) {
            match groups.iter_mut().find(|(tier, _)| *tier == entry.tier) {
                Some((_, entries)) => entries.push(entry),
                None => groups.push((entry.tier, vec![entry])),
            }
        }
        groups
    }
}

fn templated_entries() -> Vec<CatalogEntry> {
    use Tier::{Desktop, Server};
    [
        (1, "Windows 11 Pro", "11", Desktop),
        (2, "Windows 11 LTSC", "11l", Desktop),
        (3, "Windows 11 Enterprise", "11e", Desktop),
        (4, "Windows 10 Pro", "10", Desktop),
        (5, "Windows 10 LTSC", "10l", Desktop),
        (6, "Windows 10 Enterprise", "10e", Desktop),
        (7, "Windows 8.1 Enterprise", "8e", Desktop),
        (8, "Windows 7 Ultimate", "7u", Desktop),
        (9, "Windows Vista Ultimate", "vu", Desktop),
        (10, "Windows XP Professional", "xp", Desktop),
        (11, "Windows Server 2025", "2025", Server),
        (12, "Windows Server 2022", "2022", Server),
        (13, "Windows Server 2019", "2019", Server),
        (14, "Windows Server 2016", "2016", Server),
        (15, "Windows Server 2012", "2012", Server),
        (16, "Windows Server 2008", "2008", Server),
    ]
    .into_iter()
    .map(|(id, name, image, tier)| CatalogEntry::new(id, name, image, tier))
    .collect()
}

fn dedicated_entries() -> Vec<CatalogEntry> {
    use Tier::{Lite, Standard, Uefi};
    [
        (1, "Windows 10 Ghost Spectre", "win_10ghost", Standard),
        (2, "Windows Server 2022", "win_22", Standard),
        (3, "Windows Server 2019", "win_19", Standard),
        (4, "Windows Server 2008", "win_2008", Standard),
        (5, "Windows Server 2012 R2", "win_2012R2", Standard),
        (6, "Windows Server 2016", "win_2016", Standard),
        (7, "Windows Server 2019 Standard", "win_2019", Standard),
        (8, "Windows 7", "win_7", Standard),
        (9, "Windows 10 Enterprise", "win_10_ent", Standard),
        (10, "Windows 11 Pro", "win_11_pro", Standard),
        (11, "Windows Server 2022 Lite", "win_2022_lite", Lite),
        (12, "Windows Server 2016 Lite", "win_2016_lite", Lite),
        (13, "Windows Server 2012 R2 Lite", "win_2012R2_lite", Lite),
        (14, "Windows 7 SP1 Lite", "win_7_sp1_lite", Lite),
        (15, "Windows Server 2012 R2 UEFI", "win_2012R2_uefi", Uefi),
        (16, "Windows Server 2016 UEFI", "win_2016_uefi", Uefi),
        (17, "Windows Server 2019 UEFI", "win_2019_uefi", Uefi),
        (18, "Windows Server 2022 UEFI", "win_2022_uefi", Uefi),
        (19, "Windows 10 UEFI", "win_10_uefi", Uefi),
        (20, "Windows 11 UEFI", "win_11_uefi", Uefi),
    ]
    .into_iter()
    .map(|(id, name, image, tier)| CatalogEntry::new(id, name, image, tier))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedicated_catalog_has_three_tiers() {
        let catalog = Catalog::builtin();
        let tiers: Vec<_> = catalog
            .tiers(InstallKind::Dedicated)
            .into_iter()
            .map(|(tier, entries)| (tier, entries.len()))
            .collect();
        assert_eq!(tiers, [(Tier::Standard, 10), (Tier::Lite, 4), (Tier::Uefi, 6)]);

        let server_2022 = catalog.find(InstallKind::Dedicated, 2).unwrap();
        assert_eq!(server_2022.name, "Windows Server 2022");
        assert_eq!(server_2022.image, "win_22");
    }

    #[test]
    fn lookups_are_scoped_to_kind() {
        let catalog = Catalog::builtin();
        assert!(catalog.find(InstallKind::Templated, 20).is_none());
        assert!(catalog.find(InstallKind::Dedicated, 20).is_some());
        assert!(catalog.find(InstallKind::Dedicated, 0).is_none());
        assert_eq!(catalog.find(InstallKind::Templated, 12).unwrap().image, "2022");
    }
}
