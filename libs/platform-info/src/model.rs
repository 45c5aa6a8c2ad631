use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Hardware security features reported in a [`HostSnapshot`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HardwareFeature {
    Tpm,
    Txt,
    Cbnt,
    Suefi,
    Mktme,
}

impl HardwareFeature {
    pub const ALL: [Self; 5] = [Self::Tpm, Self::Txt, Self::Cbnt, Self::Suefi, Self::Mktme];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tpm => "TPM",
            Self::Txt => "TXT",
            Self::Cbnt => "CBNT",
            Self::Suefi => "SUEFI",
            Self::Mktme => "MKTME",
        }
    }
}

impl fmt::Display for HardwareFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a hardware feature probe.
///
/// `Unsupported` means the probe mechanism itself is unavailable on this
/// platform, and is distinct from a feature that was probed and found disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureStatus {
    Enabled,
    Disabled,
    Unsupported,
}

impl FeatureStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "ENABLED",
            Self::Disabled => "DISABLED",
            Self::Unsupported => "UNSUPPORTED",
        }
    }

    #[must_use]
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }

    #[must_use]
    pub const fn is_supported(self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

impl fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presence of an installable platform component such as tboot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentStatus {
    Installed,
    NotInstalled,
    Unsupported,
}

impl ComponentStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Installed => "INSTALLED",
            Self::NotInstalled => "NOT_INSTALLED",
            Self::Unsupported => "UNSUPPORTED",
        }
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Known Boot Guard profiles, keyed by the low byte of MSR 0x13A
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BootGuardProfile {
    /// Verified boot with force anchor boot
    #[serde(rename = "BTGP4")]
    Btgp4,
    /// Verified and measured boot with force anchor boot
    #[serde(rename = "BTGP5")]
    Btgp5,
}

impl BootGuardProfile {
    #[must_use]
    pub const fn register_code(self) -> &'static str {
        match self {
            Self::Btgp4 => "51",
            Self::Btgp5 => "7D",
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Btgp4 => "BTGP4",
            Self::Btgp5 => "BTGP5",
        }
    }

    /// Match raw `rdmsr -f 7:0 0x13A` output; unknown codes yield `None`.
    #[must_use]
    pub fn from_register(raw: &str) -> Option<Self> {
        let code = raw.trim().to_ascii_uppercase();
        [Self::Btgp5, Self::Btgp4]
            .into_iter()
            .find(|profile| profile.register_code() == code)
    }
}

/// Registry of node components whose presence is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HostComponent {
    #[serde(rename = "tagent")]
    TrustAgent,
    #[serde(rename = "wlagent")]
    WorkloadAgent,
}

impl HostComponent {
    pub const ALL: [Self; 2] = [Self::TrustAgent, Self::WorkloadAgent];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TrustAgent => "tagent",
            Self::WorkloadAgent => "wlagent",
        }
    }

    /// The trust agent hosts this library, so it is never probed.
    #[must_use]
    pub const fn always_present(self) -> bool {
        matches!(self, Self::TrustAgent)
    }
}

impl fmt::Display for HostComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hypervisor name and version pair
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmmIdentity {
    pub name: String,
    pub version: String,
}

impl VmmIdentity {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Both fields empty: hypervisor could not be determined
    #[must_use]
    pub fn unknown() -> Self {
        Self::default()
    }
}

/// Enablement and metadata for a single hardware feature
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDetails {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

impl FeatureDetails {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            meta: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// Platform identity and security capabilities of a host, assembled once per probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub bios_name: String,
    pub bios_version: String,
    pub os_name: String,
    pub os_version: String,
    pub vmm_name: String,
    pub vmm_version: String,
    pub processor_info: String,
    pub processor_flags: Vec<String>,
    pub hardware_uuid: String,
    pub host_name: String,
    pub number_of_sockets: u32,
    pub tpm_version: String,
    pub tpm_enabled: bool,
    /// `txt_status == ENABLED`, kept for consumers of the older flat shape
    pub txt_enabled: bool,
    /// `tboot_status == INSTALLED`, kept for consumers of the older flat shape
    pub tboot_installed: bool,
    pub hardware_features: BTreeMap<HardwareFeature, FeatureDetails>,
    pub installed_components: BTreeSet<HostComponent>,
}

impl HostSnapshot {
    /// Processor flags joined the way the legacy snapshot reported them
    #[must_use]
    pub fn processor_flags_line(&self) -> String {
        self.processor_flags.join(" ")
    }
}
