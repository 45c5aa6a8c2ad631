//! Per-platform fact probes.
//!
//! A [`HostProbe`] knows which OS utilities to run for each fact and hands their
//! output to [`crate::classify`]. Security feature methods default to
//! `UNSUPPORTED` so that a platform without a probe mechanism for them reports
//! that explicitly instead of hardcoding its own stub.

mod container;
mod linux;
mod windows;

use std::collections::BTreeSet;

pub use container::{ChrootHook, ContainerProbe, container_probe};
pub use linux::LinuxProbe;
pub use windows::WindowsProbe;

use crate::error::PlatformInfoError;
use crate::model::{ComponentStatus, FeatureStatus, HostComponent, VmmIdentity};

/// Capability contract implemented by every platform strategy.
///
/// Identity facts return `Result`: a probe decides per fact whether a failure is
/// surfaced or degraded to a neutral value. Security feature probes never fail.
pub trait HostProbe {
    /// # Errors
    /// When the BIOS vendor cannot be read.
    fn bios_name(&self) -> Result<String, PlatformInfoError>;

    /// # Errors
    /// When the BIOS version cannot be read.
    fn bios_version(&self) -> Result<String, PlatformInfoError>;

    /// # Errors
    /// When the platform treats the OS identity as essential and it cannot be read.
    fn os_name(&self) -> Result<String, PlatformInfoError>;

    /// # Errors
    /// When the platform treats the OS identity as essential and it cannot be read.
    fn os_version(&self) -> Result<String, PlatformInfoError>;

    /// Hypervisor name and version, resolved together.
    ///
    /// # Errors
    /// When the platform query for hypervisor features fails hard.
    fn vmm(&self) -> Result<VmmIdentity, PlatformInfoError>;

    /// # Errors
    /// See [`HostProbe::vmm`].
    fn vmm_name(&self) -> Result<String, PlatformInfoError> {
        self.vmm().map(|vmm| vmm.name)
    }

    /// # Errors
    /// See [`HostProbe::vmm`].
    fn vmm_version(&self) -> Result<String, PlatformInfoError> {
        self.vmm().map(|vmm| vmm.version)
    }

    /// # Errors
    /// When the platform treats processor identity as essential and it cannot be read.
    fn processor_info(&self) -> Result<String, PlatformInfoError>;

    /// # Errors
    /// When the CPU flag source is unavailable and the platform treats that as fatal.
    fn processor_flags(&self) -> Result<Vec<String>, PlatformInfoError>;

    /// # Errors
    /// When the hardware UUID cannot be read.
    fn hardware_uuid(&self) -> Result<String, PlatformInfoError>;

    /// `"0"` for no TPM, otherwise the TPM specification version.
    ///
    /// # Errors
    /// When the platform TPM query fails hard.
    fn tpm_version(&self) -> Result<String, PlatformInfoError>;

    #[must_use]
    fn tpm_enabled(&self) -> bool;

    /// # Errors
    /// When the host name cannot be read.
    fn host_name(&self) -> Result<String, PlatformInfoError>;

    /// # Errors
    /// When the platform treats the socket query as essential and it fails.
    fn number_of_sockets(&self) -> Result<u32, PlatformInfoError>;

    #[must_use]
    fn txt_status(&self) -> FeatureStatus {
        FeatureStatus::Unsupported
    }

    /// TXT as the older boolean snapshot field reported it
    #[must_use]
    fn legacy_txt_enabled(&self) -> bool {
        self.txt_status().is_enabled()
    }

    #[must_use]
    fn cbnt_status(&self) -> FeatureStatus {
        FeatureStatus::Unsupported
    }

    /// Boot Guard profile name for an already resolved CBNT `status`, empty unless enabled
    #[must_use]
    fn cbnt_profile(&self, _status: FeatureStatus) -> String {
        String::new()
    }

    #[must_use]
    fn suefi_status(&self) -> FeatureStatus {
        FeatureStatus::Unsupported
    }

    #[must_use]
    fn mktme_status(&self) -> FeatureStatus {
        FeatureStatus::Unsupported
    }

    /// Encryption algorithm for an already resolved MKTME `status`, empty unless enabled
    #[must_use]
    fn mktme_encryption_algorithm(&self, _status: FeatureStatus) -> String {
        String::new()
    }

    #[must_use]
    fn mktme_max_keys_per_cpu(&self, _status: FeatureStatus) -> u32 {
        0
    }

    #[must_use]
    fn tboot_status(&self) -> ComponentStatus {
        ComponentStatus::Unsupported
    }

    #[must_use]
    fn installed_components(&self) -> BTreeSet<HostComponent> {
        BTreeSet::new()
    }

    #[must_use]
    fn is_container_environment(&self) -> bool {
        false
    }
}
