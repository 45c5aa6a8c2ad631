use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Fact, PlatformInfoError};
use crate::model::{
    ComponentStatus, FeatureDetails, FeatureStatus, HardwareFeature, HostComponent, HostSnapshot,
    VmmIdentity,
};
use crate::probe::HostProbe;
use crate::selector::{ProbeConfig, select_probe};

/// Lazily resolved, cached view of a host.
///
/// Every fact is fetched from the probe on first access and cached for the
/// lifetime of the value; a failed fetch is not cached and is retried on the
/// next access. The cache uses [`OnceCell`], so a `PlatformInfo` cannot be
/// shared across threads without external synchronisation.
pub struct PlatformInfo {
    probe: Box<dyn HostProbe>,
    bios_name: OnceCell<String>,
    bios_version: OnceCell<String>,
    os_name: OnceCell<String>,
    os_version: OnceCell<String>,
    vmm: OnceCell<VmmIdentity>,
    processor_info: OnceCell<String>,
    processor_flags: OnceCell<Vec<String>>,
    hardware_uuid: OnceCell<String>,
    host_name: OnceCell<String>,
    number_of_sockets: OnceCell<u32>,
    tpm_version: OnceCell<String>,
    tpm_enabled: OnceCell<bool>,
    txt_status: OnceCell<FeatureStatus>,
    legacy_txt_enabled: OnceCell<bool>,
    cbnt_status: OnceCell<FeatureStatus>,
    cbnt_profile: OnceCell<String>,
    suefi_status: OnceCell<FeatureStatus>,
    mktme_status: OnceCell<FeatureStatus>,
    mktme_encryption_algorithm: OnceCell<String>,
    mktme_max_keys_per_cpu: OnceCell<u32>,
    tboot_status: OnceCell<ComponentStatus>,
    installed_components: OnceCell<BTreeSet<HostComponent>>,
    container_environment: OnceCell<bool>,
}

fn cached<T>(
    cell: &OnceCell<T>,
    fact: Fact,
    resolve: impl FnOnce() -> Result<T, PlatformInfoError>,
) -> Result<&T, PlatformInfoError> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = resolve().map_err(|e| {
        tracing::error!(fact = %fact, error = %e, "Failed to resolve fact");
        e.for_fact(fact)
    })?;
    Ok(cell.get_or_init(|| value))
}

impl PlatformInfo {
    #[must_use]
    pub fn new(probe: impl HostProbe + 'static) -> Self {
        Self::from_boxed(Box::new(probe))
    }

    #[must_use]
    pub fn from_boxed(probe: Box<dyn HostProbe>) -> Self {
        Self {
            probe,
            bios_name: OnceCell::new(),
            bios_version: OnceCell::new(),
            os_name: OnceCell::new(),
            os_version: OnceCell::new(),
            vmm: OnceCell::new(),
            processor_info: OnceCell::new(),
            processor_flags: OnceCell::new(),
            hardware_uuid: OnceCell::new(),
            host_name: OnceCell::new(),
            number_of_sockets: OnceCell::new(),
            tpm_version: OnceCell::new(),
            tpm_enabled: OnceCell::new(),
            txt_status: OnceCell::new(),
            legacy_txt_enabled: OnceCell::new(),
            cbnt_status: OnceCell::new(),
            cbnt_profile: OnceCell::new(),
            suefi_status: OnceCell::new(),
            mktme_status: OnceCell::new(),
            mktme_encryption_algorithm: OnceCell::new(),
            mktme_max_keys_per_cpu: OnceCell::new(),
            tboot_status: OnceCell::new(),
            installed_components: OnceCell::new(),
            container_environment: OnceCell::new(),
        }
    }

    /// Select a probe for `config` backed by real system commands
    ///
    /// # Errors
    /// `Configuration` when no strategy can be built from `config`.
    pub fn from_config(config: &ProbeConfig) -> Result<Self, PlatformInfoError> {
        select_probe(config).map(Self::from_boxed)
    }

    /// # Errors
    /// When the BIOS vendor cannot be determined.
    pub fn bios_name(&self) -> Result<&str, PlatformInfoError> {
        cached(&self.bios_name, Fact::BiosName, || self.probe.bios_name()).map(String::as_str)
    }

    /// # Errors
    /// When the BIOS version cannot be determined.
    pub fn bios_version(&self) -> Result<&str, PlatformInfoError> {
        cached(&self.bios_version, Fact::BiosVersion, || {
            self.probe.bios_version()
        })
        .map(String::as_str)
    }

    /// # Errors
    /// When the probe treats the OS name as essential and it cannot be determined.
    pub fn os_name(&self) -> Result<&str, PlatformInfoError> {
        cached(&self.os_name, Fact::OsName, || self.probe.os_name()).map(String::as_str)
    }

    /// # Errors
    /// When the probe treats the OS version as essential and it cannot be determined.
    pub fn os_version(&self) -> Result<&str, PlatformInfoError> {
        cached(&self.os_version, Fact::OsVersion, || self.probe.os_version()).map(String::as_str)
    }

    fn vmm(&self, fact: Fact) -> Result<&VmmIdentity, PlatformInfoError> {
        cached(&self.vmm, fact, || self.probe.vmm())
    }

    /// # Errors
    /// When the hypervisor query fails hard.
    pub fn vmm_name(&self) -> Result<&str, PlatformInfoError> {
        self.vmm(Fact::VmmName).map(|vmm| vmm.name.as_str())
    }

    /// # Errors
    /// When the hypervisor query fails hard.
    pub fn vmm_version(&self) -> Result<&str, PlatformInfoError> {
        self.vmm(Fact::VmmVersion).map(|vmm| vmm.version.as_str())
    }

    /// # Errors
    /// When the probe treats processor identity as essential and it cannot be determined.
    pub fn processor_info(&self) -> Result<&str, PlatformInfoError> {
        cached(&self.processor_info, Fact::ProcessorInfo, || {
            self.probe.processor_info()
        })
        .map(String::as_str)
    }

    /// # Errors
    /// When the CPU flag source fails hard.
    pub fn processor_flags(&self) -> Result<&[String], PlatformInfoError> {
        cached(&self.processor_flags, Fact::ProcessorFlags, || {
            self.probe.processor_flags()
        })
        .map(Vec::as_slice)
    }

    /// # Errors
    /// When the hardware UUID cannot be determined.
    pub fn hardware_uuid(&self) -> Result<&str, PlatformInfoError> {
        cached(&self.hardware_uuid, Fact::HardwareUuid, || {
            self.probe.hardware_uuid()
        })
        .map(String::as_str)
    }

    /// # Errors
    /// When the host name cannot be determined.
    pub fn host_name(&self) -> Result<&str, PlatformInfoError> {
        cached(&self.host_name, Fact::HostName, || self.probe.host_name()).map(String::as_str)
    }

    /// # Errors
    /// When the probe treats the socket query as essential and it fails.
    pub fn number_of_sockets(&self) -> Result<u32, PlatformInfoError> {
        cached(&self.number_of_sockets, Fact::NumberOfSockets, || {
            self.probe.number_of_sockets()
        })
        .copied()
    }

    /// # Errors
    /// When the TPM query fails hard.
    pub fn tpm_version(&self) -> Result<&str, PlatformInfoError> {
        cached(&self.tpm_version, Fact::TpmVersion, || {
            self.probe.tpm_version()
        })
        .map(String::as_str)
    }

    #[must_use]
    pub fn tpm_enabled(&self) -> bool {
        *self.tpm_enabled.get_or_init(|| self.probe.tpm_enabled())
    }

    #[must_use]
    pub fn txt_status(&self) -> FeatureStatus {
        *self.txt_status.get_or_init(|| self.probe.txt_status())
    }

    /// TXT through the probe's legacy check; not used for [`HostSnapshot::txt_enabled`]
    #[must_use]
    pub fn legacy_txt_enabled(&self) -> bool {
        *self
            .legacy_txt_enabled
            .get_or_init(|| self.probe.legacy_txt_enabled())
    }

    #[must_use]
    pub fn cbnt_status(&self) -> FeatureStatus {
        *self.cbnt_status.get_or_init(|| self.probe.cbnt_status())
    }

    #[must_use]
    pub fn cbnt_profile(&self) -> &str {
        let status = self.cbnt_status();
        self.cbnt_profile.get_or_init(|| self.probe.cbnt_profile(status))
    }

    #[must_use]
    pub fn suefi_status(&self) -> FeatureStatus {
        *self.suefi_status.get_or_init(|| self.probe.suefi_status())
    }

    #[must_use]
    pub fn mktme_status(&self) -> FeatureStatus {
        *self.mktme_status.get_or_init(|| self.probe.mktme_status())
    }

    #[must_use]
    pub fn mktme_encryption_algorithm(&self) -> &str {
        let status = self.mktme_status();
        self.mktme_encryption_algorithm
            .get_or_init(|| self.probe.mktme_encryption_algorithm(status))
    }

    #[must_use]
    pub fn mktme_max_keys_per_cpu(&self) -> u32 {
        let status = self.mktme_status();
        *self
            .mktme_max_keys_per_cpu
            .get_or_init(|| self.probe.mktme_max_keys_per_cpu(status))
    }

    #[must_use]
    pub fn tboot_status(&self) -> ComponentStatus {
        *self.tboot_status.get_or_init(|| self.probe.tboot_status())
    }

    #[must_use]
    pub fn installed_components(&self) -> &BTreeSet<HostComponent> {
        self.installed_components
            .get_or_init(|| self.probe.installed_components())
    }

    #[must_use]
    pub fn is_container_environment(&self) -> bool {
        *self
            .container_environment
            .get_or_init(|| self.probe.is_container_environment())
    }

    /// Feature map: TPM and TXT always, the rest only when supported.
    ///
    /// # Errors
    /// When the TPM version, which TPM metadata carries, cannot be determined.
    pub fn hardware_features(
        &self,
    ) -> Result<BTreeMap<HardwareFeature, FeatureDetails>, PlatformInfoError> {
        let mut features = BTreeMap::new();
        features.insert(
            HardwareFeature::Tpm,
            FeatureDetails::new(self.tpm_enabled()).with_meta("tpm_version", self.tpm_version()?),
        );
        features.insert(
            HardwareFeature::Txt,
            FeatureDetails::new(self.txt_status().is_enabled()),
        );

        let suefi = self.suefi_status();
        if suefi.is_supported() {
            features.insert(HardwareFeature::Suefi, FeatureDetails::new(suefi.is_enabled()));
        }

        let mktme = self.mktme_status();
        if mktme.is_supported() {
            features.insert(
                HardwareFeature::Mktme,
                FeatureDetails::new(mktme.is_enabled())
                    .with_meta("encryption_algorithm", self.mktme_encryption_algorithm())
                    .with_meta(
                        "max_keys_per_cpu",
                        self.mktme_max_keys_per_cpu().to_string(),
                    ),
            );
        }

        let cbnt = self.cbnt_status();
        if cbnt.is_supported() {
            features.insert(
                HardwareFeature::Cbnt,
                FeatureDetails::new(cbnt.is_enabled()).with_meta("profile", self.cbnt_profile()),
            );
        }

        Ok(features)
    }

    /// Resolve every fact and assemble a snapshot.
    ///
    /// # Errors
    /// The first essential fact that could not be determined, attributed via
    /// [`PlatformInfoError::fact`].
    pub fn snapshot(&self) -> Result<HostSnapshot, PlatformInfoError> {
        let snapshot = HostSnapshot {
            bios_name: self.bios_name()?.to_owned(),
            bios_version: self.bios_version()?.to_owned(),
            os_name: self.os_name()?.to_owned(),
            os_version: self.os_version()?.to_owned(),
            vmm_name: self.vmm_name()?.to_owned(),
            vmm_version: self.vmm_version()?.to_owned(),
            processor_info: self.processor_info()?.to_owned(),
            processor_flags: self.processor_flags()?.to_vec(),
            hardware_uuid: self.hardware_uuid()?.to_owned(),
            host_name: self.host_name()?.to_owned(),
            number_of_sockets: self.number_of_sockets()?,
            tpm_version: self.tpm_version()?.to_owned(),
            tpm_enabled: self.tpm_enabled(),
            txt_enabled: self.txt_status() == FeatureStatus::Enabled,
            tboot_installed: self.tboot_status() == ComponentStatus::Installed,
            hardware_features: self.hardware_features()?,
            installed_components: self.installed_components().clone(),
        };
        tracing::info!(
            host_name = %snapshot.host_name,
            hardware_uuid = %snapshot.hardware_uuid,
            features = snapshot.hardware_features.len(),
            "Assembled host snapshot"
        );
        Ok(snapshot)
    }
}
