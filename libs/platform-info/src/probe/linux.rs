use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::HostProbe;
use crate::classify;
use crate::error::PlatformInfoError;
use crate::executor::{CommandOutput, CommandRunner, command_line};
use crate::model::{ComponentStatus, FeatureStatus, HostComponent, VmmIdentity};

const TPM_DEVICE: &str = "/dev/tpm0";
const TPM_CAPS: [&str; 2] = [
    "/sys/class/misc/tpm0/device/caps",
    "/sys/class/tpm/tpm0/device/caps",
];
const TPM12_ENABLED: &str = "/sys/class/tpm/tpm0/device/enabled";
const TPM2_DESCRIPTION: [&str; 2] = [
    "/sys/class/tpm/tpm0/device/description",
    "/sys/class/tpm/tpm0/device/firmware_node/description",
];
const DOCKER_ENV_MARKER: &str = "/.dockerenv";

const CBNT_MSR: &str = "0x13A";
const TME_CAPABILITY_MSR: &str = "0x981";
const TME_ACTIVATE_MSR: &str = "0x982";

/// Linux strategy: `dmidecode`, `lsb_release`, `rdmsr` and friends.
///
/// BIOS, UUID and host name failures are surfaced. Everything else degrades to
/// its neutral value with a log line.
#[derive(Debug, Clone)]
pub struct LinuxProbe<R> {
    runner: R,
    fs_root: PathBuf,
}

impl<R: CommandRunner> LinuxProbe<R> {
    #[must_use]
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            fs_root: PathBuf::from("/"),
        }
    }

    /// Resolve sysfs and `/.dockerenv` checks under `root` instead of `/`
    #[must_use]
    pub fn with_fs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.fs_root = root.into();
        self
    }

    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    fn host_path(&self, path: &str) -> PathBuf {
        self.fs_root.join(path.trim_start_matches('/'))
    }

    fn host_path_exists(&self, path: &str) -> bool {
        self.host_path(path).exists()
    }

    /// Run a command whose output an essential fact depends on
    fn essential_stdout(&self, program: &str, args: &[&str]) -> Result<String, PlatformInfoError> {
        let command = command_line(program, args);
        debug!(command = %command, "Running essential fact command");
        let output = self.runner.execute(program, args)?;
        output.require_stdout(&command).map(str::to_owned)
    }

    /// Stdout of a command that ran and exited 0; anything else is logged and dropped
    fn optional_stdout(&self, program: &str, args: &[&str]) -> Option<String> {
        let command = command_line(program, args);
        match self.runner.execute(program, args) {
            Ok(CommandOutput {
                exit_code: 0,
                stdout: Some(stdout),
                ..
            }) => Some(stdout),
            Ok(output) => {
                debug!(
                    command = %command,
                    exit_code = output.exit_code,
                    stderr = %output.stderr_text().trim(),
                    "Command produced no usable output"
                );
                None
            }
            Err(e) => {
                debug!(command = %command, error = %e, "Command could not be run");
                None
            }
        }
    }

    /// Stdout of a command that launched, whatever its exit code
    fn launched_stdout(&self, program: &str, args: &[&str]) -> Option<String> {
        let command = command_line(program, args);
        match self.runner.execute(program, args) {
            Ok(output) => {
                if !output.success() {
                    debug!(
                        command = %command,
                        exit_code = output.exit_code,
                        stderr = %output.stderr_text().trim(),
                        "Command exited non-zero, classifying its output anyway"
                    );
                }
                output.stdout
            }
            Err(e) => {
                debug!(command = %command, error = %e, "Command could not be run");
                None
            }
        }
    }

    fn read_msr(&self, field: &str, msr: &str) -> Option<String> {
        self.optional_stdout("rdmsr", &["-f", field, msr])
    }

    fn virsh_identity(&self) -> VmmIdentity {
        match self.runner.execute("virsh", &["version"]) {
            Ok(output) if output.success() => classify::classify_virsh_output(output.stdout()),
            Ok(output) => {
                debug!(
                    exit_code = output.exit_code,
                    stderr = %output.stderr_text().trim(),
                    "virsh version failed, KVM might not be installed or virtualization is disabled"
                );
                VmmIdentity::unknown()
            }
            Err(e) => {
                debug!(error = %e, "Failed to run virsh version");
                VmmIdentity::unknown()
            }
        }
    }

    fn os_release(&self) -> (String, String) {
        match self.optional_stdout("lsb_release", &["-a"]) {
            Some(stdout) => {
                let (name, version) = classify::parse_lsb_release(&stdout);
                debug!(os_name = %name, os_version = %version, "Resolved OS release");
                (name, version)
            }
            None => {
                warn!("Unable to retrieve OS details from lsb_release");
                (String::new(), String::new())
            }
        }
    }

    fn component_installed(&self, component: HostComponent) -> bool {
        debug!(component = %component, "Checking component status");
        match self.runner.execute(component.as_str(), &["status"]) {
            Ok(output) => classify::component_reported_present(&output),
            Err(e) => {
                debug!(component = %component, error = %e, "Component status command failed");
                false
            }
        }
    }
}

impl<R: CommandRunner> HostProbe for LinuxProbe<R> {
    fn bios_name(&self) -> Result<String, PlatformInfoError> {
        let stdout = self.essential_stdout("dmidecode", &["-s", "bios-vendor"])?;
        let name = classify::first_meaningful_line(&stdout).to_owned();
        debug!(bios_name = %name, "Resolved BIOS name");
        Ok(name)
    }

    fn bios_version(&self) -> Result<String, PlatformInfoError> {
        let stdout = self.essential_stdout("dmidecode", &["-s", "bios-version"])?;
        let version = classify::first_meaningful_line(&stdout).to_owned();
        debug!(bios_version = %version, "Resolved BIOS version");
        Ok(version)
    }

    fn os_name(&self) -> Result<String, PlatformInfoError> {
        Ok(self.os_release().0)
    }

    fn os_version(&self) -> Result<String, PlatformInfoError> {
        Ok(self.os_release().1)
    }

    fn vmm(&self) -> Result<VmmIdentity, PlatformInfoError> {
        match self.runner.execute("docker", &["-v"]) {
            Ok(output) if output.success() => {
                if let Some(vmm) = output.stdout().and_then(classify::parse_docker_version) {
                    debug!(vmm_name = %vmm.name, vmm_version = %vmm.version, "Detected Docker");
                    return Ok(vmm);
                }
                debug!("docker -v output not recognised, checking for a hypervisor");
            }
            Ok(output) => {
                info!(
                    exit_code = output.exit_code,
                    "Docker might not be installed, checking for a hypervisor"
                );
            }
            Err(e) => debug!(error = %e, "Failed to run docker -v, checking for a hypervisor"),
        }

        let vmm = self.virsh_identity();
        debug!(vmm_name = %vmm.name, vmm_version = %vmm.version, "Resolved hypervisor");
        Ok(vmm)
    }

    fn processor_info(&self) -> Result<String, PlatformInfoError> {
        let Some(stdout) = self.optional_stdout("dmidecode", &["--type", "processor"]) else {
            warn!("Unable to retrieve processor information");
            return Ok(String::new());
        };
        Ok(classify::parse_processor_id(&stdout))
    }

    fn processor_flags(&self) -> Result<Vec<String>, PlatformInfoError> {
        let Some(stdout) = self.optional_stdout("cat", &["/proc/cpuinfo"]) else {
            warn!("Unable to retrieve processor flags");
            return Ok(Vec::new());
        };
        let flags = classify::parse_cpuinfo_flags(&stdout);
        debug!(count = flags.len(), "Resolved processor flags");
        Ok(flags)
    }

    fn hardware_uuid(&self) -> Result<String, PlatformInfoError> {
        let stdout = self.essential_stdout("dmidecode", &["-s", "system-uuid"])?;
        let uuid = classify::first_meaningful_line(&stdout).to_owned();
        debug!(hardware_uuid = %uuid, "Resolved hardware UUID");
        Ok(uuid)
    }

    fn tpm_version(&self) -> Result<String, PlatformInfoError> {
        let device = self.host_path_exists(TPM_DEVICE);
        let caps = TPM_CAPS.iter().any(|path| self.host_path_exists(path));
        let version = classify::classify_tpm_version(device, caps);
        debug!(tpm_version = version, "Resolved TPM version");
        Ok(version.to_owned())
    }

    fn tpm_enabled(&self) -> bool {
        let device = self.host_path_exists(TPM_DEVICE);
        let caps = TPM_CAPS.iter().any(|path| self.host_path_exists(path));
        let enabled = match classify::classify_tpm_version(device, caps) {
            "1.2" => self
                .optional_stdout("cat", &[TPM12_ENABLED])
                .is_some_and(|raw| classify::tpm12_enabled(&raw)),
            "2.0" => TPM2_DESCRIPTION
                .iter()
                .any(|path| self.host_path_exists(path)),
            _ => {
                debug!("No TPM device present");
                false
            }
        };
        debug!(tpm_enabled = enabled, "Resolved TPM status");
        enabled
    }

    fn host_name(&self) -> Result<String, PlatformInfoError> {
        let stdout = self.essential_stdout("hostname", &[])?;
        let host_name = classify::first_line(&stdout).to_owned();
        debug!(host_name = %host_name, "Resolved host name");
        Ok(host_name)
    }

    fn number_of_sockets(&self) -> Result<u32, PlatformInfoError> {
        let sockets = self
            .optional_stdout("lscpu", &[])
            .and_then(|stdout| classify::parse_socket_count(&stdout));
        Ok(sockets.unwrap_or_else(|| {
            warn!("Unable to retrieve the number of sockets");
            0
        }))
    }

    fn txt_status(&self) -> FeatureStatus {
        let Some(cpuid) = self.optional_stdout("cpuid", &["-1"]) else {
            return FeatureStatus::Unsupported;
        };
        let register = if classify::vmx_enabled(&cpuid) {
            self.optional_stdout("rdmsr", &["0x3a", "-f", "1:0"])
        } else {
            None
        };
        let status = classify::classify_txt(&cpuid, register.as_deref());
        debug!(txt_status = %status, "Resolved TXT status");
        status
    }

    fn cbnt_status(&self) -> FeatureStatus {
        let support = self.read_msr("32:32", CBNT_MSR);
        let supported = support.as_deref().and_then(classify::parse_msr_field) == Some(1);
        let (profile_bits, enable_bit) = if supported {
            (
                self.read_msr("7:4", CBNT_MSR),
                self.read_msr("0:0", CBNT_MSR),
            )
        } else {
            (None, None)
        };
        let status = classify::classify_cbnt(
            support.as_deref(),
            profile_bits.as_deref(),
            enable_bit.as_deref(),
        );
        debug!(cbnt_status = %status, "Resolved CBNT status");
        status
    }

    fn cbnt_profile(&self, status: FeatureStatus) -> String {
        let register = if status.is_enabled() {
            self.read_msr("7:0", CBNT_MSR)
        } else {
            None
        };
        classify::cbnt_profile(status, register.as_deref())
    }

    fn suefi_status(&self) -> FeatureStatus {
        let stdout = self.launched_stdout("bootctl", &["status"]);
        let status = classify::classify_suefi(stdout.as_deref());
        debug!(suefi_status = %status, "Resolved SUEFI status");
        status
    }

    fn mktme_status(&self) -> FeatureStatus {
        let capability = self.read_msr("0:0", TME_CAPABILITY_MSR);
        let supported = capability.as_deref().and_then(classify::parse_msr_field) == Some(1);
        let activate = if supported {
            self.read_msr("1:1", TME_ACTIVATE_MSR)
        } else {
            None
        };
        let status = classify::classify_mktme(capability.as_deref(), activate.as_deref());
        debug!(mktme_status = %status, "Resolved MKTME status");
        status
    }

    fn mktme_encryption_algorithm(&self, status: FeatureStatus) -> String {
        let register = if status.is_enabled() {
            self.read_msr("51:48", TME_ACTIVATE_MSR)
        } else {
            None
        };
        classify::mktme_algorithm(status, register.as_deref())
    }

    fn mktme_max_keys_per_cpu(&self, status: FeatureStatus) -> u32 {
        let register = if status.is_enabled() {
            self.read_msr("50:36", TME_CAPABILITY_MSR)
        } else {
            None
        };
        classify::mktme_max_keys(status, register.as_deref())
    }

    fn tboot_status(&self) -> ComponentStatus {
        let output = match self.runner.execute("txt-stat", &[]) {
            Ok(output) => Some(output),
            Err(e) => {
                debug!(error = %e, "Failed to run txt-stat");
                None
            }
        };
        let status = classify::classify_tboot(output.as_ref());
        debug!(tboot_status = %status, "Resolved tboot status");
        status
    }

    fn installed_components(&self) -> BTreeSet<HostComponent> {
        HostComponent::ALL
            .into_iter()
            .filter(|component| component.always_present() || self.component_installed(*component))
            .collect()
    }

    fn is_container_environment(&self) -> bool {
        self.host_path_exists(DOCKER_ENV_MARKER)
    }
}
