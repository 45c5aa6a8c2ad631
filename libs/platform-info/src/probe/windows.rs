use std::io::Write;
use std::path::Path;

use tempfile::TempPath;
use tracing::{debug, error};

use super::HostProbe;
use crate::classify::{self, WmicStrip};
use crate::error::PlatformInfoError;
use crate::executor::{CommandRunner, command_line};
use crate::model::VmmIdentity;

const TPM_QUERY: [&str; 5] = [
    r"/namespace:\\root\CIMV2\Security\MicrosoftTpm",
    "path",
    "Win32_Tpm",
    "get",
    "/value",
];

/// Windows strategy: every identity fact is a `wmic` query and a non-zero exit
/// from any of them fails the fact.
#[derive(Debug, Clone)]
pub struct WindowsProbe<R> {
    runner: R,
    cpuid_helper: Option<Vec<u8>>,
}

impl<R: CommandRunner> WindowsProbe<R> {
    #[must_use]
    pub const fn new(runner: R) -> Self {
        Self {
            runner,
            cpuid_helper: None,
        }
    }

    /// Executable image that prints the CPU feature flags
    #[must_use]
    pub fn with_cpuid_helper(mut self, image: impl Into<Vec<u8>>) -> Self {
        self.cpuid_helper = Some(image.into());
        self
    }

    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    fn wmic(&self, args: &[&str]) -> Result<String, PlatformInfoError> {
        let command = command_line("wmic", args);
        let output = self.runner.execute("wmic", args)?;
        if !output.success() {
            error!(
                command = %command,
                exit_code = output.exit_code,
                stderr = %output.stderr_text().trim(),
                "wmic query failed"
            );
            return Err(PlatformInfoError::CommandFailed {
                command,
                exit_code: output.exit_code,
                stderr: output.stderr_text().trim().to_owned(),
            });
        }
        debug!(
            command = %command,
            stdout = %output.stdout().unwrap_or_default(),
            "wmic query finished"
        );
        Ok(output.stdout.unwrap_or_else(|| {
            error!(command = %command, "wmic query gave no output");
            String::new()
        }))
    }

    fn wmic_value(&self, args: &[&str], strip: WmicStrip) -> Result<String, PlatformInfoError> {
        let stdout = self.wmic(args)?;
        Ok(classify::wmic_value(&stdout, strip).unwrap_or_else(|| {
            error!(command = %command_line("wmic", args), "wmic query returned no value row");
            String::new()
        }))
    }

    fn tpm_query(&self) -> Result<String, PlatformInfoError> {
        self.wmic(&TPM_QUERY)
    }

    /// Stdout of a tool that launched, regardless of its exit code
    fn launched_stdout(&self, program: &str, args: &[&str]) -> Option<String> {
        match self.runner.execute(program, args) {
            Ok(output) => output.stdout,
            Err(e) => {
                debug!(command = %command_line(program, args), error = %e, "Command could not be run");
                None
            }
        }
    }
}

impl<R: CommandRunner> HostProbe for WindowsProbe<R> {
    fn bios_name(&self) -> Result<String, PlatformInfoError> {
        self.wmic_value(&["bios", "get", "manufacturer"], WmicStrip::AllWhitespace)
    }

    fn bios_version(&self) -> Result<String, PlatformInfoError> {
        self.wmic_value(
            &["bios", "get", "smbiosbiosversion"],
            WmicStrip::AllWhitespace,
        )
    }

    fn os_name(&self) -> Result<String, PlatformInfoError> {
        self.wmic_value(&["os", "get", "caption"], WmicStrip::CarriageReturn)
    }

    fn os_version(&self) -> Result<String, PlatformInfoError> {
        self.wmic_value(&["os", "get", "version"], WmicStrip::AllWhitespace)
    }

    fn vmm(&self) -> Result<VmmIdentity, PlatformInfoError> {
        let features = self.wmic(&["path", "WIN32_ServerFeature", "get", "ID"])?;
        if !classify::wmic_has_server_feature(&features, classify::HYPER_V_FEATURE_ID) {
            debug!("Hyper-V server feature not present");
            return Ok(VmmIdentity::unknown());
        }

        let version = self.wmic_value(
            &[
                "datafile",
                "where",
                r"name='C:\\Windows\\System32\\vmms.exe'",
                "get",
                "version",
            ],
            WmicStrip::AllWhitespace,
        )?;
        debug!(vmm_version = %version, "Detected Hyper-V");
        Ok(VmmIdentity::new(classify::HYPER_V_NAME, version))
    }

    fn processor_info(&self) -> Result<String, PlatformInfoError> {
        self.wmic_value(&["cpu", "get", "ProcessorId"], WmicStrip::AllWhitespace)
    }

    fn processor_flags(&self) -> Result<Vec<String>, PlatformInfoError> {
        let image = self.cpuid_helper.as_deref().ok_or_else(|| {
            PlatformInfoError::HelperUnavailable("no CPU feature helper configured".to_owned())
        })?;
        let helper = HelperBinary::write(image)?;
        let output = self.runner.execute(helper.program()?, &[]);
        // Removes the temp file before the result is inspected.
        drop(helper);
        let output = output?;

        if !output.success() {
            error!(
                exit_code = output.exit_code,
                stderr = %output.stderr_text().trim(),
                "CPU feature helper failed"
            );
            return Err(PlatformInfoError::CommandFailed {
                command: "cpuid helper".to_owned(),
                exit_code: output.exit_code,
                stderr: output.stderr_text().trim().to_owned(),
            });
        }
        let flags = output
            .stdout()
            .map(classify::split_helper_flags)
            .unwrap_or_default();
        debug!(count = flags.len(), "Resolved processor flags");
        Ok(flags)
    }

    fn hardware_uuid(&self) -> Result<String, PlatformInfoError> {
        self.wmic_value(
            &["path", "Win32_ComputerSystemProduct", "get", "uuid"],
            WmicStrip::AllWhitespace,
        )
    }

    fn tpm_version(&self) -> Result<String, PlatformInfoError> {
        let stdout = self.tpm_query()?;
        Ok(classify::tpm_spec_version(&stdout).unwrap_or_else(|| {
            error!("TPM query does not report a SpecVersion");
            String::new()
        }))
    }

    fn tpm_enabled(&self) -> bool {
        match self.tpm_query() {
            Ok(stdout) => classify::tpm_enabled_initial_value(&stdout),
            Err(e) => {
                debug!(error = %e, "TPM enabled check failed");
                false
            }
        }
    }

    fn host_name(&self) -> Result<String, PlatformInfoError> {
        self.wmic_value(
            &["computersystem", "get", "Name"],
            WmicStrip::AllWhitespace,
        )
    }

    fn number_of_sockets(&self) -> Result<u32, PlatformInfoError> {
        let args = ["cpu", "get", "SocketDesignation"];
        let stdout = self.wmic(&args)?;
        let Some(sockets) = classify::count_socket_rows(&stdout) else {
            return Err(PlatformInfoError::Parse {
                command: command_line("wmic", &args),
                detail: "output has no SocketDesignation header".to_owned(),
            });
        };
        if sockets == 0 {
            error!("wmic cpu get SocketDesignation does not report sockets");
        }
        Ok(sockets)
    }

    fn legacy_txt_enabled(&self) -> bool {
        let Some(coreinfo) = self.launched_stdout("coreinfo", &["/accepteula"]) else {
            error!("Unable to run coreinfo for the TXT check");
            return false;
        };
        if !classify::coreinfo_reports_txt(&coreinfo) {
            debug!("coreinfo does not report TXT support");
            return false;
        }
        let enabled = self
            .launched_stdout("systeminfo", &[])
            .is_some_and(|stdout| classify::systeminfo_reports_virtualization(&stdout));
        debug!(txt_enabled = enabled, "Resolved legacy TXT status");
        enabled
    }
}

/// CPU feature helper written out to a temporary executable.
///
/// The file lives as long as this value and is removed on drop, including
/// when the helper run fails.
#[derive(Debug)]
struct HelperBinary {
    path: TempPath,
}

impl HelperBinary {
    fn write(image: &[u8]) -> Result<Self, PlatformInfoError> {
        let mut file = tempfile::Builder::new()
            .prefix("cpuid_helper")
            .suffix(".exe")
            .tempfile()?;
        file.write_all(image)?;
        file.flush()?;
        let path = file.into_temp_path();
        make_executable(&path)?;
        debug!(path = %path.display(), "Wrote CPU feature helper");
        Ok(Self { path })
    }

    fn program(&self) -> Result<&str, PlatformInfoError> {
        self.path.to_str().ok_or_else(|| {
            PlatformInfoError::HelperUnavailable(format!(
                "temporary path {} is not valid UTF-8",
                self.path.display()
            ))
        })
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), PlatformInfoError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn make_executable(_path: &Path) -> Result<(), PlatformInfoError> {
    Ok(())
}
