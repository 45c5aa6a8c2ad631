#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use platform_info::executor::command_line;
use platform_info::{CommandOutput, CommandRunner, PlatformInfoError};

pub const LINUX_FLAGS: &str = "fpu vme de pse tsc msr pae mce cx8 apic sep mtrr pge mca cmov pat \
    pse36 clflush dts mmx fxsr sse sse2 ss syscall nx rdtscp lm constant_tsc arch_perfmon pebs bts \
    nopl xtopology tsc_reliable nonstop_tsc aperfmperf pni ssse3 cx16 sse4_1 sse4_2 x2apic popcnt \
    tsc_deadline_timer hypervisor lahf_lm ida arat epb dtherm tsc_adjust";

pub const TPM_QUERY: &str = r"wmic /namespace:\\root\CIMV2\Security\MicrosoftTpm path Win32_Tpm get /value";
pub const VMMS_QUERY: &str = r"wmic datafile where name='C:\\Windows\\System32\\vmms.exe' get version";
pub const SERVER_FEATURES: &str = "wmic path WIN32_ServerFeature get ID";

#[derive(Clone)]
enum Scripted {
    Output(CommandOutput),
    LaunchFailure,
}

#[derive(Default)]
struct Script {
    exact: HashMap<String, Scripted>,
    program_contains: Vec<(String, Scripted)>,
    calls: Vec<String>,
}

/// Command runner answering from captured fixtures.
///
/// Clones share the script and the call log, so a test can keep one handle
/// while the probe owns another. Commands without a scripted answer exit 1
/// with `Unmockable command` on stderr.
#[derive(Clone, Default)]
pub struct FixtureRunner {
    script: Rc<RefCell<Script>>,
}

impl FixtureRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ubuntu 16.04 host on a QEMU hypervisor with TXT and tboot enabled
    #[must_use]
    pub fn linux() -> Self {
        Self::new()
            .with_stdout("lsb_release -a", include_str!("fixtures/linux/lsb_release"))
            .with_stdout(
                "dmidecode -s bios-vendor",
                include_str!("fixtures/linux/dmidecode.bios-vendor"),
            )
            .with_stdout(
                "dmidecode -s bios-version",
                include_str!("fixtures/linux/dmidecode.bios-version"),
            )
            .with_exit("docker -v", 1, "")
            .with_stdout("virsh version", include_str!("fixtures/linux/virsh.version"))
            .with_stdout(
                "dmidecode --type processor",
                include_str!("fixtures/linux/dmidecode.processor"),
            )
            .with_stdout(
                "dmidecode -s system-uuid",
                include_str!("fixtures/linux/dmidecode.system-uuid"),
            )
            .with_stdout("txt-stat", include_str!("fixtures/linux/txt-stat"))
            .with_stdout("lscpu", include_str!("fixtures/linux/lscpu"))
            .with_stdout("hostname", include_str!("fixtures/linux/host-name"))
            .with_stdout("cat /proc/cpuinfo", include_str!("fixtures/linux/proc-cpuinfo"))
            .with_stdout("cpuid -1", include_str!("fixtures/linux/cpuid"))
            .with_stdout(
                "rdmsr 0x3a -f 1:0",
                include_str!("fixtures/linux/rdmsr.txt-control"),
            )
            .with_stdout("bootctl status", include_str!("fixtures/linux/bootctl.status"))
    }

    /// Windows 10 host with the Hyper-V server feature and a TPM 2.0
    #[must_use]
    pub fn windows() -> Self {
        Self::new()
            .with_stdout("wmic os get caption", include_str!("fixtures/windows/os-name"))
            .with_stdout("wmic os get version", include_str!("fixtures/windows/os-version"))
            .with_stdout(
                "wmic bios get manufacturer",
                include_str!("fixtures/windows/bios-name"),
            )
            .with_stdout(
                "wmic bios get smbiosbiosversion",
                include_str!("fixtures/windows/bios-version"),
            )
            .with_stdout(SERVER_FEATURES, include_str!("fixtures/windows/server-features"))
            .with_stdout(VMMS_QUERY, include_str!("fixtures/windows/vmm-version"))
            .with_stdout(
                "wmic cpu get ProcessorId",
                include_str!("fixtures/windows/processor-info"),
            )
            .with_stdout(
                "wmic path Win32_ComputerSystemProduct get uuid",
                include_str!("fixtures/windows/hardware-uuid"),
            )
            .with_stdout(TPM_QUERY, include_str!("fixtures/windows/tpm"))
            .with_stdout(
                "wmic computersystem get Name",
                include_str!("fixtures/windows/host-name"),
            )
            .with_stdout(
                "wmic cpu get SocketDesignation",
                include_str!("fixtures/windows/no-of-sockets"),
            )
            .with_stdout("coreinfo /accepteula", include_str!("fixtures/windows/coreinfo"))
            .with_stdout("systeminfo", include_str!("fixtures/windows/systeminfo"))
    }

    #[must_use]
    pub fn with_output(self, command: &str, output: CommandOutput) -> Self {
        self.script
            .borrow_mut()
            .exact
            .insert(command.to_owned(), Scripted::Output(output));
        self
    }

    #[must_use]
    pub fn with_stdout(self, command: &str, stdout: &str) -> Self {
        self.with_output(
            command,
            CommandOutput::new(0, Some(stdout.to_owned()), Some(String::new())),
        )
    }

    #[must_use]
    pub fn with_exit(self, command: &str, exit_code: i32, stderr: &str) -> Self {
        self.with_output(
            command,
            CommandOutput::new(exit_code, Some(String::new()), Some(stderr.to_owned())),
        )
    }

    /// Exit 0 without any stdout stream
    #[must_use]
    pub fn with_null_stdout(self, command: &str) -> Self {
        self.with_output(command, CommandOutput::new(0, None, None))
    }

    #[must_use]
    pub fn with_launch_failure(self, command: &str) -> Self {
        self.script
            .borrow_mut()
            .exact
            .insert(command.to_owned(), Scripted::LaunchFailure);
        self
    }

    /// Answer any program whose path contains `needle`
    #[must_use]
    pub fn with_program_containing(self, needle: &str, output: CommandOutput) -> Self {
        self.script
            .borrow_mut()
            .program_contains
            .push((needle.to_owned(), Scripted::Output(output)));
        self
    }

    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.script.borrow().calls.clone()
    }

    #[must_use]
    pub fn call_count(&self, command: &str) -> usize {
        self.script
            .borrow()
            .calls
            .iter()
            .filter(|call| *call == command)
            .count()
    }
}

impl CommandRunner for FixtureRunner {
    fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput, PlatformInfoError> {
        let command = command_line(program, args);
        let mut script = self.script.borrow_mut();
        script.calls.push(command.clone());

        let scripted = script.exact.get(&command).cloned().or_else(|| {
            script
                .program_contains
                .iter()
                .find(|(needle, _)| program.contains(needle.as_str()))
                .map(|(_, scripted)| scripted.clone())
        });

        match scripted {
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::LaunchFailure) => Err(PlatformInfoError::Launch {
                command,
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
            None => Ok(CommandOutput::new(
                1,
                Some(String::new()),
                Some("Unmockable command".to_owned()),
            )),
        }
    }
}
