//! Text-to-status classifiers.
//!
//! Every function here is pure: it takes output already fetched by a probe and
//! maps it to a typed value. Nothing in this module spawns processes or touches
//! the filesystem, and no function returns an error; unrecognised input maps to
//! the neutral value of the fact.

use crate::executor::CommandOutput;
use crate::model::{BootGuardProfile, ComponentStatus, FeatureStatus, VmmIdentity};

pub const NO_VMM_NAME: &str = "Host_No_VMM";
/// Reported when `virsh` itself is missing. Casing differs from [`NO_VMM_NAME`] and consumers match on both.
pub const NO_VMM_NAME_VIRSH_MISSING: &str = "Host_No_Vmm";
pub const NO_VMM_VERSION: &str = "0.0";
pub const VIRSH_NOT_INSTALLED_PREFIX: &str = "The program 'virsh' is currently not installed";

pub const HYPER_V_NAME: &str = "Microsoft Windows Hyper-V";
pub const HYPER_V_FEATURE_ID: &str = "20";

pub const MKTME_AES_XTS_128: &str = "AES-XTS-128";

const VMX_KEY: &str = "VMX: virtual machine extensions";
const TXT_ENABLED_REGISTER: &str = "3";

// ---------------------------------------------------------------------------
// Linux identity facts
// ---------------------------------------------------------------------------

/// First trimmed line that is not a `#` comment, as printed by `dmidecode -s`
#[must_use]
pub fn first_meaningful_line(stdout: &str) -> &str {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.starts_with('#'))
        .unwrap_or_default()
}

#[must_use]
pub fn first_line(stdout: &str) -> &str {
    stdout.lines().next().map(str::trim).unwrap_or_default()
}

fn key_value(line: &str, separator: char) -> Option<(&str, &str)> {
    line.split_once(separator)
        .map(|(key, value)| (key.trim(), value.trim()))
}

/// `(Distributor ID, Release)` from `lsb_release -a`; missing keys stay empty
#[must_use]
pub fn parse_lsb_release(stdout: &str) -> (String, String) {
    let mut name = "";
    let mut version = "";
    for (key, value) in stdout.lines().filter_map(|line| key_value(line, ':')) {
        if key.eq_ignore_ascii_case("Distributor ID") {
            name = value;
        } else if key.eq_ignore_ascii_case("Release") {
            version = value;
        }
    }
    (name.to_owned(), version.to_owned())
}

/// CPU ID from the first `ID:` entry of `dmidecode --type processor`
#[must_use]
pub fn parse_processor_id(stdout: &str) -> String {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("ID:"))
        .find_map(|line| key_value(line, ':'))
        .map(|(_, value)| value.to_owned())
        .unwrap_or_default()
}

/// Flag list from the first `flags` entry of `/proc/cpuinfo`
#[must_use]
pub fn parse_cpuinfo_flags(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| key_value(line, ':'))
        .find(|(key, _)| key.eq_ignore_ascii_case("flags"))
        .map(|(_, value)| value.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}

/// `Socket(s):` from `lscpu`. `None` when the line is absent or not a number.
#[must_use]
pub fn parse_socket_count(stdout: &str) -> Option<u32> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("Socket(s):"))
        .find_map(|line| key_value(line, ':'))
        .and_then(|(_, value)| value.parse().ok())
}

// ---------------------------------------------------------------------------
// Hypervisor
// ---------------------------------------------------------------------------

/// Name and version from `docker -v`, e.g. `Docker version 1.9.1, build a34a1d5`
#[must_use]
pub fn parse_docker_version(stdout: &str) -> Option<VmmIdentity> {
    let first = stdout.lines().next()?;
    if !first.starts_with("Docker") {
        return None;
    }
    let tokens: Vec<&str> = first.split_whitespace().collect();
    let (name, version) = (*tokens.first()?, *tokens.get(2)?);
    Some(VmmIdentity::new(
        name,
        version.strip_suffix(',').unwrap_or(version),
    ))
}

/// Hypervisor from the stdout of a successful `virsh version`
#[must_use]
pub fn classify_virsh_output(stdout: Option<&str>) -> VmmIdentity {
    let Some(stdout) = stdout.filter(|s| !s.is_empty()) else {
        return VmmIdentity::new(NO_VMM_NAME, NO_VMM_VERSION);
    };

    if stdout
        .lines()
        .next()
        .is_some_and(|line| line.starts_with(VIRSH_NOT_INSTALLED_PREFIX))
    {
        return VmmIdentity::new(NO_VMM_NAME_VIRSH_MISSING, NO_VMM_VERSION);
    }

    stdout
        .lines()
        .filter_map(|line| key_value(line, ':'))
        .find(|(key, _)| key.eq_ignore_ascii_case("Running hypervisor"))
        .map(|(_, value)| {
            let mut tokens = value.split_whitespace();
            VmmIdentity::new(
                tokens.next().unwrap_or_default(),
                tokens.next().unwrap_or_default(),
            )
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Security features
// ---------------------------------------------------------------------------

/// `cpuid -1` reports `VMX: virtual machine extensions = true`
#[must_use]
pub fn vmx_enabled(cpuid_stdout: &str) -> bool {
    cpuid_stdout
        .lines()
        .filter_map(|line| key_value(line, '='))
        .any(|(key, value)| key == VMX_KEY && value == "true")
}

/// TXT status from `cpuid -1` and the `rdmsr 0x3a -f 1:0` read.
///
/// Without the VMX marker the register is irrelevant and TXT is unsupported.
#[must_use]
pub fn classify_txt(cpuid_stdout: &str, register: Option<&str>) -> FeatureStatus {
    if !vmx_enabled(cpuid_stdout) {
        return FeatureStatus::Unsupported;
    }
    match register {
        Some(value) if value.trim() == TXT_ENABLED_REGISTER => FeatureStatus::Enabled,
        Some(_) => FeatureStatus::Disabled,
        None => FeatureStatus::Unsupported,
    }
}

/// Parse an `rdmsr -f` field, printed in hex by default
#[must_use]
pub fn parse_msr_field(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    u64::from_str_radix(digits, 16).ok()
}

/// CBNT status from MSR 0x13A: support bit 32, profile bits 7:4 and enable bit 0.
///
/// Boot Guard profile 0 (all of 7:4 and bit 0 clear) means disabled. Reads that
/// failed are passed as `None` and make the feature unsupported.
#[must_use]
pub fn classify_cbnt(
    support: Option<&str>,
    profile_bits: Option<&str>,
    enable_bit: Option<&str>,
) -> FeatureStatus {
    if support.and_then(parse_msr_field) != Some(1) {
        return FeatureStatus::Unsupported;
    }
    match (
        profile_bits.and_then(parse_msr_field),
        enable_bit.and_then(parse_msr_field),
    ) {
        (Some(0), Some(0)) => FeatureStatus::Disabled,
        (Some(_), Some(_)) => FeatureStatus::Enabled,
        _ => FeatureStatus::Unsupported,
    }
}

/// Boot Guard profile name, only for an enabled CBNT
#[must_use]
pub fn cbnt_profile(status: FeatureStatus, register: Option<&str>) -> String {
    if !status.is_enabled() {
        return String::new();
    }
    register
        .and_then(BootGuardProfile::from_register)
        .map(|profile| profile.name().to_owned())
        .unwrap_or_default()
}

/// Secure Boot state from `bootctl status`
#[must_use]
pub fn classify_suefi(stdout: Option<&str>) -> FeatureStatus {
    match stdout {
        Some(out) if out.contains("Secure Boot: enabled") => FeatureStatus::Enabled,
        Some(out) if out.contains("Secure Boot: disabled") => FeatureStatus::Disabled,
        _ => FeatureStatus::Unsupported,
    }
}

/// MKTME status from the TME capability bit (0x981 bit 0) and activate bit (0x982 bit 1)
#[must_use]
pub fn classify_mktme(capability: Option<&str>, activate: Option<&str>) -> FeatureStatus {
    if capability.and_then(parse_msr_field) != Some(1) {
        return FeatureStatus::Unsupported;
    }
    match activate.and_then(parse_msr_field) {
        Some(1) => FeatureStatus::Enabled,
        Some(_) => FeatureStatus::Disabled,
        None => FeatureStatus::Unsupported,
    }
}

/// Encryption algorithm from 0x982 bits 51:48, only for an enabled MKTME
#[must_use]
pub fn mktme_algorithm(status: FeatureStatus, register: Option<&str>) -> String {
    let aes_xts_128 = register
        .and_then(parse_msr_field)
        .is_some_and(|bits| bits & 1 == 1);
    if status.is_enabled() && aes_xts_128 {
        MKTME_AES_XTS_128.to_owned()
    } else {
        String::new()
    }
}

/// Maximum keys per CPU from 0x981 bits 50:36, only for an enabled MKTME
#[must_use]
pub fn mktme_max_keys(status: FeatureStatus, register: Option<&str>) -> u32 {
    if !status.is_enabled() {
        return 0;
    }
    register
        .and_then(parse_msr_field)
        .and_then(|keys| u32::try_from(keys).ok())
        .unwrap_or_default()
}

/// Tboot is installed when `txt-stat` ran and produced output
#[must_use]
pub fn classify_tboot(output: Option<&CommandOutput>) -> ComponentStatus {
    match output {
        Some(out) if out.success() && out.stdout.is_some() => ComponentStatus::Installed,
        _ => ComponentStatus::NotInstalled,
    }
}

/// Whether `<component> status` shows the component as present.
///
/// Output is rejected only when it mentions both "No such file or directory"
/// and "command not found". Deployed consumers rely on this permissive check,
/// so a shell message carrying just one of them still counts as present.
#[must_use]
pub fn component_reported_present(output: &CommandOutput) -> bool {
    if !output.success() {
        return false;
    }
    output.stdout().is_some_and(|stdout| {
        let stdout = stdout.trim();
        !(stdout.contains("No such file or directory") && stdout.contains("command not found"))
    })
}

/// TPM version from sysfs presence checks: `"0"` (absent), `"1.2"` or `"2.0"`
#[must_use]
pub const fn classify_tpm_version(device_present: bool, caps_present: bool) -> &'static str {
    match (device_present, caps_present) {
        (false, _) => "0",
        (true, true) => "1.2",
        (true, false) => "2.0",
    }
}

/// TPM 1.2 `enabled` sysfs attribute reads `1`
#[must_use]
pub fn tpm12_enabled(raw: &str) -> bool {
    raw.trim() == "1"
}

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

/// How the value line of a `wmic` table is cleaned up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WmicStrip {
    /// Remove every whitespace character
    AllWhitespace,
    /// Remove carriage returns and trim; keeps inner spaces such as in the OS caption
    CarriageReturn,
}

/// Value at line index 1 of a header-plus-values `wmic` table.
/// `None` when the output has fewer than two lines.
#[must_use]
pub fn wmic_value(stdout: &str, strip: WmicStrip) -> Option<String> {
    let line = stdout.split('\n').nth(1)?;
    Some(match strip {
        WmicStrip::AllWhitespace => line.chars().filter(|c| !c.is_whitespace()).collect(),
        WmicStrip::CarriageReturn => line.replace('\r', "").trim().to_owned(),
    })
}

/// `wmic path WIN32_ServerFeature get ID` lists `id`
#[must_use]
pub fn wmic_has_server_feature(stdout: &str, id: &str) -> bool {
    stdout
        .split('\n')
        .any(|line| line.chars().filter(|c| !c.is_whitespace()).eq(id.chars()))
}

/// Value for `key` in `wmic ... get /value` output (`Key=Value` lines)
#[must_use]
pub fn wmic_property<'a>(stdout: &'a str, key: &str) -> Option<&'a str> {
    if stdout.split('\n').count() < 2 {
        return None;
    }
    stdout
        .split('\n')
        .filter_map(|line| key_value(line, '='))
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, value)| value)
}

/// `SpecVersion=1.2, 2, 3` yields `1.2`
#[must_use]
pub fn tpm_spec_version(stdout: &str) -> Option<String> {
    wmic_property(stdout, "SpecVersion")
        .and_then(|value| value.split(',').next())
        .map(|version| version.trim().to_owned())
}

#[must_use]
pub fn tpm_enabled_initial_value(stdout: &str) -> bool {
    wmic_property(stdout, "IsEnabled_InitialValue").is_some_and(|value| value == "TRUE")
}

/// Number of rows under a `SocketDesignation` header, `None` when the header is missing
#[must_use]
pub fn count_socket_rows(stdout: &str) -> Option<u32> {
    let mut rows = stdout.trim().split('\n');
    let header: String = rows
        .next()?
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .collect();
    if !header.contains("SocketDesignation") {
        return None;
    }
    u32::try_from(rows.count()).ok()
}

/// Space-separated flags printed by the CPU feature helper
#[must_use]
pub fn split_helper_flags(stdout: &str) -> Vec<String> {
    stdout.split_whitespace().map(str::to_owned).collect()
}

#[must_use]
pub fn coreinfo_reports_txt(stdout: &str) -> bool {
    stdout.contains("Supports Intel trusted execution")
        && stdout.contains("Supports Intel hardware-assisted virtualization")
}

#[must_use]
pub fn systeminfo_reports_virtualization(stdout: &str) -> bool {
    stdout.contains("Virtualization Enabled In Firmware: Yes")
        || stdout.contains("A hypervisor has been detected")
}
