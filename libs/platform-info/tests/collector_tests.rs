#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Caching behaviour of `PlatformInfo` observed through the command log.

mod common;

use common::FixtureRunner;
use platform_info::{Fact, HostComponent, LinuxProbe, PlatformInfo, WindowsProbe};

fn linux_info(runner: &FixtureRunner, root: &tempfile::TempDir) -> PlatformInfo {
    PlatformInfo::new(LinuxProbe::new(runner.clone()).with_fs_root(root.path()))
}

#[test]
fn test_repeated_reads_do_not_rerun_commands() {
    let runner = FixtureRunner::linux();
    let root = tempfile::tempdir().unwrap();
    let info = linux_info(&runner, &root);

    let first = info.bios_name().unwrap().to_owned();
    let calls_after_first = runner.calls().len();
    for _ in 0..3 {
        assert_eq!(info.bios_name().unwrap(), first);
    }

    assert_eq!(runner.calls().len(), calls_after_first);
    assert_eq!(runner.call_count("dmidecode -s bios-vendor"), 1);
}

#[test]
fn test_second_snapshot_is_served_from_cache() {
    let runner = FixtureRunner::linux();
    let root = tempfile::tempdir().unwrap();
    let info = linux_info(&runner, &root);

    let first = info.snapshot().unwrap();
    let calls = runner.calls().len();
    let second = info.snapshot().unwrap();

    assert_eq!(first, second);
    assert_eq!(runner.calls().len(), calls);
}

#[test]
fn test_vmm_name_and_version_share_one_lookup() {
    let runner = FixtureRunner::linux();
    let root = tempfile::tempdir().unwrap();
    let info = linux_info(&runner, &root);

    assert_eq!(info.vmm_name().unwrap(), "QEMU");
    assert_eq!(info.vmm_version().unwrap(), "2.5.0");

    assert_eq!(runner.call_count("docker -v"), 1);
    assert_eq!(runner.call_count("virsh version"), 1);
}

#[test]
fn test_os_name_and_version_are_cached_separately() {
    let runner = FixtureRunner::linux();
    let root = tempfile::tempdir().unwrap();
    let info = linux_info(&runner, &root);

    assert_eq!(info.os_name().unwrap(), "Ubuntu");
    assert_eq!(info.os_name().unwrap(), "Ubuntu");
    assert_eq!(info.os_version().unwrap(), "16.04");
    assert_eq!(info.os_version().unwrap(), "16.04");

    assert_eq!(runner.call_count("lsb_release -a"), 2);
}

#[test]
fn test_empty_value_is_a_cached_value() {
    let runner = FixtureRunner::linux().with_stdout("dmidecode --type processor", "");
    let root = tempfile::tempdir().unwrap();
    let info = linux_info(&runner, &root);

    assert_eq!(info.processor_info().unwrap(), "");
    assert_eq!(info.processor_info().unwrap(), "");

    assert_eq!(runner.call_count("dmidecode --type processor"), 1);
}

#[test]
fn test_feature_statuses_are_cached() {
    let runner = FixtureRunner::linux();
    let root = tempfile::tempdir().unwrap();
    let info = linux_info(&runner, &root);

    let _ = info.hardware_features().unwrap();
    let _ = info.hardware_features().unwrap();
    assert!(info.txt_status().is_enabled());

    assert_eq!(runner.call_count("cpuid -1"), 1);
    assert_eq!(runner.call_count("bootctl status"), 1);
    assert_eq!(runner.call_count("rdmsr -f 0:0 0x981"), 1);
    assert_eq!(runner.call_count("rdmsr -f 32:32 0x13A"), 1);
}

#[test]
fn test_components_are_probed_once() {
    let runner = FixtureRunner::linux().with_stdout("wlagent status", "running\n");
    let root = tempfile::tempdir().unwrap();
    let info = linux_info(&runner, &root);

    assert!(
        info.installed_components()
            .contains(&HostComponent::WorkloadAgent)
    );
    assert_eq!(info.installed_components().len(), 2);

    assert_eq!(runner.call_count("wlagent status"), 1);
}

#[test]
fn test_failed_fact_is_retried() {
    let runner = FixtureRunner::windows().with_exit("wmic computersystem get Name", 1, "busy");
    let info = PlatformInfo::new(WindowsProbe::new(runner.clone()));

    let err = info.host_name().unwrap_err();
    assert_eq!(err.fact(), Some(Fact::HostName));

    let runner = runner.with_stdout(
        "wmic computersystem get Name",
        include_str!("fixtures/windows/host-name"),
    );
    assert_eq!(info.host_name().unwrap(), "WIN-GLU9NEPGT1L");
    assert_eq!(info.host_name().unwrap(), "WIN-GLU9NEPGT1L");

    assert_eq!(runner.call_count("wmic computersystem get Name"), 2);
}

#[test]
fn test_snapshot_serializes_feature_keys_uppercase() {
    let runner = FixtureRunner::linux();
    let root = tempfile::tempdir().unwrap();
    let info = linux_info(&runner, &root);

    let json = serde_json::to_value(info.snapshot().unwrap()).unwrap();

    assert_eq!(json["bios_name"], "Intel Corp.");
    assert_eq!(json["number_of_sockets"], 2);
    assert_eq!(json["hardware_features"]["TPM"]["meta"]["tpm_version"], "0");
    assert_eq!(json["hardware_features"]["TXT"]["enabled"], true);
    assert_eq!(json["installed_components"], serde_json::json!(["tagent"]));
}
