#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Platform Information Library
//!
//! Probes the host this code runs on for platform identity and security
//! capability facts by running OS-native utilities and parsing their output:
//! - BIOS, OS, CPU and hypervisor identity
//! - TPM presence and version
//! - TXT, CBNT, SUEFI and MKTME hardware security features
//! - tboot and trust agent component presence
//!
//! The library only detects presence and enablement; it never talks to a TPM
//! or to cryptographic hardware.

pub mod classify;
pub mod error;
pub mod executor;
pub mod model;
pub mod probe;
pub mod selector;

mod collector;

pub use collector::PlatformInfo;
pub use error::{ErrorCode, Fact, PlatformInfoError};
pub use executor::{CommandHook, CommandOutput, CommandRunner, HookedRunner, SystemCommandRunner};
pub use model::*;
pub use probe::{ChrootHook, ContainerProbe, HostProbe, LinuxProbe, WindowsProbe, container_probe};
pub use selector::{ProbeConfig, ProbeStrategy, select_probe, select_probe_with};
