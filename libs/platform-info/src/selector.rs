//! Strategy selection from an explicit [`ProbeConfig`].

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::PlatformInfoError;
use crate::executor::{CommandRunner, SystemCommandRunner};
use crate::probe::{HostProbe, LinuxProbe, WindowsProbe, container_probe};

/// Container marker variable, `docker` inside a trust agent container
pub const CONTAINER_ENV_VAR: &str = "container";
/// Where the host root filesystem is mounted inside the container
pub const HOST_MOUNT_ENV_VAR: &str = "TRUSTAGENT_DOCKER_HOST_MOUNT";

const DOCKER_MARKER: &str = "docker";

/// Inputs that decide which probe strategy runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeConfig {
    /// Declared OS identifier, e.g. `linux` or `windows`
    pub os: String,
    /// Container marker; `docker` selects the chroot strategy
    pub container: Option<String>,
    /// Host root mount used as the chroot target
    pub host_mount_path: Option<String>,
    /// Root for filesystem checks (TPM sysfs, `/.dockerenv`); `/` on a host and
    /// the host mount inside a container when unset
    pub fs_root: Option<PathBuf>,
    /// CPU feature helper executable used on Windows
    pub cpuid_helper: Option<PathBuf>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_owned(),
            container: None,
            host_mount_path: None,
            fs_root: None,
            cpuid_helper: None,
        }
    }
}

impl ProbeConfig {
    /// Defaults plus the container variables of the current process
    #[must_use]
    pub fn from_environment() -> Self {
        Self {
            container: std::env::var(CONTAINER_ENV_VAR).ok(),
            host_mount_path: std::env::var(HOST_MOUNT_ENV_VAR).ok(),
            ..Self::default()
        }
    }

    fn host_mount(&self) -> Result<&str, PlatformInfoError> {
        self.host_mount_path
            .as_deref()
            .map(str::trim)
            .filter(|mount| !mount.is_empty())
            .ok_or_else(|| {
                PlatformInfoError::Configuration(format!(
                    "container marker is `{DOCKER_MARKER}` but no host mount path is set \
                     (${HOST_MOUNT_ENV_VAR})"
                ))
            })
    }
}

/// Probe strategy chosen for a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStrategy {
    Linux,
    LinuxContainer,
    Windows,
}

impl ProbeStrategy {
    /// Windows when the declared OS mentions it, the chroot strategy for a
    /// docker marker, plain Linux otherwise.
    ///
    /// # Errors
    /// `Configuration` when the docker marker is set without a host mount path.
    pub fn select(config: &ProbeConfig) -> Result<Self, PlatformInfoError> {
        if config.os.to_ascii_lowercase().contains("windows") {
            return Ok(Self::Windows);
        }
        let docker = config
            .container
            .as_deref()
            .is_some_and(|marker| marker.trim().eq_ignore_ascii_case(DOCKER_MARKER));
        if docker {
            config.host_mount()?;
            return Ok(Self::LinuxContainer);
        }
        Ok(Self::Linux)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::LinuxContainer => "linux_container",
            Self::Windows => "windows",
        }
    }
}

impl fmt::Display for ProbeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the probe for `config`, running real system commands
///
/// # Errors
/// See [`select_probe_with`].
pub fn select_probe(config: &ProbeConfig) -> Result<Box<dyn HostProbe>, PlatformInfoError> {
    select_probe_with(config, SystemCommandRunner)
}

/// Build the probe for `config` on top of `runner`
///
/// # Errors
/// `Configuration` when the configuration names no usable strategy.
pub fn select_probe_with<R>(
    config: &ProbeConfig,
    runner: R,
) -> Result<Box<dyn HostProbe>, PlatformInfoError>
where
    R: CommandRunner + 'static,
{
    let strategy = ProbeStrategy::select(config)?;
    tracing::info!(strategy = %strategy, os = %config.os, "Selected probe strategy");

    let probe: Box<dyn HostProbe> = match strategy {
        ProbeStrategy::Windows => {
            let probe = WindowsProbe::new(runner);
            match load_helper(config) {
                Some(image) => Box::new(probe.with_cpuid_helper(image)),
                None => Box::new(probe),
            }
        }
        ProbeStrategy::LinuxContainer => Box::new(with_configured_root(
            container_probe(runner, config.host_mount()?),
            config,
        )),
        ProbeStrategy::Linux => Box::new(with_configured_root(LinuxProbe::new(runner), config)),
    };
    Ok(probe)
}

fn with_configured_root<R: CommandRunner>(
    probe: LinuxProbe<R>,
    config: &ProbeConfig,
) -> LinuxProbe<R> {
    match &config.fs_root {
        Some(root) => probe.with_fs_root(root.clone()),
        None => probe,
    }
}

fn load_helper(config: &ProbeConfig) -> Option<Vec<u8>> {
    let path = config.cpuid_helper.as_ref()?;
    match std::fs::read(path) {
        Ok(image) => Some(image),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read CPU feature helper, processor flags will be unavailable"
            );
            None
        }
    }
}
