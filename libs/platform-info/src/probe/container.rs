use std::path::PathBuf;

use crate::executor::{CommandHook, CommandRunner, HookedRunner};

use super::LinuxProbe;

/// Linux probe that runs every tool against the host root mounted into a container
pub type ContainerProbe<R> = LinuxProbe<HookedRunner<R, ChrootHook>>;

/// Prefixes every invocation with `chroot <host_mount>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChrootHook {
    host_mount: String,
}

impl ChrootHook {
    #[must_use]
    pub fn new(host_mount: impl Into<String>) -> Self {
        Self {
            host_mount: host_mount.into(),
        }
    }

    #[must_use]
    pub fn host_mount(&self) -> &str {
        &self.host_mount
    }
}

impl CommandHook for ChrootHook {
    fn rewrite(&self, program: &str, args: &[&str]) -> Vec<String> {
        ["chroot", self.host_mount.as_str(), program]
            .into_iter()
            .chain(args.iter().copied())
            .map(str::to_owned)
            .collect()
    }
}

/// Linux extraction rules applied to the host filesystem at `host_mount`.
///
/// Commands are chrooted into the mount and filesystem checks are rooted there.
#[must_use]
pub fn container_probe<R: CommandRunner>(
    runner: R,
    host_mount: impl Into<String>,
) -> ContainerProbe<R> {
    let hook = ChrootHook::new(host_mount);
    tracing::debug!(host_mount = %hook.host_mount(), "Using chroot command hook");
    let fs_root = PathBuf::from(hook.host_mount());
    LinuxProbe::new(HookedRunner::new(runner, hook)).with_fs_root(fs_root)
}
