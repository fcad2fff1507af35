//! Everything we need from the machine we're running on: block device enumeration, mounting,
//! running commands and looking up NIC addresses.
//!
//! [`Host`] is the seam between the scanning logic and the real system. [`LiveHost`] talks to
//! the kernel; tests use a fake that materializes fixture trees on "mount".
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Command,
};

use color_eyre::Result;
use itertools::Itertools;
use thiserror::Error;

use crate::disks::is_virtual;

#[cfg(test)]
pub mod fake;

#[derive(Error, Debug)]
pub enum MountError {
    #[error("cannot mount {device:?} at {target:?}: {source}")]
    Mount {
        device: PathBuf,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot unmount {target:?}: {source}")]
    Unmount {
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountOptions<'a> {
    pub read_only: bool,
    /// Filesystem type; probed by the kernel when unset.
    pub fstype: Option<&'a str>,
}

impl MountOptions<'_> {
    #[must_use]
    pub const fn read_only() -> Self {
        Self {
            read_only: true,
            fstype: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `-1` when killed by a signal.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.status == 0
    }
}

pub trait Host {
    /// Whole disks, sorted by device path.
    ///
    /// # Errors
    /// The block device list can't be read.
    fn disks(&self) -> Result<Vec<PathBuf>>;

    /// Partitions on every disk, sorted by device path.
    ///
    /// # Errors
    /// The block device list can't be read.
    fn partitions(&self) -> Result<Vec<PathBuf>>;

    /// # Errors
    /// [`MountError::Mount`] when the device cannot be mounted. This is expected for blank or
    /// foreign devices.
    fn mount(&self, device: &Path, target: &Path, opts: &MountOptions<'_>)
        -> Result<(), MountError>;

    /// # Errors
    /// [`MountError::Unmount`] when the target is busy or not mounted.
    fn umount(&self, target: &Path, force: bool) -> Result<(), MountError>;

    fn is_mounted(&self, target: &Path) -> bool;

    /// # Errors
    /// The program cannot be spawned.
    fn run(&self, program: &str, args: &[&OsStr]) -> std::io::Result<CommandOutput>;

    /// Hardware address of a network interface on the running system.
    fn hwaddr(&self, interface: &str) -> Option<String>;
}

/// The machine we're booted on.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveHost;

impl LiveHost {
    fn block_devices(filter: fn(&lsblk::BlockDevice) -> bool) -> Result<Vec<PathBuf>> {
        let devices = lsblk::BlockDevice::list()?;
        tracing::trace!(?devices, "Found block devices");
        Ok(devices
            .into_iter()
            .filter(filter)
            .map(|dev| dev.fullname)
            .filter(|path| !is_virtual(path))
            .sorted()
            .collect())
    }
}

impl Host for LiveHost {
    fn disks(&self) -> Result<Vec<PathBuf>> {
        Self::block_devices(lsblk::BlockDevice::is_disk)
    }

    fn partitions(&self) -> Result<Vec<PathBuf>> {
        Self::block_devices(lsblk::BlockDevice::is_part)
    }

    #[tracing::instrument(skip(self))]
    fn mount(
        &self,
        device: &Path,
        target: &Path,
        opts: &MountOptions<'_>,
    ) -> Result<(), MountError> {
        let mut builder = sys_mount::Mount::builder();
        if opts.read_only {
            builder = builder.flags(sys_mount::MountFlags::RDONLY);
        }
        if let Some(fstype) = opts.fstype {
            builder = builder.fstype(fstype);
        }
        builder
            .mount(device, target)
            .map(|_| tracing::debug!("Mounted"))
            .map_err(|source| MountError::Mount {
                device: device.to_owned(),
                target: target.to_owned(),
                source,
            })
    }

    #[tracing::instrument(skip(self))]
    fn umount(&self, target: &Path, force: bool) -> Result<(), MountError> {
        let flags = if force {
            nix::mount::MntFlags::MNT_FORCE
        } else {
            nix::mount::MntFlags::empty()
        };
        nix::mount::umount2(target, flags).map_err(|errno| MountError::Unmount {
            target: target.to_owned(),
            source: errno.into(),
        })
    }

    fn is_mounted(&self, target: &Path) -> bool {
        match lsblk::Mount::list() {
            Ok(mut mounts) => mounts.any(|m| m.mountpoint == target),
            Err(e) => {
                tracing::warn!(?e, "Cannot read mount table, assuming {target:?} is not mounted");
                false
            }
        }
    }

    fn run(&self, program: &str, args: &[&OsStr]) -> std::io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output()?;
        let output = CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(
            ?program,
            ?args,
            rc = output.status,
            stdout = %output.stdout,
            stderr = %output.stderr,
            "Ran command"
        );
        Ok(output)
    }

    fn hwaddr(&self, interface: &str) -> Option<String> {
        std::fs::read_to_string(Path::new("/sys/class/net").join(interface).join("address"))
            .inspect_err(|e| tracing::warn!(?interface, ?e, "Cannot look up hardware address"))
            .ok()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
    }
}
