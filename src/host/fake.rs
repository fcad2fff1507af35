//! A [`Host`] that never touches real devices.
//!
//! Each fake device carries a filesystem type and a list of files. Mounting one writes those
//! files under the target directory; unmounting wipes the directory again. Every call is
//! recorded so tests can check that mounts and unmounts are balanced.
use std::{
    cell::RefCell,
    collections::HashMap,
    ffi::OsStr,
    path::{Path, PathBuf},
};

use super::{CommandOutput, Host, MountError, MountOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Mount { device: PathBuf, target: PathBuf },
    Umount { target: PathBuf, force: bool },
    Run { program: String, args: Vec<String> },
}

#[derive(Debug, Clone)]
struct Device {
    fstype: &'static str,
    files: Vec<(String, String)>,
}

#[derive(Debug, Default)]
pub struct FakeHost {
    disks: Vec<PathBuf>,
    devices: HashMap<PathBuf, Device>,
    commands: HashMap<String, CommandOutput>,
    hwaddrs: HashMap<String, String>,
    mounted: RefCell<Vec<PathBuf>>,
    /// Targets that refuse a plain unmount; `true` if they refuse a forced one too.
    busy: RefCell<HashMap<PathBuf, bool>>,
    calls: RefCell<Vec<Call>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a whole disk. Partitions are added with [`Self::with_device`].
    pub fn with_disk(mut self, disk: &str) -> Self {
        self.disks.push(disk.into());
        self
    }

    /// A mountable device holding `files` (relative path, contents).
    pub fn with_device(mut self, device: &str, fstype: &'static str, files: &[(&str, &str)]) -> Self {
        let files = files
            .iter()
            .map(|(p, c)| ((*p).to_owned(), (*c).to_owned()))
            .collect();
        self.devices.insert(device.into(), Device { fstype, files });
        self
    }

    pub fn with_command(mut self, program: &str, output: CommandOutput) -> Self {
        self.commands.insert(program.to_owned(), output);
        self
    }

    pub fn with_hwaddr(mut self, interface: &str, hwaddr: &str) -> Self {
        self.hwaddrs.insert(interface.to_owned(), hwaddr.to_owned());
        self
    }

    /// Make plain unmounts of `target` fail from now on. A forced unmount clears the
    /// condition, unless `refuse_force` is set.
    pub fn make_busy(&self, target: &Path, refuse_force: bool) {
        self.busy.borrow_mut().insert(target.to_owned(), refuse_force);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn mount_count(&self) -> usize {
        (self.calls.borrow().iter())
            .filter(|c| matches!(c, Call::Mount { .. }))
            .count()
    }

    /// Every mount was undone exactly once and nothing is left mounted.
    #[track_caller]
    pub fn assert_balanced(&self) {
        let umounts = (self.calls.borrow().iter())
            .filter(|c| matches!(c, Call::Umount { .. }))
            .count();
        assert_eq!(self.mount_count(), umounts, "calls: {:#?}", self.calls());
        assert!(
            self.mounted.borrow().is_empty(),
            "still mounted: {:?}",
            self.mounted.borrow()
        );
    }

    fn clear_dir(dir: &Path) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                std::fs::remove_dir_all(path)?;
            } else {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

impl Host for FakeHost {
    fn disks(&self) -> color_eyre::Result<Vec<PathBuf>> {
        let mut disks = self.disks.clone();
        disks.sort();
        Ok(disks)
    }

    fn partitions(&self) -> color_eyre::Result<Vec<PathBuf>> {
        let mut parts: Vec<_> = (self.devices.keys())
            .filter(|dev| !self.disks.contains(dev))
            .cloned()
            .collect();
        parts.sort();
        Ok(parts)
    }

    fn mount(
        &self,
        device: &Path,
        target: &Path,
        opts: &MountOptions<'_>,
    ) -> Result<(), MountError> {
        let fail = |msg: &str| MountError::Mount {
            device: device.to_owned(),
            target: target.to_owned(),
            source: std::io::Error::other(msg.to_owned()),
        };
        let dev = self.devices.get(device).ok_or_else(|| fail("no such device"))?;
        if opts.fstype.is_some_and(|fs| fs != dev.fstype) {
            return Err(fail("wrong fs type"));
        }
        if !target.is_dir() {
            return Err(fail("mount point does not exist"));
        }
        self.calls.borrow_mut().push(Call::Mount {
            device: device.to_owned(),
            target: target.to_owned(),
        });
        for (rel, contents) in &dev.files {
            let path = target.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|_| fail("cannot create fixture dir"))?;
            }
            std::fs::write(path, contents).map_err(|_| fail("cannot write fixture"))?;
        }
        self.mounted.borrow_mut().push(target.to_owned());
        Ok(())
    }

    fn umount(&self, target: &Path, force: bool) -> Result<(), MountError> {
        let refuse = match self.busy.borrow().get(target) {
            Some(&refuse_force) => !force || refuse_force,
            None => false,
        };
        if refuse {
            return Err(MountError::Unmount {
                target: target.to_owned(),
                source: std::io::Error::other("target is busy"),
            });
        }
        if force {
            self.busy.borrow_mut().remove(target);
        }
        let mut mounted = self.mounted.borrow_mut();
        let Some(idx) = mounted.iter().rposition(|t| t == target) else {
            return Err(MountError::Unmount {
                target: target.to_owned(),
                source: std::io::Error::other("not mounted"),
            });
        };
        mounted.remove(idx);
        self.calls.borrow_mut().push(Call::Umount {
            target: target.to_owned(),
            force,
        });
        Self::clear_dir(target).map_err(|source| MountError::Unmount {
            target: target.to_owned(),
            source,
        })
    }

    fn is_mounted(&self, target: &Path) -> bool {
        self.mounted.borrow().iter().any(|t| t == target)
    }

    fn run(&self, program: &str, args: &[&OsStr]) -> std::io::Result<CommandOutput> {
        self.calls.borrow_mut().push(Call::Run {
            program: program.to_owned(),
            args: args.iter().map(|a| a.to_string_lossy().into_owned()).collect(),
        });
        self.commands.get(program).cloned().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("{program}: not found"))
        })
    }

    fn hwaddr(&self, interface: &str) -> Option<String> {
        self.hwaddrs.get(interface).cloned()
    }
}
