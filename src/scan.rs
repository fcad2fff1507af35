//! Looking for existing product installations and backup partitions on local disks.
//!
//! Scanning mounts one partition at a time on a shared scratch directory, so it is strictly
//! sequential. Partitions that won't mount, or that don't carry a usable inventory, are skipped;
//! a single odd device never aborts the scan.
use std::path::{Path, PathBuf};

use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use serde::Serialize;

use crate::{
    cfg::Scan,
    consts::PRIMARY_DISK,
    disks::partition_name,
    host::{Host, MountOptions},
    install::Installation,
    keyval::read_inventory_file,
    mounts,
};

/// A partition holding a backup of the installation that lived on `primary_disk`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    pub partition: PathBuf,
    pub primary_disk: PathBuf,
}

pub struct Scanner<'a, H: Host + ?Sized> {
    host: &'a H,
    cfg: &'a Scan,
}

impl<'a, H: Host + ?Sized> Scanner<'a, H> {
    pub const fn new(host: &'a H, cfg: &'a Scan) -> Self {
        Self { host, cfg }
    }

    /// Look at the first partition of every disk for a product inventory.
    ///
    /// # Errors
    /// - cannot list disks
    /// - cannot create the scratch mountpoint
    #[tracing::instrument(skip(self))]
    pub fn find_installations(&self) -> Result<Vec<Installation>> {
        let scratch = &self.cfg.scratch_dir;
        std::fs::create_dir_all(scratch)
            .wrap_err_with(|| format!("cannot create scratch mountpoint {scratch:?}"))?;

        let mut installs = vec![];
        for disk in self.host.disks()? {
            let part = partition_name(&disk, 1);
            let probe = mounts::with_mount(
                self.host,
                &part,
                scratch,
                &MountOptions::default(),
                |root| self.probe_installation(&disk, root),
            );
            match probe {
                Err(e) => tracing::debug!(?part, "Not mountable, skipping: {e}"),
                Ok(None) => tracing::debug!(?part, "No inventory"),
                Ok(Some(inst)) => {
                    tracing::info!("Found an installation: {inst}");
                    installs.push(inst);
                }
            }
        }
        Ok(installs)
    }

    fn probe_installation(&self, disk: &Path, root: &Path) -> Option<Installation> {
        let inventory = root.join(&self.cfg.inventory_file);
        if !inventory.exists() {
            return None;
        }
        read_inventory_file(&inventory)
            .map_err(color_eyre::Report::from)
            .and_then(|inv| Installation::from_inventory(disk, inv).map_err(Into::into))
            .inspect_err(|e| tracing::warn!(?disk, "Ignoring unreadable inventory: {e}"))
            .ok()
    }

    /// Look at every partition for a backup marker and record which disk it backs up.
    ///
    /// # Errors
    /// - cannot list partitions
    /// - cannot create the temporary mountpoint
    #[tracing::instrument(skip(self))]
    pub fn find_backups(&self) -> Result<Vec<BackupRecord>> {
        let partitions = self.host.partitions()?;
        let mnt = mounts::temp_mountpoint(&self.cfg.tmp_dir, "backup-")
            .wrap_err("cannot create backup mountpoint")?;
        scopeguard::defer! { mounts::release(self.host, &mnt) };

        let opts = MountOptions {
            read_only: true,
            fstype: Some(self.cfg.backup_fstype.as_str()),
        };
        let backups = (partitions.into_iter())
            .filter_map(|part| {
                mounts::with_mount(self.host, &part, &mnt, &opts, |root| {
                    self.probe_backup(root)
                })
                .inspect_err(|e| tracing::debug!("Not a backup partition: {e}"))
                .ok()
                .flatten()
                .map(|primary_disk| BackupRecord {
                    partition: part,
                    primary_disk,
                })
            })
            .inspect(|b| tracing::info!(?b, "Found a backup partition"))
            .collect();
        Ok(backups)
    }

    fn probe_backup(&self, root: &Path) -> Option<PathBuf> {
        if !root.join(&self.cfg.backup_marker).exists() {
            return None;
        }
        let inventory = root.join(&self.cfg.inventory_file);
        if !inventory.exists() {
            tracing::warn!("Backup partition without an inventory");
            return None;
        }
        read_inventory_file(&inventory)
            .inspect_err(|e| tracing::warn!("Ignoring unreadable backup inventory: {e}"))
            .ok()?
            .remove(PRIMARY_DISK)
            .map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{host::fake::FakeHost, version::Version};
    use tracing_test::traced_test;

    const INVENTORY: &str = "PRODUCT_NAME='xenenterprise'
PRODUCT_BRAND='XenServer'
PRODUCT_VERSION='4.0.1'
BUILD_NUMBER='4251'
PRIMARY_DISK='/dev/sda'
";

    fn cfg(dir: &Path) -> Scan {
        Scan {
            scratch_dir: dir.join("mnt"),
            tmp_dir: dir.to_owned(),
            ..Scan::default()
        }
    }

    #[test]
    #[traced_test]
    fn test_find_installations() {
        let host = FakeHost::new()
            .with_disk("/dev/sda")
            .with_disk("/dev/sdb")
            .with_disk("/dev/sdc")
            .with_disk("/dev/nvme0n1")
            // sda1 is missing entirely: blank disk
            .with_device("/dev/sdb1", "ext3", &[("etc/hostname", "foo")])
            .with_device("/dev/sdc1", "ext3", &[("etc/xensource-inventory", INVENTORY)])
            .with_device(
                "/dev/nvme0n1p1",
                "ext3",
                &[("etc/xensource-inventory", "PRODUCT_NAME='x'\nPRODUCT_BRAND='y'\n")],
            );
        let dir = tempfile::tempdir().unwrap();
        let cfg = cfg(dir.path());

        let found = Scanner::new(&host, &cfg).find_installations().unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].primary_disk, PathBuf::from("/dev/sdc"));
        assert_eq!(found[0].version, Version::new(4, 0, 1).with_build(4251));
        assert_eq!(host.mount_count(), 3);
        host.assert_balanced();
        assert!(logs_contain("Found an installation: XenServer v4.0.1-4251 on /dev/sdc"));
        assert!(logs_contain("Ignoring unreadable inventory"));
    }

    #[test]
    fn test_find_installations_order() {
        let host = FakeHost::new()
            .with_disk("/dev/sdb")
            .with_disk("/dev/sda")
            .with_device("/dev/sda1", "ext3", &[("etc/xensource-inventory", INVENTORY)])
            .with_device("/dev/sdb1", "ext3", &[("etc/xensource-inventory", INVENTORY)]);
        let dir = tempfile::tempdir().unwrap();
        let cfg = cfg(dir.path());

        let found = Scanner::new(&host, &cfg).find_installations().unwrap();
        let disks: Vec<_> = found.iter().map(|i| i.primary_disk.clone()).collect();
        assert_eq!(disks, [PathBuf::from("/dev/sda"), PathBuf::from("/dev/sdb")]);
        host.assert_balanced();
        // the shared scratch directory stays around for the next scan
        assert!(cfg.scratch_dir.is_dir());
    }

    #[test]
    fn test_unquoted_inventory_is_skipped() {
        let host = FakeHost::new().with_disk("/dev/sda").with_device(
            "/dev/sda1",
            "ext3",
            &[("etc/xensource-inventory", "PRODUCT_NAME=xenenterprise\n")],
        );
        let dir = tempfile::tempdir().unwrap();
        let cfg = cfg(dir.path());

        assert!(Scanner::new(&host, &cfg).find_installations().unwrap().is_empty());
        host.assert_balanced();
    }

    #[test]
    fn test_find_backups() {
        let host = FakeHost::new()
            .with_disk("/dev/sda")
            .with_device("/dev/sda1", "ext3", &[("etc/xensource-inventory", INVENTORY)])
            .with_device(
                "/dev/sda2",
                "ext3",
                &[(".xen-backup-partition", ""), ("etc/xensource-inventory", INVENTORY)],
            )
            // right marker, wrong filesystem
            .with_device(
                "/dev/sdb1",
                "ext4",
                &[(".xen-backup-partition", ""), ("etc/xensource-inventory", INVENTORY)],
            )
            // marker but no PRIMARY_DISK
            .with_device(
                "/dev/sdc1",
                "ext3",
                &[
                    (".xen-backup-partition", ""),
                    ("etc/xensource-inventory", "PRODUCT_NAME='xenenterprise'\n"),
                ],
            );
        let dir = tempfile::tempdir().unwrap();
        let cfg = cfg(dir.path());

        let backups = Scanner::new(&host, &cfg).find_backups().unwrap();

        assert_eq!(
            backups,
            [BackupRecord {
                partition: "/dev/sda2".into(),
                primary_disk: "/dev/sda".into(),
            }]
        );
        assert_eq!(host.mount_count(), 3);
        host.assert_balanced();
        // the temporary mountpoint is gone again
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }
}
