//! Device node naming for disks and their partitions.
use std::path::{Path, PathBuf};

/// Device node for partition `n` of `disk`.
///
/// Disks whose name ends in a digit get a `p` separator, so `/dev/sda` becomes `/dev/sda1`
/// but `/dev/nvme0n1` becomes `/dev/nvme0n1p1` and `/dev/cciss/c0d0` becomes
/// `/dev/cciss/c0d0p1`.
#[must_use]
pub fn partition_name(disk: &Path, n: u32) -> PathBuf {
    let mut name = disk.as_os_str().to_owned();
    if disk
        .to_str()
        .and_then(|s| s.chars().last())
        .is_some_and(|c| c.is_ascii_digit())
    {
        name.push("p");
    }
    name.push(n.to_string());
    PathBuf::from(name)
}

/// Whether the device node looks like something we should never probe (RAM disks, zram, loop
/// devices and so on).
#[must_use]
pub fn is_virtual(dev: &Path) -> bool {
    dev.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| ["loop", "zram", "ram", "sr"].iter().any(|p| n.starts_with(p)))
}
