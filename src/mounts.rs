//! Scoped mounting on top of [`Host`].
use std::path::{Path, PathBuf};

use crate::host::{Host, MountError, MountOptions};

/// Mount `device` at `target`, run `f` on the mounted tree, then unmount no matter what `f`
/// does (including unwinding).
///
/// # Errors
/// The mount itself fails. Nothing is unmounted in that case.
pub fn with_mount<H, F, T>(
    host: &H,
    device: &Path,
    target: &Path,
    opts: &MountOptions<'_>,
    f: F,
) -> Result<T, MountError>
where
    H: Host + ?Sized,
    F: FnOnce(&Path) -> T,
{
    host.mount(device, target, opts)?;
    scopeguard::defer! {
        if let Err(e) = host.umount(target, false) {
            tracing::error!("Cannot unmount {target:?}: {e:?}");
        }
    };
    Ok(f(target))
}

/// Create a fresh, empty directory under `parent` to mount things on.
///
/// # Errors
/// The directory cannot be created.
pub fn temp_mountpoint(parent: &Path, prefix: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(parent)?;
    Ok(tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(parent)?
        .keep())
}

/// Unmount `target` until it is really gone, then remove the directory.
///
/// Earlier failures can leave several filesystems stacked on the same directory, so a single
/// unmount isn't enough. A failed unmount is retried once with force before giving up.
pub fn release<H: Host + ?Sized>(host: &H, target: &Path) {
    while host.is_mounted(target) {
        let Err(e) = host.umount(target, false) else {
            continue;
        };
        tracing::warn!(?e, "Unmounting {target:?} failed, forcing");
        if let Err(e) = host.umount(target, true) {
            tracing::error!(?e, "Cannot unmount {target:?}, leaving it behind");
            return;
        }
    }
    if let Err(e) = std::fs::remove_dir(target) {
        tracing::error!(?e, "Cannot remove mountpoint {target:?}");
    }
}
