//! Finding existing product installations on local disks, and the settings they were left with.
//!
//! [`scan::Scanner`] looks for installations and backup partitions; [`settings::SettingsReader`]
//! extracts the configuration of one installation so an upgrade can keep it.
#![warn(rust_2018_idioms)]
pub mod cfg;
pub mod consts;
pub mod disks;
pub mod host;
pub mod install;
pub mod keyval;
pub mod log;
pub mod mounts;
pub mod scan;
pub mod settings;
pub mod version;

// Mounting, chroot and sysfs lookups only make sense on Linux
#[cfg(not(target_os = "linux"))]
compile_error!("relic does not support non-Linux platforms, device probing is Linux-specific.");
