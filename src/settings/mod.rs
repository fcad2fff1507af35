//! Pulling the settings of an existing installation off its root filesystem, so an upgrade can
//! carry them over.
//!
//! Only a handful of releases have a layout we know how to read. Anything else, and anything
//! that goes wrong on the way, yields [`SettingsNotAvailable`]: the caller then starts from a
//! fresh configuration.
use std::{
    collections::BTreeMap,
    ffi::OsStr,
    path::{Path, PathBuf},
};

use serde::Serialize;
use thiserror::Error;

use crate::{
    cfg::Scan,
    consts::NETWORK_SCRIPTS_DIR,
    host::{Host, MountError, MountOptions},
    install::Installation,
    mounts,
    version::Version,
};

pub mod network;

pub use network::{Context, Layout, ManagementBridge, NetworkLayout, PairedBridges};

#[derive(Error, Debug)]
pub enum SettingsNotAvailable {
    #[error("no known settings layout for version {0}")]
    UnsupportedVersion(Version),

    #[error("cannot read {path:?}: {source}")]
    MissingFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{file:?} has no {key}")]
    MissingField { file: PathBuf, key: &'static str },

    #[error(transparent)]
    Mount(#[from] MountError),

    #[error("root password lookup exited with {status}: {stderr}")]
    PasswordLookup { status: i32, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value")]
pub enum RootPassword {
    /// As found in the shadow database.
    #[serde(rename = "pwdhash")]
    Hash(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeConfig {
    Ntp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Addressing {
    Dhcp,
    Static {
        ip: String,
        netmask: String,
        gateway: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceConfig {
    pub hwaddr: Option<String>,
    pub enabled: bool,
    pub addressing: Addressing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SettingsSnapshot {
    pub primary_disk: PathBuf,
    pub timezone: String,
    /// `None` if no hostname was ever set.
    pub hostname: Option<String>,
    /// `None` if there is no `resolv.conf` at all, i.e. nameservers came from DHCP.
    pub nameservers: Option<Vec<String>>,
    pub ntp_servers: Vec<String>,
    pub keymap: String,
    pub root_password: RootPassword,
    pub time_config: TimeConfig,
    pub net_admin_interface: Option<String>,
    pub net_admin_configuration: Option<InterfaceConfig>,
    pub interfaces: BTreeMap<String, InterfaceConfig>,
}

pub struct SettingsReader<'a, H: Host + ?Sized> {
    host: &'a H,
    tmp_dir: &'a Path,
}

impl<'a, H: Host + ?Sized> SettingsReader<'a, H> {
    pub fn new(host: &'a H, cfg: &'a Scan) -> Self {
        Self {
            host,
            tmp_dir: &cfg.tmp_dir,
        }
    }

    /// Mount the installation's root partition read-only and read its settings.
    ///
    /// # Errors
    /// See [`SettingsNotAvailable`]. The version is checked before anything is mounted.
    #[tracing::instrument(skip(self, inst), fields(inst = %inst))]
    pub fn read_settings(&self, inst: &Installation) -> Result<SettingsSnapshot, SettingsNotAvailable> {
        let layout = Layout::for_version(&inst.version)
            .ok_or_else(|| SettingsNotAvailable::UnsupportedVersion(inst.version.clone()))?;

        let mnt = mounts::temp_mountpoint(self.tmp_dir, "root-")?;
        scopeguard::defer! { mounts::release(self.host, &mnt) };

        mounts::with_mount(
            self.host,
            &inst.root_partition(),
            &mnt,
            &MountOptions::read_only(),
            |root| self.read_tree(inst, layout, root),
        )?
    }

    /// Whether [`Self::read_settings`] succeeds for this installation. This mounts the root
    /// partition and reads everything; the snapshot itself is thrown away.
    #[must_use]
    pub fn settings_available(&self, inst: &Installation) -> bool {
        self.read_settings(inst)
            .inspect_err(|e| tracing::debug!("No settings available for {inst}: {e}"))
            .is_ok()
    }

    fn read_tree(
        &self,
        inst: &Installation,
        layout: Layout,
        root: &Path,
    ) -> Result<SettingsSnapshot, SettingsNotAvailable> {
        let clock = Config::read(root, "etc/sysconfig/clock")?;
        let timezone = clock.required("ZONE=")?;

        let hostname = Config::read(root, "etc/sysconfig/network")?
            .last("HOSTNAME=")
            .map(str::to_owned);

        let resolv = root.join("etc/resolv.conf");
        let nameservers = if resolv.exists() {
            Some(Config::read(root, "etc/resolv.conf")?.all("nameserver "))
        } else {
            tracing::debug!("No resolv.conf, nameservers were not set manually");
            None
        };

        let ntp_servers = Config::read(root, "etc/ntp.conf")?.all("server ");
        let keymap = Config::read(root, "etc/sysconfig/keyboard")?.required("KEYTABLE=")?;
        let root_password = self.root_password(root)?;

        let lookup = |iface: &str| self.host.hwaddr(iface);
        let network = layout.read_network(&Context {
            scripts_dir: root.join(NETWORK_SCRIPTS_DIR),
            installation: inst,
            hwaddr: &lookup,
        })?;

        tracing::info!("Read settings of {inst}");
        Ok(SettingsSnapshot {
            primary_disk: inst.primary_disk.clone(),
            timezone,
            hostname,
            nameservers,
            ntp_servers,
            keymap,
            root_password,
            time_config: TimeConfig::Ntp,
            net_admin_configuration: network.admin_configuration().cloned(),
            net_admin_interface: network.admin_interface,
            interfaces: network.interfaces,
        })
    }

    fn root_password(&self, root: &Path) -> Result<RootPassword, SettingsNotAvailable> {
        let args = [root.as_os_str(), OsStr::new("getent"), OsStr::new("shadow"), OsStr::new("root")];
        let out = self.host.run("chroot", &args)?;
        if !out.success() {
            return Err(SettingsNotAvailable::PasswordLookup {
                status: out.status,
                stderr: out.stderr,
            });
        }
        out.stdout
            .trim()
            .split(':')
            .nth(1)
            .map(|hash| RootPassword::Hash(hash.to_owned()))
            .ok_or_else(|| SettingsNotAvailable::PasswordLookup {
                status: out.status,
                stderr: format!("no password field in {:?}", out.stdout),
            })
    }
}

/// A plain text config file, looked at line by line.
struct Config {
    rel: &'static str,
    text: String,
}

impl Config {
    fn read(root: &Path, rel: &'static str) -> Result<Self, SettingsNotAvailable> {
        let path = root.join(rel);
        let text = std::fs::read_to_string(&path)
            .map_err(|source| SettingsNotAvailable::MissingFile { path, source })?;
        Ok(Self { rel, text })
    }

    fn all(&self, prefix: &str) -> Vec<String> {
        (self.text.lines())
            .filter_map(|line| line.strip_prefix(prefix))
            .map(|value| value.trim().to_owned())
            .collect()
    }

    /// Value of the last matching line, even if it is empty.
    fn last(&self, prefix: &str) -> Option<&str> {
        (self.text.lines())
            .filter_map(|line| line.strip_prefix(prefix))
            .map(str::trim)
            .last()
    }

    /// Like [`Self::last`], but the last matching line must carry a value.
    fn required(&self, prefix: &'static str) -> Result<String, SettingsNotAvailable> {
        self.last(prefix)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| SettingsNotAvailable::MissingField {
                file: self.rel.into(),
                key: prefix.trim_end_matches('='),
            })
    }
}
