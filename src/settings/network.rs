//! Reconstructing the network configuration from `ifcfg-*` scripts.
//!
//! Older releases kept one bridge per NIC (`ifcfg-eth0` paired with `ifcfg-xenbr0`), newer ones
//! only record the bridge that the management interface is enslaved to. Which of the two a
//! given installation uses depends on its version, see [`Layout::for_version`].
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use enum_dispatch::enum_dispatch;
use itertools::Itertools;

use super::{Addressing, InterfaceConfig, SettingsNotAvailable};
use crate::{
    consts::{INVENTORY_FILE, MANAGEMENT_INTERFACE},
    install::Installation,
    keyval::{read_network_script_file, KeyValues},
    version::{Component::Num, Version},
};

pub struct Context<'a> {
    /// `etc/sysconfig/network-scripts` inside the mounted root.
    pub scripts_dir: PathBuf,
    pub installation: &'a Installation,
    /// Hardware address of a live interface, for scripts that never recorded one.
    pub hwaddr: &'a dyn Fn(&str) -> Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Network {
    pub admin_interface: Option<String>,
    pub interfaces: BTreeMap<String, InterfaceConfig>,
}

impl Network {
    #[must_use]
    pub fn admin_configuration(&self) -> Option<&InterfaceConfig> {
        self.interfaces.get(self.admin_interface.as_deref()?)
    }
}

#[enum_dispatch(Layout)]
pub trait NetworkLayout {
    /// # Errors
    /// A script the layout depends on is missing or unreadable.
    fn read_network(&self, ctx: &Context<'_>) -> Result<Network, SettingsNotAvailable>;
}

#[enum_dispatch]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    ManagementBridge,
    PairedBridges,
}

impl Layout {
    /// Releases whose settings we know how to read, and how their network scripts look.
    fn table() -> [(Version, Self); 2] {
        [
            (
                Version::wildcard(Num(3), Num(2), Num(0)),
                Self::PairedBridges(PairedBridges),
            ),
            (
                Version::wildcard(Num(4), Num(0), Num(1)),
                Self::ManagementBridge(ManagementBridge),
            ),
        ]
    }

    #[must_use]
    pub fn for_version(version: &Version) -> Option<Self> {
        (Self::table().into_iter())
            .find(|(known, _)| known == version)
            .map(|(_, layout)| layout)
    }
}

/// Only the NIC enslaved to the inventory's `MANAGEMENT_INTERFACE` bridge matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagementBridge;

/// Every `ifcfg-eth<N>` has a matching `ifcfg-xenbr<N>` carrying its addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairedBridges;

impl NetworkLayout for ManagementBridge {
    fn read_network(&self, ctx: &Context<'_>) -> Result<Network, SettingsNotAvailable> {
        let bridge = ctx
            .installation
            .inventory_value(MANAGEMENT_INTERFACE)
            .ok_or_else(|| SettingsNotAvailable::MissingField {
                file: INVENTORY_FILE.into(),
                key: MANAGEMENT_INTERFACE,
            })?;

        let mut network = Network::default();
        for name in script_names(&ctx.scripts_dir, "ifcfg-eth")? {
            let nic = read_script(&ctx.scripts_dir.join(&name))?;
            let Some(device) = nic.get("DEVICE") else {
                continue;
            };
            if nic.get("BRIDGE").map(String::as_str) != Some(bridge) {
                continue;
            }
            let brcfg = read_script(&ctx.scripts_dir.join(format!("ifcfg-{bridge}")))?;
            tracing::debug!(?device, ?bridge, "Found the management interface");
            let config = InterfaceConfig {
                hwaddr: hwaddr(ctx, &nic, device),
                enabled: true,
                addressing: addressing(&brcfg),
            };
            network.admin_interface = Some(device.clone());
            network.interfaces.insert(device.clone(), config);
            return Ok(network);
        }
        tracing::warn!(?bridge, "No interface is enslaved to the management bridge");
        Ok(network)
    }
}

impl NetworkLayout for PairedBridges {
    fn read_network(&self, ctx: &Context<'_>) -> Result<Network, SettingsNotAvailable> {
        let nics = script_names(&ctx.scripts_dir, "ifcfg-eth")?
            .into_iter()
            .filter_map(|name| {
                let n = name.strip_prefix("ifcfg-eth")?.parse::<u32>().ok()?;
                Some((n, name))
            })
            .sorted_by_key(|(n, _)| *n);

        let mut network = Network::default();
        for (n, name) in nics {
            let bridge = ctx.scripts_dir.join(format!("ifcfg-xenbr{n}"));
            if !bridge.exists() {
                tracing::warn!(?name, "No matching bridge script, skipping interface");
                continue;
            }
            let nic = read_script(&ctx.scripts_dir.join(&name))?;
            let brcfg = read_script(&bridge)?;
            let device = nic.get("DEVICE").cloned().unwrap_or_else(|| format!("eth{n}"));
            let config = InterfaceConfig {
                hwaddr: hwaddr(ctx, &nic, &device),
                enabled: brcfg.get("ONBOOT").is_some_and(|v| v == "yes"),
                addressing: addressing(&brcfg),
            };
            if config.enabled && network.admin_interface.is_none() {
                network.admin_interface = Some(device.clone());
            }
            network.interfaces.insert(device, config);
        }
        Ok(network)
    }
}

fn script_names(dir: &Path, prefix: &str) -> Result<Vec<String>, SettingsNotAvailable> {
    let missing = |source| SettingsNotAvailable::MissingFile {
        path: dir.to_owned(),
        source,
    };
    let names: Vec<String> = std::fs::read_dir(dir)
        .map_err(missing)?
        .map_ok(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter_ok(|name| name.starts_with(prefix))
        .try_collect()
        .map_err(missing)?;
    Ok(names.into_iter().sorted().collect())
}

fn read_script(path: &Path) -> Result<KeyValues, SettingsNotAvailable> {
    read_network_script_file(path).map_err(|source| SettingsNotAvailable::MissingFile {
        path: path.to_owned(),
        source,
    })
}

fn hwaddr(ctx: &Context<'_>, nic: &KeyValues, device: &str) -> Option<String> {
    nic.get("HWADDR").cloned().or_else(|| {
        tracing::debug!(?device, "No HWADDR recorded, looking it up");
        (ctx.hwaddr)(device)
    })
}

fn addressing(bridge: &KeyValues) -> Addressing {
    if bridge.get("BOOTPROTO").is_none_or(|proto| proto != "static") {
        return Addressing::Dhcp;
    }
    let get = |key: &str| bridge.get(key).cloned().unwrap_or_default();
    Addressing::Static {
        ip: get("IPADDR"),
        netmask: get("NETMASK"),
        gateway: get("GATEWAY"),
    }
}
