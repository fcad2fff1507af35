#![allow(clippy::str_to_string)]
use std::path::PathBuf;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::Deserialize;
use serde_valid::toml::FromTomlStr;
use serde_valid::Validate;

use crate::{consts, version::Version};

const DEFAULT_CFG_PATH: &str = "/etc/relic.toml";

#[derive(Deserialize, Validate, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Scan {
    /// Where first partitions are mounted while looking for installations.
    pub scratch_dir: PathBuf,
    /// Parent directory for per-run temporary mountpoints.
    pub tmp_dir: PathBuf,
    /// Inventory location, relative to an installation's root.
    pub inventory_file: PathBuf,
    /// Sentinel file marking a backup partition, relative to its root.
    pub backup_marker: PathBuf,
    #[validate(min_length = 1)]
    pub backup_fstype: String,
}

impl Default for Scan {
    fn default() -> Self {
        Self {
            scratch_dir: consts::SCRATCH_DIR.into(),
            tmp_dir: consts::TMP_DIR.into(),
            inventory_file: consts::INVENTORY_FILE.into(),
            backup_marker: consts::BACKUP_MARKER.into(),
            backup_fstype: consts::BACKUP_FSTYPE.into(),
        }
    }
}

#[derive(Deserialize, Validate, Default, Debug, Clone, PartialEq)]
pub struct Product {
    /// The release being installed. Installations older than this are upgrade candidates.
    pub version: Option<Version>,
}

#[derive(Deserialize, Validate, Default, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RelicConfig {
    #[validate]
    pub scan: Scan,
    pub product: Product,
}

/// Load the config from `RELIC_CONFIG`, or `/etc/relic.toml`.
///
/// A missing file at the default location is not an error; built-in defaults are used instead.
///
/// # Errors
/// - cannot read config file
/// - config file fails to parse or validate
#[allow(clippy::module_name_repetitions)]
#[tracing::instrument]
pub fn get_cfg() -> Result<RelicConfig> {
    let path = std::env::var("RELIC_CONFIG");
    match &path {
        Err(std::env::VarError::NotUnicode(s)) => {
            tracing::error!(?s, "Cannot parse RELIC_CONFIG due to invalid unicode");
            tracing::debug!("Falling back to {DEFAULT_CFG_PATH}");
        }
        Ok(p) => tracing::debug!("Using RELIC_CONFIG={p}"),
        Err(std::env::VarError::NotPresent) => tracing::trace!("Using {DEFAULT_CFG_PATH}"),
    }
    let explicit = path.is_ok();
    let path = path.as_deref().unwrap_or(DEFAULT_CFG_PATH);
    let toml = match std::fs::read_to_string(path) {
        Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config at {path}, using defaults");
            return Ok(RelicConfig::default());
        }
        r => r.map_err(|e| eyre!("Cannot read config file at {path:?}").wrap_err(e))?,
    };
    Ok(RelicConfig::from_toml_str(&toml)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cfg() {
        assert_eq!(
            RelicConfig::from_toml_str(
                r#"
                [scan]
                scratch_dir = "/run/relic/mnt"
                backup_fstype = "ext4"

                [product]
                version = "4.1.0-5511"
                "#
            )
            .unwrap(),
            RelicConfig {
                scan: Scan {
                    scratch_dir: "/run/relic/mnt".into(),
                    backup_fstype: "ext4".into(),
                    ..Scan::default()
                },
                product: Product {
                    version: Some(Version::new(4, 1, 0).with_build(5511)),
                },
            },
        );
    }

    #[test]
    fn test_cfg_defaults() {
        let cfg = RelicConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.scan, Scan::default());
        assert_eq!(cfg.scan.inventory_file, PathBuf::from("etc/xensource-inventory"));
        assert!(cfg.product.version.is_none());
    }

    #[test]
    fn test_cfg_rejects_empty_fstype() {
        assert!(RelicConfig::from_toml_str("[scan]\nbackup_fstype = \"\"").is_err());
        assert!(RelicConfig::from_toml_str("[product]\nversion = \"4.x\"").is_err());
    }
}
