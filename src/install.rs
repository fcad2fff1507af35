use std::{
    cmp::Ordering,
    fmt,
    path::{Path, PathBuf},
};

use serde::Serialize;
use thiserror::Error;

use crate::{
    consts::{BUILD_NUMBER, PRODUCT_BRAND, PRODUCT_NAME, PRODUCT_VERSION},
    disks::partition_name,
    keyval::KeyValues,
    version::{ParseVersionError, Version},
};

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("inventory has no {0}")]
    MissingKey(&'static str),

    #[error(transparent)]
    Version(#[from] ParseVersionError),
}

/// A product installation found on a local disk.
#[derive(Debug, Clone, Serialize)]
pub struct Installation {
    pub name: String,
    pub brand: String,
    /// Product version with the build number folded in.
    pub version: Version,
    pub primary_disk: PathBuf,
    /// Everything the inventory file said, verbatim.
    pub inventory: KeyValues,
}

impl Installation {
    /// # Errors
    /// - a required inventory key is missing
    /// - `PRODUCT_VERSION-BUILD_NUMBER` is not a valid version
    pub fn from_inventory(primary_disk: &Path, inventory: KeyValues) -> Result<Self, InventoryError> {
        let get = |key: &'static str| {
            inventory
                .get(key)
                .ok_or(InventoryError::MissingKey(key))
        };
        let version = format!("{}-{}", get(PRODUCT_VERSION)?, get(BUILD_NUMBER)?).parse::<Version>()?;
        Ok(Self {
            name: get(PRODUCT_NAME)?.clone(),
            brand: get(PRODUCT_BRAND)?.clone(),
            version,
            primary_disk: primary_disk.to_owned(),
            inventory,
        })
    }

    #[must_use]
    pub fn inventory_value(&self, key: &str) -> Option<&str> {
        self.inventory.get(key).map(String::as_str)
    }

    /// The root filesystem always lives on the first partition of the primary disk.
    #[must_use]
    pub fn root_partition(&self) -> PathBuf {
        partition_name(&self.primary_disk, 1)
    }

    /// Whether this installation is of an older release line than `target`.
    ///
    /// Versions that can't be ordered (wildcards) are never candidates.
    #[must_use]
    pub fn is_upgrade_candidate(&self, target: &Version) -> bool {
        self.version.is_concrete()
            && target.is_concrete()
            && self.version.release_cmp(target) == Ordering::Less
    }
}

impl fmt::Display for Installation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v{} on {}",
            self.brand,
            self.version,
            self.primary_disk.display()
        )
    }
}
