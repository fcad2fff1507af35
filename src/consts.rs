pub const SCRATCH_DIR: &str = "/tmp/mnt";
pub const TMP_DIR: &str = "/tmp";
pub const INVENTORY_FILE: &str = "etc/xensource-inventory";
pub const BACKUP_MARKER: &str = ".xen-backup-partition";
pub const BACKUP_FSTYPE: &str = "ext3";

// Inventory keys
pub const PRODUCT_NAME: &str = "PRODUCT_NAME";
pub const PRODUCT_BRAND: &str = "PRODUCT_BRAND";
pub const PRODUCT_VERSION: &str = "PRODUCT_VERSION";
pub const BUILD_NUMBER: &str = "BUILD_NUMBER";
pub const PRIMARY_DISK: &str = "PRIMARY_DISK";
pub const MANAGEMENT_INTERFACE: &str = "MANAGEMENT_INTERFACE";

pub const NETWORK_SCRIPTS_DIR: &str = "etc/sysconfig/network-scripts";
