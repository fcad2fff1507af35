//! Readers for shell-style `KEY=value` files, such as the product inventory and the
//! `ifcfg-*` network scripts.
use std::{collections::BTreeMap, path::Path};

use thiserror::Error;

/// Keys we care about in `/etc/sysconfig/network-scripts/ifcfg-*`.
pub const NETWORK_KEYS: &[&str] = &[
    "BOOTPROTO",
    "ONBOOT",
    "DEVICE",
    "TYPE",
    "HWADDR",
    "BRIDGE",
    "LINEDELAY",
    "DELAY",
    "STP",
    "NETMASK",
    "IPADDR",
    "GATEWAY",
    "PEERDNS",
    "NETWORK",
    "BROADCAST",
    "NAME",
];

#[derive(Error, Debug)]
pub enum KeyValueError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Value for {key} is not single-quoted: {line:?}")]
    Unquoted { key: String, line: String },
}

/// What to do with single quotes around values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quotes {
    /// Leave values untouched.
    Keep,
    /// Strip quotes if there are any.
    #[default]
    Strip,
    /// Every value must be quoted; anything else is a malformed file.
    Require,
}

pub type KeyValues = BTreeMap<String, String>;

/// Non-blank, non-comment lines with a key from `allowed_keys`, split at the first `=` into
/// `(line, key, value)`.
fn entries<'a>(
    text: &'a str,
    allowed_keys: Option<&'a [&'a str]>,
) -> impl Iterator<Item = (&'a str, &'a str, &'a str)> {
    text.lines()
        .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .filter(move |line| allowed_keys.is_none_or(|keys| keys.iter().any(|k| line.starts_with(k))))
        .filter_map(|line| line.split_once('=').map(|(k, v)| (line, k, v)))
}

/// Parse `KEY=value` lines. Later keys overwrite earlier ones.
///
/// If `allowed_keys` is given, only lines starting with one of those prefixes are kept.
/// Blank lines, comments and lines without `=` are ignored.
///
/// # Errors
/// - [`KeyValueError::Unquoted`] if `quotes` is [`Quotes::Require`] and a value isn't quoted
pub fn parse_key_value_str(
    text: &str,
    allowed_keys: Option<&[&str]>,
    quotes: Quotes,
) -> Result<KeyValues, KeyValueError> {
    entries(text, allowed_keys)
        .map(|(line, key, value)| {
            let value = match quotes {
                Quotes::Keep => value,
                Quotes::Strip => value.trim_matches('\''),
                Quotes::Require if value.len() >= 2
                    && value.starts_with('\'')
                    && value.ends_with('\'') =>
                {
                    value.trim_matches('\'')
                }
                Quotes::Require => {
                    return Err(KeyValueError::Unquoted {
                        key: key.to_owned(),
                        line: line.to_owned(),
                    })
                }
            };
            Ok((key.to_owned(), value.to_owned()))
        })
        .collect()
}

/// Network scripts quote optionally, so unlike inventories they cannot be malformed.
#[must_use]
pub fn parse_network_script_str(text: &str) -> KeyValues {
    entries(text, Some(NETWORK_KEYS))
        .map(|(_, key, value)| (key.to_owned(), value.trim_matches('\'').to_owned()))
        .collect()
}

/// Read a whole `KEY=value` file into memory and parse it. Not meant for large files.
///
/// # Errors
/// - the file cannot be read
/// - see [`parse_key_value_str`]
#[tracing::instrument(level = "trace")]
pub fn read_key_value_file(
    path: &Path,
    allowed_keys: Option<&[&str]>,
    quotes: Quotes,
) -> Result<KeyValues, KeyValueError> {
    let text = std::fs::read_to_string(path)?;
    parse_key_value_str(&text, allowed_keys, quotes)
}

/// Inventory files always quote their values.
///
/// # Errors
/// See [`read_key_value_file`].
pub fn read_inventory_file(path: &Path) -> Result<KeyValues, KeyValueError> {
    read_key_value_file(path, None, Quotes::Require)
}

/// # Errors
/// The file cannot be read.
pub fn read_network_script_file(path: &Path) -> std::io::Result<KeyValues> {
    Ok(parse_network_script_str(&std::fs::read_to_string(path)?))
}
