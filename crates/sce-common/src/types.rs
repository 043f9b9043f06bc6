//! Domain primitive types used across the sce workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::MAX_INTERFACE_NAME_LENGTH;
use crate::error::{Result, SceError};

/// Name of a container, reused as its hostname and cgroup name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerName(String);

impl ContainerName {
    /// Creates a container name, accepting `[A-Za-z0-9_+.-]+`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or contains other characters.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '.' | '-'));
        if !valid {
            return Err(SceError::Config {
                message: format!("invalid container name: {name:?}"),
            });
        }
        Ok(Self(name))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A network interface name that fits the kernel's `IFNAMSIZ` limit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceName(String);

impl InterfaceName {
    /// Creates an interface name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, longer than 15 bytes, or
    /// contains `/` or whitespace.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty()
            || name.len() > MAX_INTERFACE_NAME_LENGTH
            || name.contains('/')
            || name.chars().any(char::is_whitespace)
        {
            return Err(SceError::Config {
                message: format!("invalid interface name: {name:?}"),
            });
        }
        Ok(Self(name))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 48-bit MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Builds a MAC address without a vendor prefix: the three most
    /// significant bytes are zero and `suffix` fills the rest.
    #[must_use]
    pub const fn without_oui(suffix: [u8; 3]) -> Self {
        Self([0, 0, 0, suffix[0], suffix[1], suffix[2]])
    }

    /// Returns the raw octets.
    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}
