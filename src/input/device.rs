//! Physical device identity and sibling grouping

use std::fmt;

/// Runtime identifier the platform assigns to an input device
///
/// Not stable across reconnects; see [`SiblingKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub i32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Descriptor announced by the device input source when a controller appears
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub vendor_id: u16,
    pub product_id: u16,
    pub name: String,
}

impl DeviceInfo {
    pub fn new(id: i32, vendor_id: u16, product_id: u16, name: impl Into<String>) -> Self {
        Self {
            id: DeviceId(id),
            vendor_id,
            product_id,
            name: name.into(),
        }
    }

    pub fn sibling_key(&self) -> SiblingKey {
        SiblingKey {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            name: sanitize_name(&self.name),
        }
    }
}

/// Grouping key for devices that are the same physical controller
///
/// The OS may re-enumerate a controller under a new id after a reconnect;
/// vendor, product and the sanitized name survive that.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiblingKey {
    pub vendor_id: u16,
    pub product_id: u16,
    pub name: String,
}

/// Lowercase alphanumerics only, so "Xbox Wireless Controller (2)" and
/// "xbox wireless controller" do not collide but whitespace/punctuation noise
/// between enumerations does not matter.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Where a piece of input came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Physical(DeviceId),
    Virtual,
}
