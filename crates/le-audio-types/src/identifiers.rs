//! # Identifiers
//!
//! Device addresses, broadcast identities and sync handles.

use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of a source slot inside a sink's receive-state table.
pub type SourceId = u8;

/// Advertising set identifier of a periodic advertiser.
pub type AdvertisingSid = u8;

/// A 48-bit Bluetooth device address, rendered as `AA:BB:CC:DD:EE:FF`.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, SerializeDisplay, DeserializeFromStr,
)]
pub struct DeviceAddress([u8; 6]);

impl DeviceAddress {
    /// Address carried by an empty receive-state slot.
    pub const EMPTY: Self = Self([0; 6]);

    /// Create an address from its most-significant-first bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Raw bytes, most significant first.
    #[must_use]
    pub const fn bytes(&self) -> [u8; 6] {
        self.0
    }

    /// True for the all-zero address used by empty slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl fmt::Debug for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Error returned when parsing a textual device address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid device address: {0}")]
pub struct AddressParseError(pub String);

impl FromStr for DeviceAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in &mut bytes {
            let part = parts
                .next()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| AddressParseError(s.to_string()))?;
            *byte = u8::from_str_radix(part, 16).map_err(|_| AddressParseError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(AddressParseError(s.to_string()));
        }
        Ok(Self(bytes))
    }
}

/// Address type of an advertiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AddressType {
    /// Public device address.
    #[default]
    Public,
    /// Random (static or resolvable) device address.
    Random,
}

impl AddressType {
    /// Decode the HCI representation.
    #[must_use]
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(Self::Public),
            0x01 => Some(Self::Random),
            _ => None,
        }
    }

    /// HCI representation.
    #[must_use]
    pub const fn raw(&self) -> u8 {
        match self {
            Self::Public => 0x00,
            Self::Random => 0x01,
        }
    }
}

/// 24-bit identity of a broadcast stream.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BroadcastId(u32);

impl BroadcastId {
    /// Reserved value that never identifies a live broadcast.
    pub const INVALID: Self = Self(0xFFFF_FFFF);

    /// Largest valid raw identity.
    pub const MAX: u32 = 0x00FF_FFFF;

    /// Create an identity, rejecting values outside the 24-bit range.
    #[must_use]
    pub fn new(raw: u32) -> Option<Self> {
        (raw <= Self::MAX).then_some(Self(raw))
    }

    /// Decode the three little-endian octets carried in the announcement.
    #[must_use]
    pub fn from_le_bytes(bytes: [u8; 3]) -> Self {
        Self(u32::from(bytes[0]) | u32::from(bytes[1]) << 8 | u32::from(bytes[2]) << 16)
    }

    /// Raw value.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// False for [`BroadcastId::INVALID`] and anything beyond 24 bits.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.0 <= Self::MAX
    }
}

impl fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{:#08x}", self.0)
        } else {
            f.write_str("INVALID")
        }
    }
}

impl fmt::Debug for BroadcastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BroadcastId({self})")
    }
}

/// Handle of an established periodic-advertising sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyncHandle(pub u16);

impl fmt::Display for SyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display_and_parse() {
        let addr = DeviceAddress::new([0x00, 0x11, 0x22, 0xAA, 0xBB, 0xCC]);
        assert_eq!(addr.to_string(), "00:11:22:AA:BB:CC");
        assert_eq!("00:11:22:aa:bb:cc".parse::<DeviceAddress>().unwrap(), addr);
    }

    #[test]
    fn test_address_parse_rejects_malformed() {
        assert!("00:11:22:33:44".parse::<DeviceAddress>().is_err());
        assert!("00:11:22:33:44:55:66".parse::<DeviceAddress>().is_err());
        assert!("00:11:22:33:44:GG".parse::<DeviceAddress>().is_err());
        assert!("0:11:22:33:44:55".parse::<DeviceAddress>().is_err());
    }

    #[test]
    fn test_empty_address() {
        assert!(DeviceAddress::EMPTY.is_empty());
        assert_eq!(DeviceAddress::EMPTY.to_string(), "00:00:00:00:00:00");
        assert!(!DeviceAddress::new([1, 0, 0, 0, 0, 0]).is_empty());
    }

    #[test]
    fn test_address_serializes_as_string() {
        let addr = DeviceAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"AA:BB:CC:DD:EE:FF\"");
        let back: DeviceAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn test_broadcast_id_range() {
        assert!(BroadcastId::new(0x00FF_FFFF).is_some());
        assert!(BroadcastId::new(0x0100_0000).is_none());
        assert!(!BroadcastId::INVALID.is_valid());
        assert_eq!(BroadcastId::INVALID.to_string(), "INVALID");
    }

    #[test]
    fn test_broadcast_id_little_endian() {
        let id = BroadcastId::from_le_bytes([0x56, 0x34, 0x12]);
        assert_eq!(id.value(), 0x12_3456);
        assert!(id.is_valid());
    }

    #[test]
    fn test_address_type_raw() {
        assert_eq!(AddressType::from_raw(1), Some(AddressType::Random));
        assert_eq!(AddressType::from_raw(7), None);
        assert_eq!(AddressType::Public.raw(), 0);
    }
}
