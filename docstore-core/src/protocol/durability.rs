//! Synchronous durability requirements and their framing-extra encoding.

use std::time::Duration;

use bytes::{BufMut, BytesMut};

use super::constants::FRAMING_EXTRA_DURABILITY;

/// Minimum replication/persistence guarantee for a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DurabilityLevel {
    /// No synchronous durability.
    #[default]
    None = 0x00,
    /// Replicated to a majority of nodes.
    Majority = 0x01,
    /// Replicated to a majority and persisted on the active node.
    MajorityAndPersistToActive = 0x02,
    /// Persisted on a majority of nodes.
    PersistToMajority = 0x03,
}

impl DurabilityLevel {
    /// Creates a level from its wire format value.
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::None),
            0x01 => Some(Self::Majority),
            0x02 => Some(Self::MajorityAndPersistToActive),
            0x03 => Some(Self::PersistToMajority),
            _ => None,
        }
    }

    /// Returns the wire format value for this level.
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// A durability level with an optional server-side timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DurabilityRequirement {
    /// Required level.
    pub level: DurabilityLevel,
    /// How long the server may wait for the level to be reached.
    pub timeout: Option<Duration>,
}

impl DurabilityRequirement {
    /// Creates a requirement without a timeout.
    pub fn new(level: DurabilityLevel) -> Self {
        Self {
            level,
            timeout: None,
        }
    }

    /// Sets the server-side timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns true if the requirement has to be sent at all.
    pub fn is_required(&self) -> bool {
        self.level != DurabilityLevel::None
    }

    /// Writes the framing extra for this requirement.
    ///
    /// Layout: one byte `(id << 4) | len`, the level byte and, when a timeout is
    /// set, the timeout in milliseconds as a big-endian `u16` (saturating).
    pub fn write_framing_extra(&self, dst: &mut BytesMut) {
        if !self.is_required() {
            return;
        }
        match self.timeout {
            Some(timeout) => {
                let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
                dst.put_u8((FRAMING_EXTRA_DURABILITY << 4) | 3);
                dst.put_u8(self.level.value());
                dst.put_u16(millis);
            }
            None => {
                dst.put_u8((FRAMING_EXTRA_DURABILITY << 4) | 1);
                dst.put_u8(self.level.value());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_wire_values() {
        assert_eq!(DurabilityLevel::None.value(), 0x00);
        assert_eq!(DurabilityLevel::Majority.value(), 0x01);
        assert_eq!(DurabilityLevel::MajorityAndPersistToActive.value(), 0x02);
        assert_eq!(DurabilityLevel::PersistToMajority.value(), 0x03);
        assert_eq!(DurabilityLevel::from_value(0x04), None);
    }

    #[test]
    fn test_no_framing_extra_without_level() {
        let mut buf = BytesMut::new();
        DurabilityRequirement::default().write_framing_extra(&mut buf);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_framing_extra_without_timeout() {
        let mut buf = BytesMut::new();
        DurabilityRequirement::new(DurabilityLevel::Majority).write_framing_extra(&mut buf);
        assert_eq!(&buf[..], &[0x11, 0x01]);
    }

    #[test]
    fn test_framing_extra_with_timeout() {
        let mut buf = BytesMut::new();
        DurabilityRequirement::new(DurabilityLevel::PersistToMajority)
            .with_timeout(Duration::from_millis(1500))
            .write_framing_extra(&mut buf);
        assert_eq!(&buf[..], &[0x13, 0x03, 0x05, 0xdc]);
    }

    #[test]
    fn test_framing_extra_timeout_saturates() {
        let mut buf = BytesMut::new();
        DurabilityRequirement::new(DurabilityLevel::Majority)
            .with_timeout(Duration::from_secs(3600))
            .write_framing_extra(&mut buf);
        assert_eq!(&buf[2..], &[0xff, 0xff]);
    }
}
