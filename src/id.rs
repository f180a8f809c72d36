//! Stable identifiers used throughout the protocol: [`PeerId`] (assigned by
//! the substrate) and [`SignalId`] (assigned by a node's own
//! [`crate::registry::ParameterRegistry`]).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque 128-bit identifier assigned by the substrate to each peer.
///
/// Totally ordered and printable as lowercase hex, matching the way the
/// substrate's own UUIDs are rendered on the wire (`peer_id.hex`).
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerId([u8; 16]);

impl PeerId {
    /// Wraps a raw 16-byte substrate identifier.
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", hex::encode(self.0))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for PeerId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let bytes: [u8; 16] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("peer id must be 16 bytes, got a different length"))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for PeerId {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PeerId> for String {
    fn from(peer: PeerId) -> Self {
        peer.to_string()
    }
}

/// Node-local stable integer identifying a parameter on the wire.
///
/// Dense and recycled by the [`crate::registry::ParameterRegistry`]; a bare
/// `Option<SignalId>` models the protocol's `None` ("unassigned", or
/// "wildcard" in subscription contexts).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalId(
    /// The raw index into the owning registry's slot sequence.
    pub u32,
);

impl SignalId {
    /// Returns the id as a plain index into the registry's slot sequence.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for SignalId {
    fn from(i: usize) -> Self {
        Self(i as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_round_trips_through_hex() {
        let peer = PeerId::new([7u8; 16]);
        let text = peer.to_string();
        assert_eq!(text.parse::<PeerId>().unwrap(), peer);
    }

    #[test]
    fn peer_id_orders_by_bytes() {
        let a = PeerId::new([0u8; 16]);
        let mut b_bytes = [0u8; 16];
        b_bytes[15] = 1;
        let b = PeerId::new(b_bytes);
        assert!(a < b);
    }
}
