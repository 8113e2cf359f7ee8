use crate::ident::Id;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A peer in the ring.
///
/// Immutable after construction: the identifier is a pure function of the
/// address and port and never changes for the peer's lifetime. The same
/// descriptor is shared by reference from predecessor, successor, and finger
/// slots, so the ring's natural cycles never imply ownership of one node by
/// another.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub id: Id,
    pub address: String,
    pub port: u16,
}

impl PeerInfo {
    /// Builds a descriptor with an explicit identifier. Normal construction
    /// goes through [`PeerInfo::from_endpoint`]; this exists for tests that
    /// need to place a peer at a chosen point on the ring.
    pub fn new(id: Id, address: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            address: address.into(),
            port,
        }
    }

    pub fn from_endpoint(address: &str, port: u16) -> Self {
        Self {
            id: Id::for_endpoint(address, port),
            address: address.to_string(),
            port,
        }
    }

    /// Parses the ASCII `"address:port"` form used on the wire.
    pub fn parse(endpoint: &str) -> Option<Self> {
        let (address, port) = endpoint.rsplit_once(':')?;
        if address.is_empty() {
            return None;
        }
        let port: u16 = port.parse().ok()?;
        Some(Self::from_endpoint(address, port))
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

// Equality and hashing are by identifier only.
impl PartialEq for PeerInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PeerInfo {}

impl Hash for PeerInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} [{}..]", self.address, self.port, self.id.short())
    }
}
