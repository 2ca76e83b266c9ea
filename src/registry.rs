use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw peer descriptor as supplied in [`crate::ClusterConfig::peers`].
///
/// Unlike [`Peer`], a descriptor has not yet been validated — the
/// [`Registry`] constructor is responsible for rejecting malformed entries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerDescriptor {
    pub host: String,
    pub port: u16,
    pub identifier: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A validated, immutable peer in the cluster.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Peer {
    pub host: String,
    pub port: u16,
    pub identifier: String,
    pub metadata: Map<String, Value>,
}

impl Peer {
    fn from_descriptor(descriptor: PeerDescriptor) -> Option<Self> {
        if descriptor.host.is_empty() || descriptor.port == 0 || descriptor.identifier.is_empty() {
            return None;
        }
        Some(Self {
            host: descriptor.host,
            port: descriptor.port,
            identifier: descriptor.identifier,
            metadata: descriptor.metadata,
        })
    }
}

/// An ordered, immutable set of peers with unique identifiers.
///
/// Built once at startup from raw [`PeerDescriptor`]s; invalid or duplicate
/// entries are logged and dropped rather than failing construction.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    peers: Vec<Peer>,
}

impl Registry {
    pub fn new(descriptors: Vec<PeerDescriptor>) -> Self {
        let mut peers: Vec<Peer> = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let raw_identifier = descriptor.identifier.clone();
            let peer = match Peer::from_descriptor(descriptor) {
                Some(peer) => peer,
                None => {
                    tracing::warn!(identifier = %raw_identifier, "dropping invalid peer descriptor");
                    continue;
                }
            };
            if peers.iter().any(|existing| existing.identifier == peer.identifier) {
                tracing::warn!(identifier = %peer.identifier, "dropping duplicate peer identifier");
                continue;
            }
            peers.push(peer);
        }
        tracing::debug!(count = peers.len(), "registry constructed");
        Self { peers }
    }

    /// Ordered iteration over the registered peers.
    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }

    pub fn count(&self) -> usize {
        self.peers.len()
    }

    pub fn find_by_identifier(&self, identifier: &str) -> Option<&Peer> {
        self.peers.iter().find(|peer| peer.identifier == identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(identifier: &str) -> PeerDescriptor {
        PeerDescriptor {
            host: "127.0.0.1".into(),
            port: 9000,
            identifier: identifier.into(),
            metadata: Map::new(),
        }
    }

    #[test]
    fn drops_invalid_and_duplicate_peers() {
        let registry = Registry::new(vec![
            descriptor("a"),
            descriptor("a"),
            PeerDescriptor {
                host: String::new(),
                port: 9000,
                identifier: "b".into(),
                metadata: Map::new(),
            },
            PeerDescriptor {
                host: "127.0.0.1".into(),
                port: 0,
                identifier: "c".into(),
                metadata: Map::new(),
            },
            descriptor("d"),
        ]);

        assert_eq!(registry.count(), 2);
        assert!(registry.find_by_identifier("a").is_some());
        assert!(registry.find_by_identifier("d").is_some());
        assert!(registry.find_by_identifier("b").is_none());
        assert!(registry.find_by_identifier("c").is_none());
    }

    #[test]
    fn lookup_and_count_are_consistent_with_ordering() {
        let registry = Registry::new(vec![descriptor("a"), descriptor("b"), descriptor("c")]);
        let identifiers: Vec<_> = registry.peers().map(|p| p.identifier.clone()).collect();
        assert_eq!(identifiers, vec!["a", "b", "c"]);
        assert_eq!(registry.count(), 3);
    }

    #[test]
    fn empty_registry_is_valid() {
        let registry = Registry::new(vec![]);
        assert_eq!(registry.count(), 0);
        assert!(registry.find_by_identifier("anything").is_none());
    }
}
