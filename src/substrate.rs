//! The peer-discovery/group-messaging substrate the control plane relies
//! on. This module defines the trait the rest of the crate treats as an
//! external collaborator; [`crate::net`] provides a concrete libp2p-backed
//! implementation and [`mock`] a deterministic in-memory one used by this
//! crate's own tests.

use crate::id::PeerId;
use async_trait::async_trait;

/// One event delivered from the substrate's inbox.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InboxEvent {
    /// A peer became visible on the network.
    Enter {
        /// The peer that entered.
        peer: PeerId,
        /// The peer's display name.
        name: String,
    },
    /// A peer dropped off the network.
    Exit {
        /// The peer that exited.
        peer: PeerId,
        /// The peer's display name.
        name: String,
    },
    /// A peer joined a group.
    Join {
        /// The peer that joined.
        peer: PeerId,
        /// The peer's display name.
        name: String,
        /// The group it joined.
        group: String,
    },
    /// A peer left a group.
    Leave {
        /// The peer that left.
        peer: PeerId,
        /// The peer's display name.
        name: String,
        /// The group it left.
        group: String,
    },
    /// A group broadcast payload from a peer.
    Shout {
        /// The sending peer.
        peer: PeerId,
        /// The sender's display name.
        name: String,
        /// The group it was sent to.
        group: String,
        /// The raw payload.
        payload: Vec<u8>,
    },
    /// A direct (peer-to-peer) payload.
    Whisper {
        /// The sending peer.
        peer: PeerId,
        /// The sender's display name.
        name: String,
        /// The raw payload.
        payload: Vec<u8>,
    },
}

/// The abstract peer-discovery/group-messaging substrate a node runs over.
/// A `Node` is generic over this trait and never assumes a particular
/// transport.
#[async_trait(?Send)]
pub trait Substrate {
    /// Starts the substrate (discovery, listeners, etc).
    fn start(&mut self) -> anyhow::Result<()>;
    /// Stops the substrate, disconnecting from the network.
    fn stop(&mut self) -> anyhow::Result<()>;

    /// Sets this node's advertised display name.
    fn set_name(&mut self, name: &str);
    /// Returns this node's advertised display name.
    fn get_name(&self) -> &str;
    /// Returns this node's own peer id.
    fn get_uuid(&self) -> PeerId;

    /// Sets a header value advertised to peers, e.g. the protocol version.
    fn set_header(&mut self, key: &str, value: &str);
    /// Reads a header value advertised by `peer`, if known.
    fn get_peer_header_value(&self, peer: PeerId, key: &str) -> Option<String>;

    /// Joins a named group.
    fn join(&mut self, group: &str) -> anyhow::Result<()>;
    /// Returns the groups this node has joined.
    fn get_own_groups(&self) -> Vec<String>;
    /// Returns the groups `peer` is known to have joined.
    fn get_peer_groups(&self, peer: PeerId) -> Vec<String>;

    /// Sends a payload directly to `peer`.
    fn whisper(&mut self, peer: PeerId, bytes: Vec<u8>) -> anyhow::Result<()>;
    /// Broadcasts a payload to every member of `group`.
    fn shout(&mut self, group: &str, bytes: Vec<u8>) -> anyhow::Result<()>;

    /// Returns the next inbox event if one is immediately available,
    /// `None` otherwise. `Node::run`/`run_once` poll this in a loop so a
    /// real implementation may treat a `None` as "nothing pending right
    /// now" rather than "end of stream".
    async fn recv(&mut self) -> Option<InboxEvent>;
}

/// A deterministic, in-process [`Substrate`] used by this crate's own
/// tests. Every node sharing a [`mock::Hub`] behaves as if it were on the
/// same local network.
pub mod mock {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet, VecDeque};
    use std::rc::Rc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct HubInner {
        members: BTreeMap<PeerId, (String, BTreeSet<String>, BTreeMap<String, String>)>,
        queues: BTreeMap<PeerId, VecDeque<InboxEvent>>,
    }

    /// Shared message hub binding together every [`MockSubstrate`] created
    /// from it, standing in for the local network.
    #[derive(Clone, Default)]
    pub struct Hub(Rc<Mutex<HubInner>>);

    impl Hub {
        /// Builds an empty hub with no members.
        pub fn new() -> Self {
            Self::default()
        }

        /// Creates a node and simulates ENTER for every peer already on
        /// the hub (in both directions), then adds it to the membership
        /// table and joins it to `"OCP"`.
        pub fn join(&self, peer: PeerId, name: &str) -> MockSubstrate {
            let mut inner = self.0.lock().unwrap();
            for (other, (other_name, _, _)) in inner.members.iter() {
                inner
                    .queues
                    .entry(*other)
                    .or_default()
                    .push_back(InboxEvent::Enter {
                        peer,
                        name: name.to_string(),
                    });
                inner
                    .queues
                    .entry(peer)
                    .or_default()
                    .push_back(InboxEvent::Enter {
                        peer: *other,
                        name: other_name.clone(),
                    });
            }
            inner
                .members
                .insert(peer, (name.to_string(), BTreeSet::new(), BTreeMap::new()));
            inner.queues.entry(peer).or_default();
            drop(inner);
            MockSubstrate {
                hub: self.clone(),
                id: peer,
                name: name.to_string(),
            }
        }
    }

    /// A single node's view of a [`Hub`].
    pub struct MockSubstrate {
        hub: Hub,
        id: PeerId,
        name: String,
    }

    impl MockSubstrate {
        /// Simulates this node leaving the network: delivers EXIT to every
        /// other member.
        pub fn leave(&mut self) {
            let mut inner = self.hub.0.lock().unwrap();
            inner.members.remove(&self.id);
            let name = self.name.clone();
            let id = self.id;
            for (other, _) in inner.members.clone() {
                inner
                    .queues
                    .entry(other)
                    .or_default()
                    .push_back(InboxEvent::Exit {
                        peer: id,
                        name: name.clone(),
                    });
            }
        }
    }

    #[async_trait(?Send)]
    impl Substrate for MockSubstrate {
        fn start(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn stop(&mut self) -> anyhow::Result<()> {
            self.leave();
            Ok(())
        }

        fn set_name(&mut self, name: &str) {
            self.name = name.to_string();
        }

        fn get_name(&self) -> &str {
            &self.name
        }

        fn get_uuid(&self) -> PeerId {
            self.id
        }

        fn set_header(&mut self, key: &str, value: &str) {
            let mut inner = self.hub.0.lock().unwrap();
            if let Some((_, _, headers)) = inner.members.get_mut(&self.id) {
                headers.insert(key.to_string(), value.to_string());
            }
        }

        fn get_peer_header_value(&self, peer: PeerId, key: &str) -> Option<String> {
            let inner = self.hub.0.lock().unwrap();
            inner.members.get(&peer)?.2.get(key).cloned()
        }

        fn join(&mut self, group: &str) -> anyhow::Result<()> {
            let mut inner = self.hub.0.lock().unwrap();
            if let Some((_, groups, _)) = inner.members.get_mut(&self.id) {
                groups.insert(group.to_string());
            }
            Ok(())
        }

        fn get_own_groups(&self) -> Vec<String> {
            let inner = self.hub.0.lock().unwrap();
            inner
                .members
                .get(&self.id)
                .map(|(_, groups, _)| groups.iter().cloned().collect())
                .unwrap_or_default()
        }

        fn get_peer_groups(&self, peer: PeerId) -> Vec<String> {
            let inner = self.hub.0.lock().unwrap();
            inner
                .members
                .get(&peer)
                .map(|(_, groups, _)| groups.iter().cloned().collect())
                .unwrap_or_default()
        }

        fn whisper(&mut self, peer: PeerId, bytes: Vec<u8>) -> anyhow::Result<()> {
            let mut inner = self.hub.0.lock().unwrap();
            inner
                .queues
                .entry(peer)
                .or_default()
                .push_back(InboxEvent::Whisper {
                    peer: self.id,
                    name: self.name.clone(),
                    payload: bytes,
                });
            Ok(())
        }

        fn shout(&mut self, group: &str, bytes: Vec<u8>) -> anyhow::Result<()> {
            let mut inner = self.hub.0.lock().unwrap();
            let targets: Vec<PeerId> = inner
                .members
                .iter()
                .filter(|(peer, (_, groups, _))| **peer != self.id && groups.contains(group))
                .map(|(peer, _)| *peer)
                .collect();
            for target in targets {
                inner
                    .queues
                    .entry(target)
                    .or_default()
                    .push_back(InboxEvent::Shout {
                        peer: self.id,
                        name: self.name.clone(),
                        group: group.to_string(),
                        payload: bytes.clone(),
                    });
            }
            Ok(())
        }

        async fn recv(&mut self) -> Option<InboxEvent> {
            let mut inner = self.hub.0.lock().unwrap();
            inner.queues.get_mut(&self.id)?.pop_front()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::Hub;
    use super::*;

    #[async_std::test]
    async fn enter_is_delivered_both_ways() {
        let hub = Hub::new();
        let mut n1 = hub.join(PeerId::new([1; 16]), "n1");
        let mut n2 = hub.join(PeerId::new([2; 16]), "n2");
        assert_eq!(
            n2.recv().await,
            Some(InboxEvent::Enter {
                peer: PeerId::new([1; 16]),
                name: "n1".into(),
            })
        );
        assert!(n1.recv().await.is_none());
        n1.whisper(PeerId::new([2; 16]), b"hi".to_vec()).unwrap();
        assert_eq!(
            n2.recv().await,
            Some(InboxEvent::Whisper {
                peer: PeerId::new([1; 16]),
                name: "n1".into(),
                payload: b"hi".to_vec(),
            })
        );
    }
}
