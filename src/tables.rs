//! [`SubscriptionTables`]: both directions of subscription state plus the
//! peer capability-tree mirror.

use crate::id::{PeerId, SignalId};
use crate::tree::CapabilityTree;
use std::collections::BTreeMap;

/// Tracks, per remote emitter id, which of our local parameters are fed by
/// it. A `None` local receiver id means "deliver to the callback only,
/// apply to no local parameter".
#[derive(Default)]
pub struct SubscriptionTables {
    inbound: BTreeMap<PeerId, BTreeMap<Option<SignalId>, Vec<Option<SignalId>>>>,
    monitor_out: Vec<PeerId>,
    peers_caps: BTreeMap<PeerId, CapabilityTree>,
}

impl SubscriptionTables {
    /// Builds empty subscription tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `local_recv_sig_id` is fed by `(emit_peer,
    /// emit_sig_id)`. Idempotent: a duplicate pair is not re-inserted.
    pub fn add_inbound(
        &mut self,
        emit_peer: PeerId,
        emit_sig_id: Option<SignalId>,
        local_recv_sig_id: Option<SignalId>,
    ) {
        let receivers = self
            .inbound
            .entry(emit_peer)
            .or_default()
            .entry(emit_sig_id)
            .or_default();
        if !receivers.contains(&local_recv_sig_id) {
            receivers.push(local_recv_sig_id);
        }
    }

    /// Removes `local_recv_sig_id` from `(emit_peer, emit_sig_id)`'s
    /// receiver list, pruning now-empty maps/entries. Idempotent.
    pub fn remove_inbound(
        &mut self,
        emit_peer: PeerId,
        emit_sig_id: Option<SignalId>,
        local_recv_sig_id: Option<SignalId>,
    ) {
        if let Some(by_sig) = self.inbound.get_mut(&emit_peer) {
            if let Some(receivers) = by_sig.get_mut(&emit_sig_id) {
                receivers.retain(|r| *r != local_recv_sig_id);
                if receivers.is_empty() {
                    by_sig.remove(&emit_sig_id);
                }
            }
            if by_sig.is_empty() {
                self.inbound.remove(&emit_peer);
            }
        }
    }

    /// Local receivers currently fed by `(emit_peer, emit_sig_id)`.
    pub fn inbound_receivers(
        &self,
        emit_peer: PeerId,
        emit_sig_id: Option<SignalId>,
    ) -> &[Option<SignalId>] {
        self.inbound
            .get(&emit_peer)
            .and_then(|by_sig| by_sig.get(&emit_sig_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True if any local parameter is fed by something from `emit_peer`.
    pub fn has_inbound_from(&self, emit_peer: PeerId) -> bool {
        self.inbound.contains_key(&emit_peer)
    }

    /// The peers currently monitoring this node's whole capability tree.
    pub fn monitor_out(&self) -> &[PeerId] {
        &self.monitor_out
    }

    /// Adds `peer` as a whole-node monitor. Idempotent.
    pub fn add_monitor(&mut self, peer: PeerId) {
        if !self.monitor_out.contains(&peer) {
            self.monitor_out.push(peer);
        }
    }

    /// Removes `peer` from the monitor list. Idempotent.
    pub fn remove_monitor(&mut self, peer: PeerId) {
        self.monitor_out.retain(|p| *p != peer);
    }

    /// True if `peer` is a whole-node monitor.
    pub fn is_monitor(&self, peer: PeerId) -> bool {
        self.monitor_out.contains(&peer)
    }

    /// The cached mirror of `peer`'s capability tree, if known.
    pub fn peer_caps(&self, peer: PeerId) -> Option<&CapabilityTree> {
        self.peers_caps.get(&peer)
    }

    /// Mutably borrows the cached mirror of `peer`'s capability tree,
    /// creating an empty one if this is the first time it's seen.
    pub fn peer_caps_mut(&mut self, peer: PeerId) -> &mut CapabilityTree {
        self.peers_caps.entry(peer).or_default()
    }

    /// Registers `peer` with an empty capability-tree mirror if not already
    /// tracked.
    pub fn insert_peer(&mut self, peer: PeerId) {
        self.peers_caps.entry(peer).or_default();
    }

    /// Peer EXIT garbage collection: drops the peer's capability mirror
    /// and every inbound subscription fed by it. The caller is separately
    /// responsible for removing the peer from every local emitter's
    /// `subscribers` and from `monitor_out`.
    pub fn remove_peer(&mut self, peer: PeerId) {
        self.peers_caps.remove(&peer);
        self.inbound.remove(&peer);
        self.monitor_out.retain(|p| *p != peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(b: u8) -> PeerId {
        PeerId::new([b; 16])
    }

    #[test]
    fn sub_then_unsub_restores_empty_state() {
        let mut tables = SubscriptionTables::new();
        let e = peer(1);
        tables.add_inbound(e, Some(SignalId(0)), Some(SignalId(0)));
        assert!(tables.has_inbound_from(e));
        tables.remove_inbound(e, Some(SignalId(0)), Some(SignalId(0)));
        assert!(!tables.has_inbound_from(e));
    }

    #[test]
    fn monitor_add_is_idempotent() {
        let mut tables = SubscriptionTables::new();
        let m = peer(9);
        tables.add_monitor(m);
        tables.add_monitor(m);
        assert_eq!(tables.monitor_out().len(), 1);
    }

    #[test]
    fn peer_exit_drops_mirror_and_inbound() {
        let mut tables = SubscriptionTables::new();
        let e = peer(1);
        tables.insert_peer(e);
        tables.add_inbound(e, None, None);
        tables.add_monitor(e);
        tables.remove_peer(e);
        assert!(tables.peer_caps(e).is_none());
        assert!(!tables.has_inbound_from(e));
        assert!(!tables.is_monitor(e));
    }
}
