//! User-overridable event callbacks for peer and capability-tree activity.
//!
//! Every callback has a default implementation that just logs at `debug`,
//! so an application only overrides the ones it cares about.

use crate::id::PeerId;
use serde_json::{Map, Value as Json};

/// Event callbacks a [`crate::node::Node`] invokes as it processes inbox
/// events and local mutations. All methods have logging-only defaults.
pub trait Callbacks {
    /// A peer became visible on the network.
    fn on_peer_enter(&mut self, peer: PeerId, name: &str) {
        tracing::debug!("ENTER: {}", name);
    }

    /// A peer dropped off the network.
    fn on_peer_exit(&mut self, peer: PeerId, name: &str) {
        tracing::debug!("EXIT: {}", name);
        let _ = peer;
    }

    /// A peer joined a group.
    fn on_peer_join(&mut self, peer: PeerId, name: &str, group: &str) {
        tracing::debug!("JOIN: {} joined {}", name, group);
        let _ = peer;
    }

    /// A peer left a group.
    fn on_peer_leave(&mut self, peer: PeerId, name: &str, group: &str) {
        tracing::debug!("LEAVE: {} left {}", name, group);
        let _ = peer;
    }

    /// A free-form direct payload arrived from a peer.
    fn on_peer_whisper(&mut self, peer: PeerId, name: &str, data: &[u8]) {
        tracing::debug!("WHISPER from {}: {} bytes", name, data.len());
        let _ = peer;
    }

    /// A free-form group payload arrived from a peer.
    fn on_peer_shout(&mut self, peer: PeerId, name: &str, group: &str, data: &[u8]) {
        tracing::debug!("SHOUT from {} in {}: {} bytes", name, group, data.len());
        let _ = peer;
    }

    /// A peer's capability tree changed, per its `MOD` frame.
    fn on_peer_modified(&mut self, peer: PeerId, name: &str, data: &Map<String, Json>) {
        tracing::debug!("MODIFIED by {}: {:?}", name, data);
        let _ = peer;
    }

    /// A peer sent a `REP` frame (currently reserved; no-op by default).
    fn on_peer_replied(&mut self, peer: PeerId, name: &str, data: &Json) {
        tracing::debug!("REPLIED by {}: {:?}", name, data);
        let _ = peer;
    }

    /// A peer subscribed to one of our emitters.
    fn on_peer_subscribed(&mut self, peer: PeerId, name: &str) {
        tracing::debug!("SUBSCRIBED by {}", name);
        let _ = peer;
    }

    /// A peer unsubscribed from one of our emitters.
    fn on_peer_unsubscribed(&mut self, peer: PeerId, name: &str) {
        tracing::debug!("UNSUBSCRIBED by {}", name);
        let _ = peer;
    }

    /// A subscribed-to peer emitted a new value.
    fn on_peer_signaled(&mut self, peer: PeerId, name: &str, sig_id: u32, value: &Json) {
        tracing::debug!("SIGNALED by {}: {} = {:?}", name, sig_id, value);
        let _ = peer;
    }

    /// Invoked on every local mutation, whether made by us (`peer == None`)
    /// or merged in from a peer (`SET`).
    fn on_modified(&mut self, peer: Option<PeerId>, name: Option<&str>, data: &Json) {
        match (peer, name) {
            (Some(_), Some(name)) => tracing::debug!("modified by {}: {:?}", name, data),
            (Some(peer), None) => tracing::debug!("modified by {}: {:?}", peer, data),
            _ => tracing::debug!("modified by self: {:?}", data),
        }
    }
}

/// A [`Callbacks`] implementation that only logs, for applications that
/// don't need custom event handling.
#[derive(Default)]
pub struct NoopCallbacks;

impl Callbacks for NoopCallbacks {}
