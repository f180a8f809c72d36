//! [`Node`]: composes the registry, capability tree, subscription tables and
//! protocol codec over a [`Substrate`], and owns the poll loop.

use crate::callbacks::{Callbacks, NoopCallbacks};
use crate::config::{NodeConfig, HEADER_KEY, HEADER_VALUE, PROTOCOL_VERSION};
use crate::error::Error;
use crate::id::{PeerId, SignalId};
use crate::parameter::Parameter;
use crate::protocol::{ControlMessage, SubQuad};
use crate::registry::ParameterRegistry;
use crate::substrate::{InboxEvent, Substrate};
use crate::tables::SubscriptionTables;
use crate::tree::{dict_set, wrap_path, CapabilityTree};
use crate::value::{Access, Bounds, Value};
use serde_json::{Map, Value as Json};
use std::time::Duration;

/// A ZOCP/OCP node: one capability tree, one registry, one subscription
/// table set, talking over one [`Substrate`].
///
/// `C` defaults to [`NoopCallbacks`] so a caller that only needs the
/// control-plane side effects (no app-level hooks) can write `Node<S>`.
pub struct Node<S: Substrate, C: Callbacks = NoopCallbacks> {
    substrate: S,
    callbacks: C,
    registry: ParameterRegistry,
    tree: CapabilityTree,
    tables: SubscriptionTables,
    by_name: std::collections::HashMap<String, SignalId>,
    cur_obj_path: Vec<String>,
    running: bool,
}

impl<S: Substrate, C: Callbacks> Node<S, C> {
    /// Builds a node from `config` over the given (already constructed)
    /// substrate and callbacks, seeding the capability tree from
    /// `config`'s initial mapping if one was given.
    pub fn new(config: NodeConfig, mut substrate: S, callbacks: C) -> anyhow::Result<Self> {
        substrate.set_name(&config.name);
        substrate.set_header(HEADER_KEY, HEADER_VALUE);
        substrate.start()?;
        substrate.join(&config.group)?;

        let mut tree = CapabilityTree::new();
        tree.as_map_mut().insert(
            "_zocp_version".into(),
            Json::String(PROTOCOL_VERSION.into()),
        );
        if let Some(initial) = config.initial.clone() {
            tree.merge(&initial);
        }

        Ok(Self {
            substrate,
            callbacks,
            registry: ParameterRegistry::new(),
            tree,
            tables: SubscriptionTables::new(),
            by_name: std::collections::HashMap::new(),
            cur_obj_path: Vec::new(),
            running: false,
        })
    }

    /// This node's own peer id, as assigned by the substrate.
    pub fn id(&self) -> PeerId {
        self.substrate.get_uuid()
    }

    /// This node's own display name, as advertised to the substrate.
    pub fn name(&self) -> &str {
        self.substrate.get_name()
    }

    /// The node's own capability tree, as it would be seen by a peer.
    pub fn get_capabilities(&self) -> &CapabilityTree {
        &self.tree
    }

    /// Looks up a registered parameter by its signal id.
    pub fn get_parameter(&self, id: SignalId) -> Option<&Parameter> {
        self.registry.get(id)
    }

    /// Looks up a registered parameter by its capability-tree name.
    pub fn get_parameter_by_name(&self, name: &str) -> Option<&Parameter> {
        self.by_name.get(name).and_then(|id| self.registry.get(*id))
    }

    /// Enters a named structural subtree (`objects/<name>`); subsequent
    /// `register_*` calls project their parameter under this path, until
    /// the next [`Node::set_object`]`(None)` / a fresh [`Node::set_object`]
    /// resets the context.
    pub fn set_object(&mut self, name: Option<&str>) {
        match name {
            None => self.cur_obj_path.clear(),
            Some(name) => self.cur_obj_path = vec!["objects".into(), name.into()],
        }
    }

    fn register_param(
        &mut self,
        name: &str,
        value: Value,
        access: Access,
        bounds: Option<Bounds>,
    ) -> SignalId {
        let mut object_path = self.cur_obj_path.clone();
        object_path.push(name.to_string());
        let param = Parameter::new(name.to_string(), value, access, bounds, object_path.clone());
        let id = self.registry.insert(param);
        self.by_name.insert(name.to_string(), id);

        let dict = self.registry.get(id).expect("just inserted").to_dict();
        dict_set(self.tree.as_map_mut(), &object_path, dict.clone())
            .expect("object_path is freshly built, every intermediate is an object");

        let mut delta = Map::new();
        delta.insert(name.to_string(), dict);
        self.on_modified(Json::Object(delta), &object_path, None);
        id
    }

    /// Registers an integer parameter under the current object scope.
    /// `access` is parsed as an `"rwes"`-style flag string.
    pub fn register_int(&mut self, name: &str, v: i64, access: &str, bounds: Option<Bounds>) -> SignalId {
        self.register_param(name, Value::Int(v), Access::parse(access), bounds)
    }

    /// Registers a floating-point parameter under the current object scope.
    pub fn register_float(&mut self, name: &str, v: f64, access: &str, bounds: Option<Bounds>) -> SignalId {
        self.register_param(name, Value::Float(v), Access::parse(access), bounds)
    }

    /// Registers a 0–100 percentage parameter under the current object scope.
    pub fn register_percent(&mut self, name: &str, v: u8, access: &str, bounds: Option<Bounds>) -> SignalId {
        self.register_param(name, Value::Percent(v), Access::parse(access), bounds)
    }

    /// Registers a boolean parameter under the current object scope.
    pub fn register_bool(&mut self, name: &str, v: bool, access: &str) -> SignalId {
        self.register_param(name, Value::Bool(v), Access::parse(access), None)
    }

    /// Registers a string parameter under the current object scope.
    pub fn register_string(&mut self, name: &str, v: impl Into<String>, access: &str) -> SignalId {
        self.register_param(name, Value::Str(v.into()), Access::parse(access), None)
    }

    /// Registers a 2-component float vector parameter under the current
    /// object scope.
    pub fn register_vec2f(&mut self, name: &str, v: [f64; 2], access: &str, bounds: Option<Bounds>) -> SignalId {
        self.register_param(name, Value::Vec2f(v), Access::parse(access), bounds)
    }

    /// Registers a 3-component float vector parameter under the current
    /// object scope.
    pub fn register_vec3f(&mut self, name: &str, v: [f64; 3], access: &str, bounds: Option<Bounds>) -> SignalId {
        self.register_param(name, Value::Vec3f(v), Access::parse(access), bounds)
    }

    /// Registers a 4-component float vector parameter under the current
    /// object scope.
    pub fn register_vec4f(&mut self, name: &str, v: [f64; 4], access: &str, bounds: Option<Bounds>) -> SignalId {
        self.register_param(name, Value::Vec4f(v), Access::parse(access), bounds)
    }

    /// Removes a registered parameter, freeing its signal id and
    /// dropping it from the capability tree.
    pub fn remove_parameter(&mut self, id: SignalId) {
        if let Some(param) = self.registry.remove(id) {
            self.by_name.remove(param.name());
            // Structural (`objects/<name>/...`) leaves are left in the tree;
            // only a root-level parameter is pruned here.
            if param.object_path().len() == 1 {
                self.tree.as_map_mut().remove(param.name());
            }
        }
    }

    /// Sets a parameter's value by signal id, fanning out to explicit
    /// subscribers and then monitors if it is an emitter.
    pub fn set_value(&mut self, id: SignalId, value: Value) -> Result<(), Error> {
        let fanout = self
            .registry
            .get_mut(id)
            .ok_or(Error::SignalIdNotFound(id))?
            .set(value);
        if let Some(fanout) = fanout {
            let bytes = fanout.message.encode();
            for peer in &fanout.subscribers {
                self.substrate.whisper(*peer, bytes.clone()).ok();
            }
            for peer in self.tables.monitor_out().to_vec() {
                self.substrate.whisper(peer, bytes.clone()).ok();
            }
        }
        Ok(())
    }

    /// Sets the node's reserved `_location` root key and notifies monitors.
    pub fn set_node_location(&mut self, location: [f64; 3]) {
        self.set_reserved("_location", Value::Vec3f(location));
    }

    /// Sets the node's reserved `_orientation` root key and notifies monitors.
    pub fn set_node_orientation(&mut self, orientation: [f64; 3]) {
        self.set_reserved("_orientation", Value::Vec3f(orientation));
    }

    /// Sets the node's reserved `_scale` root key and notifies monitors.
    pub fn set_node_scale(&mut self, scale: [f64; 3]) {
        self.set_reserved("_scale", Value::Vec3f(scale));
    }

    /// Sets the node's reserved `_matrix` root key (a 4x4 transform, row
    /// major) and notifies monitors.
    pub fn set_node_matrix(&mut self, matrix: [[f64; 4]; 4]) {
        let rows: Vec<Vec<f64>> = matrix.iter().map(|r| r.to_vec()).collect();
        self.set_reserved("_matrix", Value::Matrix(rows));
    }

    fn set_reserved(&mut self, key: &str, value: Value) {
        let json = serde_json::to_value(&value).unwrap_or(Json::Null);
        self.tree.as_map_mut().insert(key.into(), json.clone());
        let mut delta = Map::new();
        delta.insert(key.into(), json);
        self.on_modified(Json::Object(delta), &[key.to_string()], None);
    }

    /// Sends a GET request to `peer`, asking for its whole capability tree
    /// (`keys = None`) or just the named root keys.
    pub fn peer_get(&mut self, peer: PeerId, keys: Option<Vec<String>>) {
        self.whisper(peer, ControlMessage::Get(keys));
    }

    /// Sends a SET request to `peer`, asking it to merge `data` into its
    /// capability tree.
    pub fn peer_set(&mut self, peer: PeerId, data: Map<String, Json>) {
        self.whisper(peer, ControlMessage::Set(data));
    }

    /// Sends a CALL request to `peer` invoking `method` with `args`.
    pub fn peer_call(&mut self, peer: PeerId, method: impl Into<String>, args: Vec<Json>) {
        self.whisper(peer, ControlMessage::Call(method.into(), args));
    }

    /// Sends a free-form (non control-message) payload directly, alongside
    /// the GET/SET/SUB/... traffic.
    pub fn peer_whisper(&mut self, peer: PeerId, payload: Vec<u8>) -> Result<(), Error> {
        self.substrate.whisper(peer, payload).map_err(Error::Substrate)
    }

    /// Sends a free-form payload to every peer in `group`.
    pub fn peer_shout(&mut self, group: &str, payload: Vec<u8>) -> Result<(), Error> {
        self.substrate.shout(group, payload).map_err(Error::Substrate)
    }

    fn whisper(&mut self, peer: PeerId, msg: ControlMessage) {
        if let Err(err) = self.substrate.whisper(peer, msg.encode()) {
            tracing::error!("whisper to {} failed: {}", peer, err);
        }
    }

    /// Establishes (or forwards) a subscription via any of the three
    /// initiation paths. `self` may be the receiver, the emitter, or a
    /// third-party initiator relative to `quad`.
    pub fn signal_subscribe(
        &mut self,
        recv_peer: PeerId,
        recv_sig_id: Option<SignalId>,
        emit_peer: PeerId,
        emit_sig_id: Option<SignalId>,
    ) {
        self.route_subscription(
            SubQuad {
                emit_peer,
                emit_sig_id,
                recv_peer,
                recv_sig_id,
            },
            true,
        );
    }

    /// Tears down (or forwards) a subscription via any of the three
    /// initiation paths, mirroring [`Node::signal_subscribe`].
    pub fn signal_unsubscribe(
        &mut self,
        recv_peer: PeerId,
        recv_sig_id: Option<SignalId>,
        emit_peer: PeerId,
        emit_sig_id: Option<SignalId>,
    ) {
        self.route_subscription(
            SubQuad {
                emit_peer,
                emit_sig_id,
                recv_peer,
                recv_sig_id,
            },
            false,
        );
    }

    /// Applies the local half of `quad` (whichever side, if any, is us)
    /// then whispers the frame onward: to the emitter if we are not it, or
    /// to the receiver if we are the emitter and the receiver is remote.
    /// This single routing rule implements all three initiation paths and
    /// their forwarding, since the handler re-enters here with `self` set
    /// to whichever node is currently processing the frame.
    fn route_subscription(&mut self, quad: SubQuad, subscribe: bool) {
        let self_id = self.id();

        if quad.emit_peer == self_id {
            self.apply_local_emitter_side(quad, subscribe);
        }
        if quad.recv_peer == self_id {
            if subscribe {
                self.tables
                    .add_inbound(quad.emit_peer, quad.emit_sig_id, quad.recv_sig_id);
            } else {
                self.tables
                    .remove_inbound(quad.emit_peer, quad.emit_sig_id, quad.recv_sig_id);
            }
        }

        let msg = if subscribe {
            ControlMessage::Sub(quad)
        } else {
            ControlMessage::Unsub(quad)
        };
        if quad.emit_peer != self_id {
            self.whisper(quad.emit_peer, msg);
        } else if quad.recv_peer != self_id {
            self.whisper(quad.recv_peer, msg);
        }
    }

    fn apply_local_emitter_side(&mut self, quad: SubQuad, subscribe: bool) {
        match quad.emit_sig_id {
            None => {
                if subscribe {
                    self.tables.add_monitor(quad.recv_peer);
                } else {
                    self.tables.remove_monitor(quad.recv_peer);
                }
            }
            Some(id) => {
                let delta = if let Some(p) = self.registry.get_mut(id) {
                    if subscribe {
                        p.subscribe_receiver(quad.recv_peer, quad.recv_sig_id)
                    } else {
                        p.unsubscribe_receiver(quad.recv_peer, quad.recv_sig_id)
                    }
                } else {
                    None
                };
                if let Some(delta) = delta {
                    if let Some(p) = self.registry.get(id) {
                        let mut keyed = Map::new();
                        keyed.insert(p.name().to_string(), delta);
                        let path = p.object_path().to_vec();
                        self.on_modified(Json::Object(keyed), &path, None);
                    }
                }
            }
        }
    }

    /// Wraps `delta` along `path` (whose last key must equal `delta`'s own
    /// top-level key; see [`wrap_path`]) and fans the resulting MOD out to
    /// every monitor but `originator`.
    fn on_modified(&mut self, delta: Json, path: &[String], originator: Option<PeerId>) {
        let wrapped = wrap_path(delta, path);
        self.callbacks.on_modified(originator, None, &wrapped);
        if let Json::Object(obj) = &wrapped {
            if obj.is_empty() {
                return;
            }
        }
        let msg = ControlMessage::Mod(match &wrapped {
            Json::Object(m) => m.clone(),
            other => {
                let mut m = Map::new();
                m.insert("_".into(), other.clone());
                m
            }
        })
        .encode();
        for peer in self.tables.monitor_out().to_vec() {
            if Some(peer) != originator {
                self.substrate.whisper(peer, msg.clone()).ok();
            }
        }
    }

    /// One non-blocking poll-and-dispatch iteration. Returns without
    /// blocking if the substrate's inbox currently has nothing pending.
    pub async fn run_once(&mut self, timeout: Option<Duration>) {
        self.running = true;
        let deadline = timeout.map(|t| std::time::Instant::now() + t);
        loop {
            let event = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(std::time::Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    self.substrate.recv().await
                }
                None => self.substrate.recv().await,
            };
            match event {
                Some(ev) => self.dispatch(ev),
                None => break,
            }
        }
    }

    /// Polls and dispatches until [`Node::stop`] is called.
    pub async fn run(&mut self, timeout: Option<Duration>) {
        self.running = true;
        while self.running {
            match self.substrate.recv().await {
                Some(ev) => self.dispatch(ev),
                None => {
                    if let Some(t) = timeout {
                        async_std::task::sleep(t).await;
                    }
                }
            }
        }
        self.substrate.stop().ok();
    }

    /// Signals [`Node::run`]'s loop to exit after its current iteration.
    pub fn stop(&mut self) {
        self.running = false;
    }

    fn dispatch(&mut self, event: InboxEvent) {
        match event {
            InboxEvent::Enter { peer, name } => {
                self.tables.insert_peer(peer);
                self.peer_get(peer, None);
                self.callbacks.on_peer_enter(peer, &name);
            }
            InboxEvent::Exit { peer, name } => {
                self.tables.remove_peer(peer);
                self.remove_peer_from_emitters(peer);
                self.callbacks.on_peer_exit(peer, &name);
            }
            InboxEvent::Join { peer, name, group } => {
                self.callbacks.on_peer_join(peer, &name, &group);
            }
            InboxEvent::Leave { peer, name, group } => {
                self.callbacks.on_peer_leave(peer, &name, &group);
            }
            InboxEvent::Whisper { peer, name, payload } => {
                self.callbacks.on_peer_whisper(peer, &name, &payload);
                self.dispatch_control_message(peer, &name, &payload);
            }
            InboxEvent::Shout {
                peer,
                name,
                group,
                payload,
            } => {
                self.callbacks.on_peer_shout(peer, &name, &group, &payload);
                self.dispatch_control_message(peer, &name, &payload);
            }
        }
    }

    /// Peer EXIT garbage collection of the emitter side: every local
    /// parameter drops the departing peer from its subscriber list.
    fn remove_peer_from_emitters(&mut self, peer: PeerId) {
        for param in self.registry.iter_mut() {
            // A subscriber may be bound with any receiver sig id; sweep
            // every pairing explicitly instead of guessing at `recv_sig_id`.
            let stale: Vec<_> = param
                .subscribers()
                .iter()
                .filter(|(p, _)| *p == peer)
                .cloned()
                .collect();
            for (p, sig) in stale {
                param.unsubscribe_receiver(p, sig);
            }
        }
    }

    fn dispatch_control_message(&mut self, sender: PeerId, name: &str, payload: &[u8]) {
        let msg = match ControlMessage::decode(payload) {
            Ok(msg) => msg,
            Err(err) => {
                tracing::warn!("dropping malformed control frame from {}: {}", name, err);
                return;
            }
        };
        match msg {
            ControlMessage::Get(keys) => self.handle_get(sender, keys),
            ControlMessage::Set(data) => self.handle_set(sender, name, data),
            ControlMessage::Call(method, args) => self.handle_call(sender, method, args),
            ControlMessage::Sub(quad) => self.handle_sub(sender, name, quad),
            ControlMessage::Unsub(quad) => self.handle_unsub(sender, name, quad),
            ControlMessage::Rep(data) => self.handle_rep(sender, name, data),
            ControlMessage::Mod(data) => self.handle_mod(sender, name, data),
            ControlMessage::Sig { sig_id, value } => self.handle_sig(sender, name, sig_id, value),
        }
    }

    fn handle_get(&mut self, sender: PeerId, keys: Option<Vec<String>>) {
        let data = match keys {
            None => self.tree.as_map().clone(),
            Some(keys) => {
                let mut out = Map::new();
                for key in keys {
                    out.insert(key.clone(), self.tree.as_map().get(&key).cloned().unwrap_or(Json::Null));
                }
                out
            }
        };
        self.whisper(sender, ControlMessage::Mod(data));
    }

    fn handle_set(&mut self, sender: PeerId, sender_name: &str, data: Map<String, Json>) {
        self.tree.merge(&data);
        let _ = sender_name;
        self.on_modified(Json::Object(data), &[], Some(sender));
    }

    fn handle_call(&mut self, _sender: PeerId, _method: String, _args: Vec<Json>) {
        // Reserved; no-op.
    }

    fn handle_rep(&mut self, sender: PeerId, name: &str, data: Json) {
        self.callbacks.on_peer_replied(sender, name, &data);
    }

    /// Routing rule: apply locally if we are the emitter and the sender
    /// is the would-be receiver; reject if neither side is us; otherwise
    /// this is a forward request, so re-enter as ourselves.
    fn handle_sub(&mut self, sender: PeerId, name: &str, quad: SubQuad) {
        let self_id = self.id();
        if quad.emit_peer == self_id && quad.recv_peer == sender {
            self.apply_local_emitter_side(quad, true);
            self.callbacks.on_peer_subscribed(sender, name);
        } else if quad.emit_peer != self_id && quad.recv_peer != self_id {
            tracing::warn!("invalid SUB routing from {}: {:?}", name, quad);
        } else {
            self.route_subscription(quad, true);
        }
    }

    fn handle_unsub(&mut self, sender: PeerId, name: &str, quad: SubQuad) {
        let self_id = self.id();
        if quad.emit_peer == self_id && quad.recv_peer == sender {
            self.apply_local_emitter_side(quad, false);
            self.callbacks.on_peer_unsubscribed(sender, name);
        } else if quad.emit_peer != self_id && quad.recv_peer != self_id {
            tracing::warn!("invalid UNSUB routing from {}: {:?}", name, quad);
        } else {
            self.route_subscription(quad, false);
        }
    }

    fn handle_mod(&mut self, sender: PeerId, name: &str, data: Map<String, Json>) {
        self.tables.peer_caps_mut(sender).merge(&data);
        self.callbacks.on_peer_modified(sender, name, &data);
    }

    /// Receiver-side signal propagation: patch the cached peer capability,
    /// then forward to every locally bound receiver whose current value
    /// differs (the inequality gate that prevents reflection loops between
    /// cross-subscribed emitter/receiver pairs).
    fn handle_sig(&mut self, sender: PeerId, name: &str, sig_id: SignalId, value: Value) {
        self.patch_peer_cache(sender, sig_id, &value);

        let mut matched = false;
        if self.tables.has_inbound_from(sender) {
            let receivers = self.tables.inbound_receivers(sender, Some(sig_id)).to_vec();
            let wildcard_receivers = self.tables.inbound_receivers(sender, None).to_vec();
            matched = !receivers.is_empty() || !wildcard_receivers.is_empty() || self.tables.is_monitor(sender);
            for recv_sig_id in receivers.into_iter().chain(wildcard_receivers) {
                if let Some(recv_id) = recv_sig_id {
                    let differs = self
                        .registry
                        .get(recv_id)
                        .map(|p| !p.get().bit_equal(&value))
                        .unwrap_or(false);
                    if differs {
                        self.set_value(recv_id, value.clone()).ok();
                    }
                }
            }
        }
        if matched || self.tables.is_monitor(sender) {
            self.callbacks.on_peer_signaled(sender, name, sig_id.0, &serde_json::to_value(&value).unwrap_or(Json::Null));
        }
    }

    /// Best-effort cache patch: silently drops the update if the emitter id
    /// is unknown in our cached mirror of the sender's tree: handlers must
    /// tolerate unknown emitter ids rather than erroring.
    fn patch_peer_cache(&mut self, sender: PeerId, sig_id: SignalId, value: &Value) {
        let cap = self.tables.peer_caps_mut(sender);
        if let Some(entry) = find_by_sig_id(cap.as_map_mut(), sig_id) {
            entry.insert(
                "value".to_string(),
                serde_json::to_value(value).unwrap_or(Json::Null),
            );
        }
    }
}

/// Depth-first search of a capability-tree mapping for the leaf whose
/// `sig_id` field matches, so [`Node::patch_peer_cache`] can apply a `SIG`
/// without needing the sender's full object path.
fn find_by_sig_id(map: &mut Map<String, Json>, sig_id: SignalId) -> Option<&mut Map<String, Json>> {
    for (_, value) in map.iter_mut() {
        if let Json::Object(obj) = value {
            if obj.get("sig_id").and_then(Json::as_u64) == Some(sig_id.0 as u64) {
                return Some(obj);
            }
        }
    }
    for (_, value) in map.iter_mut() {
        if let Json::Object(obj) = value {
            if let Some(found) = find_by_sig_id(obj, sig_id) {
                return Some(found);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substrate::mock::Hub;

    fn peer(b: u8) -> PeerId {
        PeerId::new([b; 16])
    }

    async fn node(hub: &Hub, id: u8, name: &str) -> Node<crate::substrate::mock::MockSubstrate> {
        let substrate = hub.join(peer(id), name);
        Node::new(NodeConfig::new(name), substrate, NoopCallbacks).unwrap()
    }

    #[async_std::test]
    async fn s2_capability_handshake() {
        let hub = Hub::new();
        let mut n1 = node(&hub, 1, "n1").await;
        let mut n2 = node(&hub, 2, "n2").await;
        n1.register_float("temp", 1.0, "r", None);

        n1.run_once(Some(Duration::from_millis(10))).await;
        n2.run_once(Some(Duration::from_millis(10))).await;
        n1.run_once(Some(Duration::from_millis(10))).await;
        n2.run_once(Some(Duration::from_millis(10))).await;

        assert!(n2
            .tables
            .peer_caps(peer(1))
            .unwrap()
            .as_map()
            .contains_key("temp"));
    }

    #[async_std::test]
    async fn s3_subscribe_and_emit() {
        let hub = Hub::new();
        let mut n1 = node(&hub, 1, "n1").await;
        let mut n2 = node(&hub, 2, "n2").await;
        let emit_id = n1.register_float("TestEmitFloat", 1.0, "rwe", None);
        let recv_id = n2.register_float("TestRecvFloat", 1.0, "rws", None);

        // drain the GET handshake both ways first.
        for _ in 0..4 {
            n1.run_once(Some(Duration::from_millis(5))).await;
            n2.run_once(Some(Duration::from_millis(5))).await;
        }

        n2.signal_subscribe(peer(2), Some(recv_id), peer(1), Some(emit_id));
        n1.run_once(Some(Duration::from_millis(5))).await;
        assert_eq!(
            n1.get_parameter(emit_id).unwrap().subscribers(),
            &[(peer(2), Some(recv_id))]
        );

        n1.set_value(emit_id, Value::Float(2.0)).unwrap();
        n2.run_once(Some(Duration::from_millis(5))).await;
        assert_eq!(n2.get_parameter(recv_id).unwrap().get(), &Value::Float(2.0));
    }

    #[async_std::test]
    async fn s4_unsubscribe_clears_both_sides() {
        let hub = Hub::new();
        let mut n1 = node(&hub, 1, "n1").await;
        let mut n2 = node(&hub, 2, "n2").await;
        let emit_id = n1.register_float("e", 1.0, "rwe", None);
        let recv_id = n2.register_float("r", 1.0, "rws", None);
        for _ in 0..4 {
            n1.run_once(Some(Duration::from_millis(5))).await;
            n2.run_once(Some(Duration::from_millis(5))).await;
        }
        n2.signal_subscribe(peer(2), Some(recv_id), peer(1), Some(emit_id));
        n1.run_once(Some(Duration::from_millis(5))).await;

        n2.signal_unsubscribe(peer(2), Some(recv_id), peer(1), Some(emit_id));
        n1.run_once(Some(Duration::from_millis(5))).await;
        assert!(n1.get_parameter(emit_id).unwrap().subscribers().is_empty());
        assert!(!n2.tables.has_inbound_from(peer(1)));
    }

    #[async_std::test]
    async fn s5_monitor_sees_emitter_keyed_subscriber_delta() {
        let hub = Hub::new();
        let mut n1 = node(&hub, 1, "n1").await;
        let mut n2 = node(&hub, 2, "n2").await;
        let mut m = node(&hub, 3, "m").await;
        let emit_id = n1.register_float("TestEmitFloat", 1.0, "rwe", None);
        let recv_id = n2.register_float("TestRecvFloat", 1.0, "rws", None);

        for _ in 0..6 {
            n1.run_once(Some(Duration::from_millis(5))).await;
            n2.run_once(Some(Duration::from_millis(5))).await;
            m.run_once(Some(Duration::from_millis(5))).await;
        }

        m.signal_subscribe(peer(3), None, peer(1), None);
        n1.run_once(Some(Duration::from_millis(5))).await;
        assert!(n1.tables.is_monitor(peer(3)));

        n2.signal_subscribe(peer(2), Some(recv_id), peer(1), Some(emit_id));
        n1.run_once(Some(Duration::from_millis(5))).await;
        m.run_once(Some(Duration::from_millis(5))).await;

        let caps = m.tables.peer_caps(peer(1)).unwrap().as_map();
        let emitter = caps
            .get("TestEmitFloat")
            .expect("MOD delta must stay keyed under the emitter's own name")
            .as_object()
            .unwrap();
        let subscribers = emitter.get("subscribers").unwrap().as_array().unwrap();
        assert_eq!(subscribers.len(), 1);
    }

    #[async_std::test]
    async fn s6_peer_exit_garbage_collects_subscribers() {
        let hub = Hub::new();
        let mut n1 = node(&hub, 1, "n1").await;
        let mut n2 = node(&hub, 2, "n2").await;
        let emit_id = n1.register_float("e", 1.0, "rwe", None);
        let recv_id = n2.register_float("r", 1.0, "rws", None);
        for _ in 0..4 {
            n1.run_once(Some(Duration::from_millis(5))).await;
            n2.run_once(Some(Duration::from_millis(5))).await;
        }
        n2.signal_subscribe(peer(2), Some(recv_id), peer(1), Some(emit_id));
        n1.run_once(Some(Duration::from_millis(5))).await;
        assert!(!n1.get_parameter(emit_id).unwrap().subscribers().is_empty());

        n2.substrate.leave();
        n1.run_once(Some(Duration::from_millis(5))).await;
        assert!(n1.get_parameter(emit_id).unwrap().subscribers().is_empty());
        assert!(n1.tables.peer_caps(peer(2)).is_none());
    }
}
