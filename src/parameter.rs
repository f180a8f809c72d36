//! [`Parameter`]: one registered value on the local node.

use crate::id::{PeerId, SignalId};
use crate::protocol::ControlMessage;
use crate::value::{Access, Bounds, Value};
use serde_json::{Map, Value as Json};

/// The effect of [`Parameter::set`]: the caller (the owning `Node`) performs
/// the actual whispering, keeping `Parameter` itself free of any reference
/// back to the node.
pub struct Fanout {
    /// The `SIG` frame to whisper to each subscriber.
    pub message: ControlMessage,
    /// Explicit subscribers to whisper the message to, in insertion order.
    pub subscribers: Vec<PeerId>,
}

/// A registered parameter: a value plus (if an emitter) its subscriber list.
///
/// Emitting and non-emitting parameters are a single type with a plain
/// conditional on `access.emitter` inside one `set` method, rather than two
/// code paths glued together at runtime.
#[derive(Clone, Debug)]
pub struct Parameter {
    name: String,
    value: Value,
    access: Access,
    bounds: Bounds,
    sig_id: Option<SignalId>,
    /// Ordered, and a given peer/sig-id pair appears at most once.
    subscribers: Vec<(PeerId, Option<SignalId>)>,
    object_path: Vec<String>,
}

impl Parameter {
    /// Builds a parameter. `object_path` is its full location in the
    /// capability tree, including its own name as the last element.
    pub fn new(
        name: String,
        value: Value,
        access: Access,
        bounds: Option<Bounds>,
        object_path: Vec<String>,
    ) -> Self {
        Self {
            name,
            value,
            access,
            bounds: bounds.unwrap_or_default(),
            sig_id: None,
            subscribers: Vec::new(),
            object_path,
        }
    }

    /// The parameter's name, as it appears as a capability-tree key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parameter's access flags.
    pub fn access(&self) -> Access {
        self.access
    }

    /// The parameter's full location in the capability tree, including its
    /// own name as the last element.
    pub fn object_path(&self) -> &[String] {
        &self.object_path
    }

    /// The parameter's assigned signal id, if it has been registered.
    pub fn sig_id(&self) -> Option<SignalId> {
        self.sig_id
    }

    pub(crate) fn set_sig_id(&mut self, id: Option<SignalId>) {
        self.sig_id = id;
    }

    /// The parameter's current value.
    pub fn get(&self) -> &Value {
        &self.value
    }

    /// The parameter's current explicit subscribers, in insertion order.
    pub fn subscribers(&self) -> &[(PeerId, Option<SignalId>)] {
        &self.subscribers
    }

    /// Assigns `value`. If the parameter is an emitter (`e ∈ access`),
    /// returns the `SIG` fan-out effect the owning node must whisper to
    /// every explicit subscriber and (separately, by the caller) every
    /// monitor, without `Parameter` needing to know about the node's
    /// `monitor_out` set at all.
    pub fn set(&mut self, value: Value) -> Option<Fanout> {
        self.value = value.clone();
        if !self.access.emitter {
            return None;
        }
        let sig_id = self.sig_id.expect("emitting parameter must be registered");
        Some(Fanout {
            message: ControlMessage::Sig {
                sig_id,
                value,
            },
            subscribers: self.subscribers.iter().map(|(peer, _)| *peer).collect(),
        })
    }

    /// Adds `(recv_peer, recv_sig_id)` to the subscriber list if not
    /// already present. Returns the `MOD` delta to notify monitors with if
    /// the pair was actually new.
    pub fn subscribe_receiver(
        &mut self,
        recv_peer: PeerId,
        recv_sig_id: Option<SignalId>,
    ) -> Option<Json> {
        let pair = (recv_peer, recv_sig_id);
        if self.subscribers.contains(&pair) {
            return None;
        }
        self.subscribers.push(pair);
        Some(self.subscribers_delta())
    }

    /// Symmetric to [`Parameter::subscribe_receiver`]; returns the `MOD`
    /// delta only if a subscriber was actually removed.
    pub fn unsubscribe_receiver(
        &mut self,
        recv_peer: PeerId,
        recv_sig_id: Option<SignalId>,
    ) -> Option<Json> {
        let pair = (recv_peer, recv_sig_id);
        let before = self.subscribers.len();
        self.subscribers.retain(|s| *s != pair);
        if self.subscribers.len() == before {
            return None;
        }
        Some(self.subscribers_delta())
    }

    fn subscribers_json(&self) -> Json {
        Json::Array(
            self.subscribers
                .iter()
                .map(|(peer, sig)| {
                    Json::Array(vec![
                        Json::String(peer.to_string()),
                        sig.map(|s| Json::Number(s.0.into()))
                            .unwrap_or(Json::Null),
                    ])
                })
                .collect(),
        )
    }

    fn subscribers_delta(&self) -> Json {
        let mut delta = Map::new();
        delta.insert("subscribers".into(), self.subscribers_json());
        Json::Object(delta)
    }

    /// Capability-tree projection: name, value, access, type hint, sig,
    /// sig_id, optional bounds, and `subscribers` iff the parameter emits.
    pub fn to_dict(&self) -> Json {
        let mut d = Map::new();
        d.insert("name".into(), Json::String(self.name.clone()));
        d.insert(
            "value".into(),
            serde_json::to_value(&self.value).unwrap_or(Json::Null),
        );
        d.insert("access".into(), Json::String(self.access.to_string()));
        d.insert(
            "typeHint".into(),
            Json::String(self.value.type_hint().into()),
        );
        d.insert(
            "sig".into(),
            Json::String(self.value.signature().into()),
        );
        d.insert(
            "sig_id".into(),
            self.sig_id
                .map(|s| Json::Number(s.0.into()))
                .unwrap_or(Json::Null),
        );
        if let Some(min) = self.bounds.min {
            d.insert("min".into(), serde_json::json!(min));
        }
        if let Some(max) = self.bounds.max {
            d.insert("max".into(), serde_json::json!(max));
        }
        if let Some(step) = self.bounds.step {
            d.insert("step".into(), serde_json::json!(step));
        }
        if self.access.emitter {
            d.insert("subscribers".into(), self.subscribers_json());
        }
        Json::Object(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(b: u8) -> PeerId {
        PeerId::new([b; 16])
    }

    #[test]
    fn plain_set_produces_no_fanout() {
        let mut p = Parameter::new("x".into(), Value::Float(1.0), Access::parse("rw"), None, vec![]);
        assert!(p.set(Value::Float(2.0)).is_none());
        assert_eq!(p.get(), &Value::Float(2.0));
    }

    #[test]
    fn emitting_set_fans_out_to_subscribers() {
        let mut p = Parameter::new("x".into(), Value::Float(1.0), Access::parse("rwe"), None, vec![]);
        p.set_sig_id(Some(SignalId::from(0usize)));
        p.subscribe_receiver(peer(1), Some(SignalId::from(0usize)));
        let fanout = p.set(Value::Float(2.0)).expect("emitter must fan out");
        assert_eq!(fanout.subscribers, vec![peer(1)]);
        match fanout.message {
            ControlMessage::Sig { sig_id, value } => {
                assert_eq!(sig_id, SignalId::from(0usize));
                assert_eq!(value, Value::Float(2.0));
            }
            _ => panic!("expected SIG"),
        }
    }

    #[test]
    fn subscribe_is_idempotent() {
        let mut p = Parameter::new("x".into(), Value::Float(1.0), Access::parse("rwe"), None, vec![]);
        assert!(p.subscribe_receiver(peer(1), None).is_some());
        assert!(p.subscribe_receiver(peer(1), None).is_none());
        assert_eq!(p.subscribers().len(), 1);
    }

    #[test]
    fn unsubscribe_then_subscribe_round_trips_to_empty() {
        let mut p = Parameter::new("x".into(), Value::Float(1.0), Access::parse("rwe"), None, vec![]);
        p.subscribe_receiver(peer(1), Some(SignalId::from(2usize)));
        assert!(p
            .unsubscribe_receiver(peer(1), Some(SignalId::from(2usize)))
            .is_some());
        assert!(p.subscribers().is_empty());
    }
}
