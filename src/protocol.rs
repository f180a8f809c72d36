//! The control-message grammar and its JSON codec.
//!
//! Every payload is a single top-level mapping with exactly one of
//! `GET`/`SET`/`CALL`/`SUB`/`UNSUB`/`REP`/`MOD`/`SIG`. JSON is the concrete
//! encoding: any self-describing structured encoding would do, and JSON
//! keeps this crate's wire format human-readable and consistent with the
//! rest of its control-plane traffic.

use crate::id::{PeerId, SignalId};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// One subscription quadruple as carried by `SUB`/`UNSUB`: the emitter
/// peer/signal and the receiver peer/signal. Either signal id may be
/// absent, meaning "wildcard on that side".
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SubQuad {
    /// The emitting peer.
    pub emit_peer: PeerId,
    /// The emitter-side parameter, or `None` for a monitor (whole-node)
    /// subscription.
    pub emit_sig_id: Option<SignalId>,
    /// The receiving peer.
    pub recv_peer: PeerId,
    /// The receiver-side parameter to apply incoming SIGs to, or `None` to
    /// deliver to the callback only.
    pub recv_sig_id: Option<SignalId>,
}

impl Serialize for SubQuad {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeSeq;
        let mut seq = serializer.serialize_seq(Some(4))?;
        seq.serialize_element(&self.emit_peer.to_string())?;
        seq.serialize_element(&self.emit_sig_id.map(|s| s.0))?;
        seq.serialize_element(&self.recv_peer.to_string())?;
        seq.serialize_element(&self.recv_sig_id.map(|s| s.0))?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for SubQuad {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (emit_peer, emit_sig_id, recv_peer, recv_sig_id): (
            String,
            Option<u32>,
            String,
            Option<u32>,
        ) = Deserialize::deserialize(deserializer)?;
        Ok(SubQuad {
            emit_peer: emit_peer.parse().map_err(serde::de::Error::custom)?,
            emit_sig_id: emit_sig_id.map(SignalId),
            recv_peer: recv_peer.parse().map_err(serde::de::Error::custom)?,
            recv_sig_id: recv_sig_id.map(SignalId),
        })
    }
}

/// A single control-message frame: one top-level key, one payload.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlMessage {
    /// `null` requests the full capability tree; `Some(keys)` requests just
    /// those top-level items.
    Get(Option<Vec<String>>),
    /// Partial capability tree, deep-merged into the recipient's tree.
    Set(Map<String, Json>),
    /// Reserved; the dispatcher no-ops on receipt.
    Call(String, Vec<Json>),
    /// Requests a subscription be established along the carried quadruple.
    Sub(SubQuad),
    /// Requests a subscription be torn down along the carried quadruple.
    Unsub(SubQuad),
    /// Reserved; the dispatcher no-ops on receipt.
    Rep(Json),
    /// Partial capability tree, merged into `peers_caps[sender]`.
    Mod(Map<String, Json>),
    /// A single parameter's current value, pushed to a subscriber or monitor.
    Sig {
        /// The emitter-side signal id this value belongs to.
        sig_id: SignalId,
        /// The parameter's current value.
        value: Value,
    },
}

impl ControlMessage {
    /// Encodes the frame as the single-key JSON object the wire expects.
    pub fn encode(&self) -> Vec<u8> {
        let json = match self {
            ControlMessage::Get(keys) => {
                serde_json::json!({ "GET": keys })
            }
            ControlMessage::Set(data) => serde_json::json!({ "SET": data }),
            ControlMessage::Call(method, args) => {
                serde_json::json!({ "CALL": [method, args] })
            }
            ControlMessage::Sub(quad) => serde_json::json!({ "SUB": quad }),
            ControlMessage::Unsub(quad) => serde_json::json!({ "UNSUB": quad }),
            ControlMessage::Rep(data) => serde_json::json!({ "REP": data }),
            ControlMessage::Mod(data) => serde_json::json!({ "MOD": data }),
            ControlMessage::Sig { sig_id, value } => {
                serde_json::json!({ "SIG": [sig_id.0, value] })
            }
        };
        serde_json::to_vec(&json).expect("control message is always representable as JSON")
    }

    /// Decodes a single frame. Returns an error on non-UTF-8 payloads,
    /// malformed JSON, a non-object top level, or an unrecognized/missing
    /// single key — all of which are protocol-framing errors to log and
    /// drop, never to propagate to the network.
    pub fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        let text = std::str::from_utf8(bytes)?;
        let json: Json = serde_json::from_str(text)?;
        let obj = json
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("control frame must be a JSON object"))?;
        if obj.len() != 1 {
            anyhow::bail!("control frame must have exactly one top-level key, got {}", obj.len());
        }
        let (key, value) = obj.iter().next().unwrap();
        Ok(match key.as_str() {
            "GET" => ControlMessage::Get(serde_json::from_value(value.clone())?),
            "SET" => ControlMessage::Set(
                value
                    .as_object()
                    .ok_or_else(|| anyhow::anyhow!("SET payload must be an object"))?
                    .clone(),
            ),
            "CALL" => {
                let (method, args): (String, Vec<Json>) = serde_json::from_value(value.clone())?;
                ControlMessage::Call(method, args)
            }
            "SUB" => ControlMessage::Sub(serde_json::from_value(value.clone())?),
            "UNSUB" => ControlMessage::Unsub(serde_json::from_value(value.clone())?),
            "REP" => ControlMessage::Rep(value.clone()),
            "MOD" => ControlMessage::Mod(
                value
                    .as_object()
                    .ok_or_else(|| anyhow::anyhow!("MOD payload must be an object"))?
                    .clone(),
            ),
            "SIG" => {
                let (sig_id, value): (u32, Value) = serde_json::from_value(value.clone())?;
                ControlMessage::Sig {
                    sig_id: SignalId(sig_id),
                    value,
                }
            }
            other => anyhow::bail!("unrecognized control message key {:?}", other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(b: u8) -> PeerId {
        PeerId::new([b; 16])
    }

    #[test]
    fn round_trip_get_null() {
        let msg = ControlMessage::Get(None);
        assert_eq!(ControlMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn round_trip_get_keys() {
        let msg = ControlMessage::Get(Some(vec!["a".into(), "b".into()]));
        assert_eq!(ControlMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn round_trip_sub_with_wildcards() {
        let msg = ControlMessage::Sub(SubQuad {
            emit_peer: peer(1),
            emit_sig_id: None,
            recv_peer: peer(2),
            recv_sig_id: Some(SignalId(3)),
        });
        assert_eq!(ControlMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn round_trip_sig() {
        let msg = ControlMessage::Sig {
            sig_id: SignalId(7),
            value: Value::Float(2.5),
        };
        assert_eq!(ControlMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn decode_rejects_multi_key_frame() {
        let bytes = br#"{"GET": null, "SET": {}}"#;
        assert!(ControlMessage::decode(bytes).is_err());
    }

    #[test]
    fn decode_rejects_non_utf8() {
        let bytes = &[0xff, 0xfe, 0xfd];
        assert!(ControlMessage::decode(bytes).is_err());
    }

    #[test]
    fn decode_rejects_unknown_key() {
        let bytes = br#"{"FROB": 1}"#;
        assert!(ControlMessage::decode(bytes).is_err());
    }
}
