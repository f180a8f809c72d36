#![deny(missing_docs)]
//! A node runtime for the Orchestrator Control Protocol: a peer-to-peer
//! control plane where each node publishes a capability tree, registers
//! named parameters, and lets peers GET/SET/CALL/SUBSCRIBE to them over a
//! group-messaging substrate (mDNS discovery + gossipsub SHOUT + unicast
//! WHISPER, see [`net`]).
//!
//! [`node::Node`] is the entry point: construct one with a [`Substrate`]
//! (either [`net::Libp2pSubstrate`] for a real network or
//! [`substrate::mock`] for tests), register parameters on it, and drive it
//! with [`node::Node::run`] or [`node::Node::run_once`].

mod callbacks;
mod config;
mod error;
mod id;
mod net;
mod node;
mod parameter;
mod protocol;
mod registry;
mod substrate;
mod tables;
mod transport;
mod tree;
mod value;

pub use callbacks::{Callbacks, NoopCallbacks};
pub use config::{init_tracing, NodeConfig, DEFAULT_GROUP, HEADER_KEY, HEADER_VALUE, PROTOCOL_VERSION};
pub use error::Error;
pub use id::{PeerId, SignalId};
pub use net::Libp2pSubstrate;
pub use node::Node;
pub use parameter::Parameter;
pub use protocol::{ControlMessage, SubQuad};
pub use registry::ParameterRegistry;
pub use substrate::{InboxEvent, Substrate};
pub use tables::SubscriptionTables;
pub use tree::CapabilityTree;
pub use value::{Access, Bounds, Value};
