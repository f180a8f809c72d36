//! Structured error type for conditions raised to the caller rather than
//! merely logged and dropped. Internal dispatch/codec plumbing keeps using
//! `anyhow` for everything else.

use crate::id::{PeerId, SignalId};
use thiserror::Error;

/// Errors raised to the caller of a [`crate::Node`] operation.
#[derive(Debug, Error)]
pub enum Error {
    /// No parameter is registered under the given signal id.
    #[error("no parameter registered under signal id {0}")]
    SignalIdNotFound(SignalId),

    /// A write navigated a capability-tree path with a missing intermediate.
    #[error("capability tree path not found: {0:?}")]
    PathNotFound(Vec<String>),

    /// A subscription quadruple named neither the emitter nor the receiver
    /// as the local peer.
    #[error("invalid subscription route: neither emitter nor receiver is the local peer")]
    InvalidSubscriptionRoute,

    /// The named peer is not known to the local node.
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),

    /// Wraps an underlying substrate failure.
    #[error(transparent)]
    Substrate(#[from] anyhow::Error),
}
