//! TCP + Noise + Yamux transport construction for the libp2p substrate.

use anyhow::Result;
use libp2p::core::identity;
use libp2p::core::muxing::StreamMuxerBox;
use libp2p::core::transport::{Boxed, Transport};
use libp2p::core::upgrade::Version;
use libp2p::noise::{Keypair, NoiseConfig, X25519Spec};
use libp2p::tcp::TcpConfig;
use libp2p::yamux::YamuxConfig;
use libp2p::PeerId;
use std::time::Duration;

/// Builds the TCP + Noise + Yamux transport stack used by [`crate::net::Libp2pSubstrate`].
pub fn transport(keypair: identity::Keypair) -> Result<Boxed<(PeerId, StreamMuxerBox)>> {
    let tcp = TcpConfig::new().nodelay(true);
    let key = Keypair::<X25519Spec>::new().into_authentic(&keypair)?;
    Ok(tcp
        .upgrade(Version::V1)
        .authenticate(NoiseConfig::xx(key).into_authenticated())
        .multiplex(YamuxConfig::default())
        .timeout(Duration::from_secs(20))
        .boxed())
}
